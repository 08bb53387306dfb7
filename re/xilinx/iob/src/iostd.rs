#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum DiffKind {
    None,
    Pseudo,
    True,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Iostd {
    pub name: &'static str,
    pub vcco: u16,
    pub vref: Option<u16>,
    pub diff: DiffKind,
    pub dci: bool,
    pub drive: &'static [u8],
}

impl Iostd {
    pub const fn cmos(name: &'static str, vcco: u16, drive: &'static [u8]) -> Iostd {
        Iostd {
            name,
            vcco,
            vref: None,
            diff: DiffKind::None,
            dci: false,
            drive,
        }
    }

    pub const fn vref(name: &'static str, vcco: u16, vref: u16) -> Iostd {
        Iostd {
            name,
            vcco,
            vref: Some(vref),
            diff: DiffKind::None,
            dci: false,
            drive: &[],
        }
    }

    pub const fn vref_dci(name: &'static str, vcco: u16, vref: u16) -> Iostd {
        Iostd {
            name,
            vcco,
            vref: Some(vref),
            diff: DiffKind::None,
            dci: true,
            drive: &[],
        }
    }

    pub const fn pseudo_diff(name: &'static str, vcco: u16) -> Iostd {
        Iostd {
            name,
            vcco,
            vref: None,
            diff: DiffKind::Pseudo,
            dci: false,
            drive: &[],
        }
    }

    pub const fn true_diff(name: &'static str, vcco: u16) -> Iostd {
        Iostd {
            name,
            vcco,
            vref: None,
            diff: DiffKind::True,
            dci: false,
            drive: &[],
        }
    }

    pub fn lookup(name: &str) -> Option<&'static Iostd> {
        HP_IOSTDS.iter().find(|std| std.name == name)
    }

    /// The bank-level standard this one belongs to: pseudo-differential
    /// standards share the bank with their single-ended base.
    pub fn family(&self) -> &'static str {
        self.name.strip_prefix("DIFF_").unwrap_or(self.name)
    }

    pub fn is_true_diff(&self) -> bool {
        self.diff == DiffKind::True
    }

    pub fn is_diff(&self) -> bool {
        self.diff != DiffKind::None
    }

    pub fn is_dci(&self) -> bool {
        self.dci
    }

    pub fn needs_vref(&self) -> bool {
        self.vref.is_some()
    }

    pub fn has_numeric_drive(&self) -> bool {
        !self.drive.is_empty()
    }

    pub fn supports_ibuf_low_pwr(&self) -> bool {
        matches!(self.family(), "SSTL135" | "SSTL15")
    }

    /// Differential standards that can be placed in a bank running this one.
    pub fn diff_variants(&self) -> &'static [&'static str] {
        match self.name {
            "LVCMOS18" => &["LVDS"],
            "SSTL135" => &["DIFF_SSTL135"],
            "SSTL15" => &["DIFF_SSTL15"],
            _ => &[],
        }
    }

    /// The IOSTANDARD attribute value for the primitive; bidirectional
    /// buffers need the tristate-aware flavor of the DCI standards.
    pub fn prim_name(&self, bidir: bool) -> String {
        if bidir {
            self.name.replace("_DCI", "_T_DCI")
        } else {
            self.name.to_string()
        }
    }
}

pub const HP_IOSTDS: &[Iostd] = &[
    Iostd::cmos("LVCMOS18", 1800, &[2, 4, 6, 8, 12, 16]),
    Iostd::cmos("LVCMOS15", 1500, &[2, 4, 6, 8, 12, 16]),
    Iostd::cmos("LVCMOS12", 1200, &[2, 4, 6, 8]),
    Iostd::vref("SSTL15", 1500, 750),
    Iostd::vref("SSTL135", 1350, 675),
    Iostd::vref_dci("SSTL15_DCI", 1500, 750),
    Iostd::vref_dci("SSTL135_DCI", 1350, 675),
    Iostd::pseudo_diff("DIFF_SSTL15", 1500),
    Iostd::pseudo_diff("DIFF_SSTL135", 1350),
    Iostd::true_diff("LVDS", 1800),
];

/// Candidates for the run-wide standard.
pub const FUZZ_IOSTDS: &[&str] = &[
    "LVCMOS12",
    "LVCMOS15",
    "LVCMOS18",
    "SSTL135",
    "SSTL135_DCI",
    "SSTL15",
    "SSTL15_DCI",
];

/// INTERNAL_VREF values, in millivolts.
pub const VREF_MV: [u16; 4] = [600, 675, 750, 900];

pub const PULLS: [&str; 4] = ["NONE", "KEEPER", "PULLDOWN", "PULLUP"];

pub fn vref_tag(mv: u16) -> String {
    format!("VREF.V_{mv}_MV")
}

pub fn drive_option_name(family: &str, drive: Option<u8>) -> String {
    match drive {
        Some(drive) => format!("{family}.DRIVE.I{drive}"),
        None => format!("{family}.DRIVE.I_FIXED"),
    }
}

/// Every drive option the correlation stage has to tell apart, across all
/// standards a driving site can be placed in.
pub fn drive_options() -> Vec<String> {
    let mut res = vec![];
    for std in HP_IOSTDS {
        if std.diff == DiffKind::Pseudo {
            continue;
        }
        if std.has_numeric_drive() {
            for &drive in std.drive {
                res.push(drive_option_name(std.name, Some(drive)));
            }
        } else {
            res.push(drive_option_name(std.name, None));
        }
    }
    res
}

/// Drive option every other one is measured against.
pub fn drive_option_zero() -> String {
    drive_option_name("LVCMOS18", Some(12))
}

#[test]
fn test_family() {
    let std = Iostd::lookup("DIFF_SSTL135").unwrap();
    assert_eq!(std.family(), "SSTL135");
    assert!(std.supports_ibuf_low_pwr());
    assert!(!std.is_true_diff());
    let lvds = Iostd::lookup("LVDS").unwrap();
    assert_eq!(lvds.family(), "LVDS");
    assert!(lvds.is_true_diff());
    assert!(!lvds.supports_ibuf_low_pwr());
    assert!(Iostd::lookup("SSTL135_DCI").unwrap().is_dci());
    assert!(!Iostd::lookup("LVCMOS12").unwrap().needs_vref());
    assert_eq!(Iostd::lookup("HSTL_I"), None);
}

#[test]
fn test_fuzz_iostds_known() {
    for name in FUZZ_IOSTDS {
        let std = Iostd::lookup(name).unwrap();
        assert_eq!(std.diff, DiffKind::None);
        for variant in std.diff_variants() {
            let vstd = Iostd::lookup(variant).unwrap();
            assert!(vstd.is_diff());
            assert_eq!(vstd.vcco, std.vcco);
        }
    }
}

#[test]
fn test_prim_name() {
    let std = Iostd::lookup("SSTL15_DCI").unwrap();
    assert_eq!(std.prim_name(true), "SSTL15_T_DCI");
    assert_eq!(std.prim_name(false), "SSTL15_DCI");
}

#[test]
fn test_drive_options() {
    let opts = drive_options();
    assert_eq!(opts.len(), 6 + 6 + 4 + 5);
    assert!(opts.contains(&drive_option_zero()));
    assert!(opts.contains(&"SSTL135_DCI.DRIVE.I_FIXED".to_string()));
    assert!(opts.contains(&"LVDS.DRIVE.I_FIXED".to_string()));
    assert!(!opts.contains(&"LVCMOS12.DRIVE.I12".to_string()));
    assert!(!opts.iter().any(|opt| opt.starts_with("DIFF_")));
}
