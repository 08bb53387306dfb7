use std::{
    collections::{BTreeMap, BTreeSet},
    error::Error,
    fmt::Write as _,
    fs::{read_to_string, write},
    path::Path,
};

use serde::{Deserialize, Serialize};
use simple_error::bail;

use crate::{config::IobRecord, iostd::Iostd, lutmaker::LutMaker};

/// Everything needed to regenerate a sampled design and derive its tags.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub seed: u64,
    /// Run-wide standard.
    pub iostandard: String,
    pub iobanks: Vec<u32>,
    /// Per-bank INTERNAL_VREF in millivolts, only for reference-voltage runs.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub internal_vref: BTreeMap<u32, u16>,
    pub luts: LutMaker,
    pub sites: Vec<IobRecord>,
}

/// Bank reference voltages as reported back by the tool: a value in
/// millivolts, or `None` for a bank running off the external VREF pins.
pub type VrefTable = BTreeMap<u32, Option<u16>>;

impl Manifest {
    pub fn to_json(&self) -> Result<String, Box<dyn Error>> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, Box<dyn Error>> {
        let manifest: Manifest = serde_json::from_str(s)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn Error>> {
        let path = path.as_ref();
        let s = match read_to_string(path) {
            Ok(s) => s,
            Err(e) => bail!("{}: {e}", path.display()),
        };
        Self::from_json(&s)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn Error>> {
        write(path, self.to_json()? + "\n")?;
        Ok(())
    }

    fn validate(&self) -> Result<(), Box<dyn Error>> {
        if Iostd::lookup(&self.iostandard).is_none() {
            bail!("unknown run IOSTANDARD {}", self.iostandard);
        }
        let mut seen = BTreeSet::new();
        for rec in &self.sites {
            if !seen.insert(rec.site.as_str()) {
                bail!("site {} listed twice", rec.site);
            }
            let Some(bank_std) = Iostd::lookup(&rec.iostandard) else {
                bail!("site {}: unknown IOSTANDARD {}", rec.site, rec.iostandard);
            };
            if let Some(name) = rec.usage.as_ref().and_then(|u| u.prim.iostandard()) {
                let Some(std) = Iostd::lookup(name) else {
                    bail!("site {}: unknown IOSTANDARD {name}", rec.site);
                };
                // one VCCO per bank
                if std.vcco != bank_std.vcco {
                    bail!(
                        "site {}: {name} needs VCCO {} mV, bank runs {} at {} mV",
                        rec.site,
                        std.vcco,
                        bank_std.name,
                        bank_std.vcco
                    );
                }
            }
        }
        Ok(())
    }

    pub fn active_sites(&self) -> impl Iterator<Item = &IobRecord> {
        self.sites.iter().filter(|rec| rec.is_active())
    }

    pub fn any_idelay(&self) -> bool {
        self.active_sites()
            .any(|rec| rec.usage.as_ref().is_some_and(|u| u.prim.idelay_only()))
    }

    /// Summary of the active sites, one line each: tile, site, pad, site
    /// standard, primitive standard, drive, slew, pull.
    pub fn params_csv(&self) -> String {
        let mut res = String::new();
        res.push_str("tile,site,pin,iostandard,prim_iostandard,drive,slew,pull\n");
        for rec in &self.sites {
            let Some(usage) = &rec.usage else { continue };
            let iostd = rec.iostd();
            let drive = usage.prim.drive().map(|d| d.to_string()).unwrap_or_default();
            let slew = usage.prim.slew().map(|s| s.name()).unwrap_or_default();
            writeln!(
                res,
                "{},{},{},{},{},{},{},{}",
                rec.tile,
                rec.site,
                usage.pads.pad,
                iostd.name,
                iostd.prim_name(usage.prim.is_bidir()),
                drive,
                slew,
                usage.pull.name()
            )
            .unwrap();
        }
        res
    }
}

fn format_volts(mv: u16) -> String {
    let mut s = format!("{}.{:03}", mv / 1000, mv % 1000);
    while s.ends_with('0') && !s.ends_with(".0") {
        s.pop();
    }
    s
}

fn parse_volts(s: &str) -> Option<u16> {
    let (int, frac) = s.split_once('.').unwrap_or((s, ""));
    if frac.len() > 3 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let int: u16 = int.parse().ok()?;
    let frac: u16 = if frac.is_empty() {
        0
    } else {
        format!("{frac:0<3}").parse().ok()?
    };
    int.checked_mul(1000)?.checked_add(frac)
}

pub fn format_vref_csv(table: &VrefTable) -> String {
    let mut res = String::new();
    for (bank, vref) in table {
        match vref {
            Some(mv) => writeln!(res, "{bank},{}", format_volts(*mv)).unwrap(),
            None => writeln!(res, "{bank},None").unwrap(),
        }
    }
    res
}

pub fn parse_vref_csv(s: &str) -> Result<VrefTable, Box<dyn Error>> {
    let mut res = VrefTable::new();
    for (idx, line) in s.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((bank, vref)) = line.split_once(',') else {
            bail!("iobank_vref.csv:{}: expected bank,vref", idx + 1);
        };
        let Ok(bank) = bank.trim().parse::<u32>() else {
            bail!("iobank_vref.csv:{}: bad bank {bank}", idx + 1);
        };
        let vref = match vref.trim() {
            "None" => None,
            v => match parse_volts(v) {
                Some(mv) => Some(mv),
                None => bail!("iobank_vref.csv:{}: bad voltage {v}", idx + 1),
            },
        };
        if res.insert(bank, vref).is_some() {
            bail!("iobank_vref.csv:{}: bank {bank} listed twice", idx + 1);
        }
    }
    Ok(res)
}

pub fn read_vref_csv<P: AsRef<Path>>(path: P) -> Result<VrefTable, Box<dyn Error>> {
    let path = path.as_ref();
    let s = match read_to_string(path) {
        Ok(s) => s,
        Err(e) => bail!("{}: {e}", path.display()),
    };
    parse_vref_csv(&s)
}

/// The table the tool will report for a sampled design: every bank, with its
/// internal reference if one was requested.
pub fn expected_vrefs(manifest: &Manifest) -> VrefTable {
    manifest
        .iobanks
        .iter()
        .map(|&bank| (bank, manifest.internal_vref.get(&bank).copied()))
        .collect()
}

#[test]
fn test_volts() {
    assert_eq!(format_volts(675), "0.675");
    assert_eq!(format_volts(600), "0.6");
    assert_eq!(format_volts(900), "0.9");
    assert_eq!(format_volts(1000), "1.0");
    assert_eq!(parse_volts("0.675"), Some(675));
    assert_eq!(parse_volts("0.6"), Some(600));
    assert_eq!(parse_volts("0.75"), Some(750));
    assert_eq!(parse_volts("1"), Some(1000));
    assert_eq!(parse_volts("0.6755"), None);
    assert_eq!(parse_volts("-0.6"), None);
}

#[test]
fn test_vref_csv() {
    let table = parse_vref_csv("33,0.675\n34,None\n\n").unwrap();
    assert_eq!(table, VrefTable::from([(33, Some(675)), (34, None)]));
    assert_eq!(format_vref_csv(&table), "33,0.675\n34,None\n");
    assert!(parse_vref_csv("33\n").is_err());
    assert!(parse_vref_csv("33,0.675\n33,None\n").is_err());
    assert!(parse_vref_csv("x,None\n").is_err());
}

#[test]
fn test_manifest_file() {
    use crate::config::{IobPads, IobPrim, IobUsage, Pull, Slew};

    let manifest = Manifest {
        seed: 0x1234,
        iostandard: "LVCMOS15".into(),
        iobanks: vec![33, 34],
        internal_vref: BTreeMap::new(),
        luts: LutMaker::new(),
        sites: vec![
            IobRecord {
                tile: "RIOB18_X43Y11".into(),
                site: "IOB_X1Y12".into(),
                iostandard: "LVCMOS15".into(),
                usage: Some(IobUsage {
                    pull: Pull::Pullup,
                    prim: IobPrim::Obuf {
                        drive: Some(12),
                        slew: Slew::Fast,
                    },
                    pads: IobPads {
                        pad: "do[0]".into(),
                        from_fabric: Some("lut_0_o".into()),
                        ..Default::default()
                    },
                }),
            },
            IobRecord {
                tile: "RIOB18_X43Y11".into(),
                site: "IOB_X1Y11".into(),
                iostandard: "LVCMOS15".into(),
                usage: None,
            },
        ],
    };
    let json = manifest.to_json().unwrap();
    assert!(!json.contains("internal_vref"));
    assert!(!json.contains("\"usage\": null"));
    assert!(!json.contains("bpad"));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("params.json");
    manifest.write(&path).unwrap();
    let back = Manifest::from_file(&path).unwrap();
    assert_eq!(back, manifest);
    assert!(!back.any_idelay());
    assert_eq!(
        back.params_csv(),
        "tile,site,pin,iostandard,prim_iostandard,drive,slew,pull\n\
         RIOB18_X43Y11,IOB_X1Y12,do[0],LVCMOS15,LVCMOS15,12,FAST,PULLUP\n"
    );
    assert_eq!(
        expected_vrefs(&back),
        VrefTable::from([(33, None), (34, None)])
    );

    let bad = json.replace("\"LVCMOS15\"", "\"LVTTL\"");
    assert!(Manifest::from_json(&bad).is_err());
}

#[test]
fn test_manifest_vcco_mismatch() {
    use crate::config::{IobPads, IobPrim, IobUsage, Pull, Slew};

    let obufds = |iostandard: &str| IobRecord {
        tile: "RIOB18_X43Y11".into(),
        site: "IOB_X1Y12".into(),
        iostandard: "SSTL15".into(),
        usage: Some(IobUsage {
            pull: Pull::None,
            prim: IobPrim::Obufds {
                iostandard: iostandard.into(),
                pair_site: "IOB_X1Y11".into(),
                drive: None,
                slew: Some(Slew::Slow),
            },
            pads: IobPads::default(),
        }),
    };
    let mut manifest = Manifest {
        seed: 1,
        iostandard: "SSTL15".into(),
        iobanks: vec![33],
        internal_vref: BTreeMap::new(),
        luts: LutMaker::new(),
        sites: vec![obufds("DIFF_SSTL15")],
    };
    assert!(Manifest::from_json(&manifest.to_json().unwrap()).is_ok());
    manifest.sites = vec![obufds("LVDS")];
    let err = Manifest::from_json(&manifest.to_json().unwrap()).unwrap_err();
    assert!(err.to_string().contains("VCCO"));
}
