//! Turns a sampled design back into feature tags.
//!
//! Derivation runs in two phases. [`IobTagger::add_sites`] walks the manifest
//! and streams out everything that depends on one site or one tile, while
//! collecting which standards each bank ended up with. [`IobTagger::finish`]
//! then emits the bank and region aggregates, which are only known once every
//! site has been seen.

use std::collections::{BTreeMap, BTreeSet};

use prjcombine_re_segmaker::TagSink;

use crate::{
    config::{IobPrim, IobRecord, Slew},
    device::IobGrid,
    iostd::{Iostd, PULLS, VREF_MV, drive_option_name, drive_option_zero, drive_options, vref_tag},
    manifest::{Manifest, VrefTable},
};

/// The per-standard facets of a site. `None` means the facet says nothing
/// reliable for this configuration and is left out.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Facets {
    pub inout: Option<bool>,
    pub in_use: Option<bool>,
    pub input: Option<bool>,
    pub output: Option<bool>,
    pub in_only: Option<bool>,
    pub in_diff: Option<bool>,
}

impl Facets {
    const fn new(inout: bool, in_use: bool, input: bool, output: bool, in_only: bool) -> Self {
        Facets {
            inout: Some(inout),
            in_use: Some(in_use),
            input: Some(input),
            output: Some(output),
            in_only: Some(in_only),
            in_diff: None,
        }
    }

    pub fn of(prim: Option<&IobPrim>, std: &Iostd) -> Facets {
        let Some(prim) = prim else {
            return Facets::new(false, false, false, false, false);
        };
        match prim {
            IobPrim::Ibuf { .. } => Facets {
                in_diff: Some(false),
                ..Facets::new(false, true, true, false, true)
            },
            IobPrim::Ibufds { .. } if std.is_true_diff() => Facets {
                inout: Some(false),
                output: Some(false),
                in_diff: Some(true),
                ..Default::default()
            },
            IobPrim::Ibufds { .. } => Facets {
                input: None,
                in_diff: Some(true),
                ..Facets::new(false, true, false, false, true)
            },
            IobPrim::Obufds { .. } | IobPrim::Obuftds { .. } if std.is_true_diff() => Facets {
                inout: Some(false),
                in_diff: Some(false),
                ..Default::default()
            },
            IobPrim::Obuf { .. } | IobPrim::Obufds { .. } | IobPrim::Obuftds { .. } => {
                Facets::new(false, true, false, true, false)
            }
            IobPrim::IobufDcien { .. } => Facets::new(true, true, true, true, false),
        }
    }

    fn emit(&self, sink: &mut impl TagSink, site: &str, family: &str) {
        for (name, val) in [
            ("INOUT", self.inout),
            ("IN_USE", self.in_use),
            ("IN", self.input),
            ("OUT", self.output),
            ("IN_ONLY", self.in_only),
            ("IN_DIFF", self.in_diff),
        ] {
            if let Some(val) = val {
                sink.add_site_tag(site, format!("{family}.{name}"), val);
            }
        }
    }
}

/// Tile-scoped differential facts, which only depend on the primitive.
fn tile_facts(prim: &IobPrim, std: &Iostd) -> &'static [(&'static str, bool)] {
    match prim {
        IobPrim::Ibuf { .. } => &[("IN_DIFF", false)],
        IobPrim::Ibufds { .. } => &[("IN_DIFF", true)],
        IobPrim::Obuf { .. } => &[("OUT_DIFF", false), ("OUT_TRUE_DIFF", false)],
        IobPrim::Obufds { .. } if std.is_true_diff() => {
            &[("OUT_TRUE_DIFF", true), ("OUT_TRUE_TDIFF", false)]
        }
        IobPrim::Obufds { .. } => &[("OUT_DIFF", true), ("OUT_TDIFF", false)],
        IobPrim::Obuftds { .. } if std.is_true_diff() => {
            &[("OUT_TRUE_DIFF", true), ("OUT_TRUE_TDIFF", true)]
        }
        IobPrim::Obuftds { .. } => &[("OUT_DIFF", true), ("OUT_TDIFF", true)],
        IobPrim::IobufDcien { .. } => &[],
    }
}

/// What the first phase learned about the banks.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BankIndex {
    /// Standard families seen on active sites, per bank.
    pub families: BTreeMap<u32, BTreeSet<&'static str>>,
    /// Banks with an active single-ended input, the ones that need VREF.
    pub inputs: BTreeSet<u32>,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct IobTagSummary {
    pub any_dci_used: bool,
}

pub struct IobTagger<'a, G: IobGrid> {
    grid: &'a G,
    drive_options: Vec<String>,
    drive_zero: String,
    pub debug: u8,
}

impl<'a, G: IobGrid> IobTagger<'a, G> {
    pub fn new(grid: &'a G) -> Self {
        Self {
            grid,
            drive_options: drive_options(),
            drive_zero: drive_option_zero(),
            debug: 0,
        }
    }

    fn site_bank(&self, site: &str) -> u32 {
        match self.grid.site_bank(site) {
            Some(bank) => bank,
            None => panic!("site {site} has no bank"),
        }
    }

    fn bank_hclk(&self, bank: u32) -> Option<&'a str> {
        let region = self.grid.bank_region(bank)?;
        match self.grid.region_hclk_tile(region) {
            Some(tile) => Some(tile),
            None => panic!("bank {bank}: region {region} has no IDELAYCTRL site"),
        }
    }

    /// First phase: per-site and per-tile tags.
    pub fn add_sites(&self, manifest: &Manifest, sink: &mut impl TagSink) -> BankIndex {
        let mut companions = BTreeMap::new();
        for rec in manifest.active_sites() {
            let Some(pair) = rec.usage.as_ref().and_then(|u| u.prim.pair_site()) else {
                continue;
            };
            if let Some(prev) = companions.insert(pair, rec.site.as_str()) {
                panic!("site {pair} claimed by both {prev} and {}", rec.site);
            }
        }
        let mut index = BankIndex::default();
        for rec in &manifest.sites {
            if let Some(owner) = companions.get(rec.site.as_str()) {
                assert!(
                    !rec.is_active(),
                    "site {} is configured, but also the companion of {owner}",
                    rec.site
                );
                continue;
            }
            self.add_site(rec, sink, &mut index);
        }
        index
    }

    fn add_site(&self, rec: &IobRecord, sink: &mut impl TagSink, index: &mut BankIndex) {
        let site = rec.site.as_str();
        let std = rec.iostd();
        let family = std.family();
        let prim = rec.usage.as_ref().map(|usage| &usage.prim);
        Facets::of(prim, std).emit(sink, site, family);
        let Some(usage) = &rec.usage else {
            return;
        };
        let prim = &usage.prim;
        if self.debug >= 2 {
            clilog::debug!("{site}: {} {}", prim.name(), std.name);
        }
        let bank = self.site_bank(site);
        index.families.entry(bank).or_default().insert(family);
        if matches!(prim, IobPrim::Ibuf { .. } | IobPrim::IobufDcien { .. }) {
            index.inputs.insert(bank);
        }

        for &(name, val) in tile_facts(prim, std) {
            sink.add_tile_tag(&rec.tile, name, val);
        }

        match *prim {
            IobPrim::Ibuf { ibuf_low_pwr, .. } | IobPrim::Ibufds { ibuf_low_pwr, .. } => {
                if std.supports_ibuf_low_pwr() {
                    sink.add_site_tag(site, "IBUF_LOW_PWR", ibuf_low_pwr);
                    sink.add_site_tag(site, "ZIBUF_LOW_PWR", !ibuf_low_pwr);
                }
            }
            _ => (),
        }

        sink.add_site_group_zero(site, "PULLTYPE.", PULLS, "PULLDOWN", usage.pull.name());

        if let IobPrim::IobufDcien {
            ibufdisable,
            dcitermdisable,
            ..
        } = prim
        {
            sink.add_site_tag(site, "IBUFDISABLE.I", ibufdisable.is_driven());
            sink.add_site_tag(site, "DCITERMDISABLE.I", dcitermdisable.is_driven());
        }

        if !prim.drives_pad() || std.is_true_diff() {
            return;
        }
        let drive = drive_option_name(family, prim.drive());
        sink.add_site_group_zero(site, "", &self.drive_options, &self.drive_zero, &drive);
        if let Some(slew) = prim.slew() {
            for opt in Slew::ALL {
                sink.add_site_tag(site, format!("{family}.SLEW.{}", opt.name()), opt == slew);
            }
        }
    }

    /// Second phase: bank and region aggregates.
    pub fn finish(
        &self,
        index: &BankIndex,
        vrefs: &VrefTable,
        sink: &mut impl TagSink,
    ) -> IobTagSummary {
        let mut summary = IobTagSummary::default();
        for (&bank, families) in &index.families {
            let stds: Vec<&Iostd> = families
                .iter()
                .filter_map(|family| Iostd::lookup(family))
                .filter(|std| !std.is_true_diff())
                .collect();
            let std = match stds.as_slice() {
                [] => {
                    clilog::warn!(
                        "bank {bank}: only true differential standards in use, no bank tags"
                    );
                    continue;
                }
                &[std] => std,
                _ => {
                    let names: Vec<_> = stds.iter().map(|std| std.name).collect();
                    panic!("bank {bank}: mixed standards {names:?}");
                }
            };
            let family = std.name;
            let Some(hclk) = self.bank_hclk(bank) else {
                continue;
            };
            let dci = std.is_dci();
            summary.any_dci_used |= dci;
            if self.debug >= 1 {
                clilog::debug!("bank {bank}: {family} (hclk {hclk})");
            }
            sink.add_tile_tag(hclk, "DCI", dci);
            let special = self.grid.bank_special_tiles(bank);
            if let Some(tile) = &special.vrp {
                sink.add_tile_tag(tile, "IOB_Y0.VRP_USED", dci);
            }
            if let Some(tile) = &special.vrn {
                sink.add_tile_tag(tile, "IOB_Y1.VRN_USED", dci);
            }
            if std.needs_vref() && index.inputs.contains(&bank) {
                let external = matches!(vrefs.get(&bank), Some(None));
                for tile in &special.vref {
                    sink.add_tile_tag(tile, "IOB_Y0.VREF_DRIVER", external);
                }
            }
        }

        let mut active = BTreeSet::new();
        for (&bank, &vref) in vrefs {
            let Some(mv) = vref else { continue };
            let Some(hclk) = self.bank_hclk(bank) else {
                continue;
            };
            assert!(
                VREF_MV.contains(&mv),
                "bank {bank}: INTERNAL_VREF of {mv} mV is not a supported value"
            );
            for opt in VREF_MV {
                sink.add_tile_tag(hclk, vref_tag(opt), opt == mv);
            }
            active.insert(hclk);
        }
        for region in self.grid.regions() {
            let Some(hclk) = self.grid.region_hclk_tile(region) else {
                continue;
            };
            if active.contains(hclk) {
                continue;
            }
            for opt in VREF_MV {
                sink.add_tile_tag(hclk, vref_tag(opt), false);
            }
        }
        summary
    }
}

/// Device-wide tags, collected in their own sink since they live outside
/// the IOB frames.
pub fn add_cfg_tags(grid: &impl IobGrid, summary: IobTagSummary, sink: &mut impl TagSink) {
    sink.add_tile_tag(grid.cfg_tile(), "DCI_USED", summary.any_dci_used);
}

pub fn derive_iob_tags(
    grid: &impl IobGrid,
    manifest: &Manifest,
    vrefs: &VrefTable,
    debug: u8,
    sink: &mut impl TagSink,
) -> IobTagSummary {
    let mut tagger = IobTagger::new(grid);
    tagger.debug = debug;
    let index = tagger.add_sites(manifest, sink);
    tagger.finish(&index, vrefs, sink)
}

#[cfg(test)]
mod tests {
    use prjcombine_re_segmaker::{FrameFilter, Segmaker, TagScope, TagValue};

    use super::*;
    use crate::{
        config::{CtrlSrc, IobPads, IobUsage, Pull},
        device::{IobDb, test_grid},
        lutmaker::LutMaker,
        manifest::expected_vrefs,
        sample::sample_iobs,
    };

    const ON: TagValue = TagValue::Bool(true);
    const OFF: TagValue = TagValue::Bool(false);

    fn rec(tile: &str, site: &str, std: &str, prim: Option<IobPrim>) -> IobRecord {
        IobRecord {
            tile: tile.into(),
            site: site.into(),
            iostandard: std.into(),
            usage: prim.map(|prim| IobUsage {
                pull: Pull::Keeper,
                prim,
                pads: IobPads::default(),
            }),
        }
    }

    fn manifest(std: &str, sites: Vec<IobRecord>) -> Manifest {
        Manifest {
            seed: 0,
            iostandard: std.into(),
            iobanks: vec![33, 34],
            internal_vref: BTreeMap::new(),
            luts: LutMaker::new(),
            sites,
        }
    }

    fn run(grid: &IobDb, manifest: &Manifest, vrefs: &VrefTable) -> (Segmaker, IobTagSummary) {
        let mut segmk = Segmaker::new();
        let summary = derive_iob_tags(grid, manifest, vrefs, 0, &mut segmk);
        (segmk, summary)
    }

    fn site_tags(segmk: &Segmaker, site: &str) -> BTreeMap<String, TagValue> {
        segmk
            .scope_tags(&TagScope::Site(site.into()))
            .into_iter()
            .map(|(name, val)| (name.to_string(), val))
            .collect()
    }

    fn tile_tags(segmk: &Segmaker, tile: &str) -> BTreeMap<String, TagValue> {
        segmk
            .scope_tags(&TagScope::Tile(tile.into()))
            .into_iter()
            .map(|(name, val)| (name.to_string(), val))
            .collect()
    }

    fn tag_map(tags: &[(&str, TagValue)]) -> BTreeMap<String, TagValue> {
        tags.iter()
            .map(|&(name, val)| (name.to_string(), val))
            .collect()
    }

    fn pull_tags() -> Vec<(&'static str, TagValue)> {
        vec![
            ("PULLTYPE.KEEPER", ON),
            ("PULLTYPE.NONE", OFF),
            ("PULLTYPE.PULLDOWN", OFF),
            ("PULLTYPE.PULLUP", OFF),
        ]
    }

    /// A differential primitive on `IOB_X1Y12`, with its companion `IOB_X1Y11`
    /// left unused.
    fn diff_pair(bank_std: &str, prim: IobPrim) -> Segmaker {
        let grid = test_grid();
        let m = manifest(
            bank_std,
            vec![
                rec("RIOB18_X43Y11", "IOB_X1Y12", bank_std, Some(prim)),
                rec("RIOB18_X43Y11", "IOB_X1Y11", bank_std, None),
            ],
        );
        run(&grid, &m, &VrefTable::new()).0
    }

    fn vref_tags(segmk: &Segmaker, tile: &str) -> Vec<TagValue> {
        VREF_MV
            .iter()
            .map(|&mv| segmk.tile_tag(tile, &vref_tag(mv)).unwrap())
            .collect()
    }

    #[test]
    fn test_unused_site() {
        let grid = test_grid();
        let m = manifest(
            "LVCMOS18",
            vec![rec("RIOB18_SING_X43Y0", "IOB_X1Y0", "LVCMOS18", None)],
        );
        let (segmk, summary) = run(&grid, &m, &VrefTable::new());
        let tags = site_tags(&segmk, "IOB_X1Y0");
        let names: Vec<_> = tags.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            [
                "LVCMOS18.IN",
                "LVCMOS18.INOUT",
                "LVCMOS18.IN_ONLY",
                "LVCMOS18.IN_USE",
                "LVCMOS18.OUT"
            ]
        );
        assert!(tags.values().all(|&v| v == OFF));
        assert_eq!(segmk.tile_tag("HCLK_IOI3_X43Y26", "DCI"), None);
        assert!(!summary.any_dci_used);
        for hclk in ["HCLK_IOI3_X43Y26", "HCLK_IOI3_X43Y76", "HCLK_IOI3_X43Y126"] {
            assert_eq!(vref_tags(&segmk, hclk), [OFF; 4]);
        }
    }

    #[test]
    fn test_input_site() {
        let grid = test_grid();
        let m = manifest(
            "SSTL135",
            vec![rec(
                "RIOB18_X43Y13",
                "IOB_X1Y13",
                "SSTL135",
                Some(IobPrim::Ibuf {
                    idelay_only: false,
                    ibuf_low_pwr: false,
                }),
            )],
        );
        let (segmk, _) = run(&grid, &m, &VrefTable::from([(33, Some(900))]));
        let tags = site_tags(&segmk, "IOB_X1Y13");
        for (facet, val) in [
            ("INOUT", OFF),
            ("IN_USE", ON),
            ("IN", ON),
            ("OUT", OFF),
            ("IN_ONLY", ON),
            ("IN_DIFF", OFF),
        ] {
            assert_eq!(tags[&format!("SSTL135.{facet}")], val, "{facet}");
        }
        assert_eq!(tags["IBUF_LOW_PWR"], OFF);
        assert_eq!(tags["ZIBUF_LOW_PWR"], ON);
        assert_eq!(tags["PULLTYPE.KEEPER"], ON);
        assert_eq!(tags["PULLTYPE.PULLDOWN"], OFF);
        assert!(!tags.keys().any(|name| name.contains("DRIVE") || name.contains("SLEW")));
        assert_eq!(segmk.tile_tag("RIOB18_X43Y13", "IN_DIFF"), Some(OFF));
        assert_eq!(segmk.tile_tag("HCLK_IOI3_X43Y26", "DCI"), Some(OFF));
        assert_eq!(
            vref_tags(&segmk, "HCLK_IOI3_X43Y26"),
            [OFF, OFF, OFF, ON]
        );
    }

    #[test]
    fn test_iobuf_drive_one_hot() {
        let grid = test_grid();
        let m = manifest(
            "LVCMOS15",
            vec![rec(
                "RIOB18_X43Y61",
                "IOB_X1Y62",
                "LVCMOS15",
                Some(IobPrim::IobufDcien {
                    drive: Some(8),
                    slew: Slew::Fast,
                    tristate: CtrlSrc::Gnd,
                    ibufdisable: CtrlSrc::Net("lut_1_o".into()),
                    dcitermdisable: CtrlSrc::Gnd,
                }),
            )],
        );
        let (segmk, _) = run(&grid, &m, &VrefTable::new());
        let tags = site_tags(&segmk, "IOB_X1Y62");
        for facet in ["INOUT", "IN_USE", "IN", "OUT"] {
            assert_eq!(tags[&format!("LVCMOS15.{facet}")], ON);
        }
        assert_eq!(tags["LVCMOS15.IN_ONLY"], OFF);
        let drives: Vec<_> = tags
            .iter()
            .filter(|(name, _)| name.contains(".DRIVE."))
            .collect();
        assert_eq!(drives.len(), drive_options().len());
        let on: Vec<_> = drives.iter().filter(|(_, v)| **v == ON).collect();
        assert_eq!(on.len(), 1);
        assert_eq!(on[0].0, "LVCMOS15.DRIVE.I8");
        assert_eq!(tags["LVCMOS15.SLEW.FAST"], ON);
        assert_eq!(tags["LVCMOS15.SLEW.SLOW"], OFF);
        assert_eq!(tags["IBUFDISABLE.I"], ON);
        assert_eq!(tags["DCITERMDISABLE.I"], OFF);
        assert_eq!(segmk.tile_tag("HCLK_IOI3_X43Y76", "DCI"), Some(OFF));
    }

    fn dci_bank33(vrefs: &VrefTable) -> (Segmaker, IobTagSummary) {
        let grid = test_grid();
        let m = manifest(
            "SSTL135_DCI",
            vec![
                rec(
                    "RIOB18_X43Y13",
                    "IOB_X1Y13",
                    "SSTL135_DCI",
                    Some(IobPrim::Ibuf {
                        idelay_only: true,
                        ibuf_low_pwr: true,
                    }),
                ),
                rec("RIOB18_X43Y13", "IOB_X1Y14", "SSTL135_DCI", None),
            ],
        );
        run(&grid, &m, vrefs)
    }

    #[test]
    fn test_dci_bank_internal_vref() {
        let (segmk, summary) = dci_bank33(&VrefTable::from([(33, Some(675)), (34, None)]));
        assert!(summary.any_dci_used);
        assert_eq!(segmk.tile_tag("HCLK_IOI3_X43Y26", "DCI"), Some(ON));
        assert_eq!(
            vref_tags(&segmk, "HCLK_IOI3_X43Y26"),
            [OFF, ON, OFF, OFF]
        );
        assert_eq!(segmk.tile_tag("RIOB18_SING_X43Y0", "IOB_Y0.VRP_USED"), Some(ON));
        assert_eq!(segmk.tile_tag("RIOB18_SING_X43Y49", "IOB_Y1.VRN_USED"), Some(ON));
        for tile in ["RIOB18_X43Y11", "RIOB18_X43Y37"] {
            assert_eq!(segmk.tile_tag(tile, "IOB_Y0.VREF_DRIVER"), Some(OFF));
        }
        assert_eq!(vref_tags(&segmk, "HCLK_IOI3_X43Y76"), [OFF; 4]);
        assert_eq!(segmk.site_tag("IOB_X1Y13", "IBUF_LOW_PWR"), None);

        let grid = test_grid();
        let mut cfg = Segmaker::new();
        add_cfg_tags(&grid, summary, &mut cfg);
        let compiled = cfg.compile(FrameFilter::All);
        assert_eq!(
            compiled.tags,
            [(
                TagScope::Tile("CFG_CENTER_MID_X61Y84".into()),
                "DCI_USED".to_string(),
                ON
            )]
        );
    }

    #[test]
    fn test_dci_bank_external_vref() {
        let (segmk, _) = dci_bank33(&VrefTable::from([(33, None), (34, None)]));
        for tile in ["RIOB18_X43Y11", "RIOB18_X43Y37"] {
            assert_eq!(segmk.tile_tag(tile, "IOB_Y0.VREF_DRIVER"), Some(ON));
        }
        assert_eq!(vref_tags(&segmk, "HCLK_IOI3_X43Y26"), [OFF; 4]);
    }

    #[test]
    #[should_panic(expected = "mixed standards")]
    fn test_mixed_bank() {
        let grid = test_grid();
        let obuf = IobPrim::Obuf {
            drive: None,
            slew: Slew::Slow,
        };
        let m = manifest(
            "SSTL15",
            vec![
                rec("RIOB18_X43Y13", "IOB_X1Y13", "SSTL15", Some(obuf)),
                rec(
                    "RIOB18_X43Y13",
                    "IOB_X1Y14",
                    "LVCMOS18",
                    Some(IobPrim::Ibuf {
                        idelay_only: false,
                        ibuf_low_pwr: true,
                    }),
                ),
            ],
        );
        run(&grid, &m, &VrefTable::new());
    }

    #[test]
    #[should_panic(expected = "companion")]
    fn test_configured_companion() {
        let grid = test_grid();
        let m = manifest(
            "SSTL15",
            vec![
                rec(
                    "RIOB18_X43Y11",
                    "IOB_X1Y12",
                    "SSTL15",
                    Some(IobPrim::Obufds {
                        iostandard: "DIFF_SSTL15".into(),
                        pair_site: "IOB_X1Y11".into(),
                        drive: None,
                        slew: Some(Slew::Fast),
                    }),
                ),
                rec(
                    "RIOB18_X43Y11",
                    "IOB_X1Y11",
                    "SSTL15",
                    Some(IobPrim::Obuf {
                        drive: None,
                        slew: Slew::Slow,
                    }),
                ),
            ],
        );
        run(&grid, &m, &VrefTable::new());
    }

    #[test]
    fn test_pseudo_diff_input() {
        let segmk = diff_pair(
            "SSTL15",
            IobPrim::Ibufds {
                iostandard: "DIFF_SSTL15".into(),
                pair_site: "IOB_X1Y11".into(),
                idelay_only: false,
                diff_term: true,
                ibuf_low_pwr: true,
            },
        );
        let mut expected = vec![
            ("SSTL15.INOUT", OFF),
            ("SSTL15.IN_USE", ON),
            ("SSTL15.OUT", OFF),
            ("SSTL15.IN_ONLY", ON),
            ("SSTL15.IN_DIFF", ON),
            ("IBUF_LOW_PWR", ON),
            ("ZIBUF_LOW_PWR", OFF),
        ];
        expected.extend(pull_tags());
        assert_eq!(site_tags(&segmk, "IOB_X1Y12"), tag_map(&expected));
        assert!(site_tags(&segmk, "IOB_X1Y11").is_empty());
        assert_eq!(
            tile_tags(&segmk, "RIOB18_X43Y11"),
            tag_map(&[("IN_DIFF", ON)])
        );
        assert_eq!(segmk.tile_tag("HCLK_IOI3_X43Y26", "DCI"), Some(OFF));
        assert_eq!(segmk.tile_tag("RIOB18_X43Y11", "IOB_Y0.VREF_DRIVER"), None);
    }

    #[test]
    fn test_true_diff_input() {
        let segmk = diff_pair(
            "LVCMOS18",
            IobPrim::Ibufds {
                iostandard: "LVDS".into(),
                pair_site: "IOB_X1Y11".into(),
                idelay_only: true,
                diff_term: false,
                ibuf_low_pwr: true,
            },
        );
        let mut expected = vec![("LVDS.INOUT", OFF), ("LVDS.OUT", OFF), ("LVDS.IN_DIFF", ON)];
        expected.extend(pull_tags());
        assert_eq!(site_tags(&segmk, "IOB_X1Y12"), tag_map(&expected));
        assert!(site_tags(&segmk, "IOB_X1Y11").is_empty());
        assert_eq!(
            tile_tags(&segmk, "RIOB18_X43Y11"),
            tag_map(&[("IN_DIFF", ON)])
        );
        assert_eq!(segmk.tile_tag("HCLK_IOI3_X43Y26", "DCI"), None);
    }

    fn check_pseudo_diff_output(segmk: &Segmaker, tdiff: TagValue) {
        let tags = site_tags(segmk, "IOB_X1Y12");
        let mut expected = vec![
            ("SSTL15.INOUT", OFF),
            ("SSTL15.IN_USE", ON),
            ("SSTL15.IN", OFF),
            ("SSTL15.OUT", ON),
            ("SSTL15.IN_ONLY", OFF),
            ("SSTL15.SLEW.FAST", ON),
            ("SSTL15.SLEW.SLOW", OFF),
        ];
        expected.extend(pull_tags());
        let (drives, rest): (BTreeMap<_, _>, BTreeMap<_, _>) =
            tags.into_iter().partition(|(name, _)| name.contains(".DRIVE."));
        assert_eq!(rest, tag_map(&expected));
        assert_eq!(drives.len(), drive_options().len());
        let on: Vec<_> = drives
            .iter()
            .filter(|(_, val)| **val == ON)
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(on, ["SSTL15.DRIVE.I_FIXED"]);
        assert!(site_tags(segmk, "IOB_X1Y11").is_empty());
        assert_eq!(
            tile_tags(segmk, "RIOB18_X43Y11"),
            tag_map(&[("OUT_DIFF", ON), ("OUT_TDIFF", tdiff)])
        );
        assert_eq!(segmk.tile_tag("HCLK_IOI3_X43Y26", "DCI"), Some(OFF));
        assert_eq!(segmk.tile_tag("RIOB18_SING_X43Y0", "IOB_Y0.VRP_USED"), Some(OFF));
        assert_eq!(segmk.tile_tag("RIOB18_SING_X43Y49", "IOB_Y1.VRN_USED"), Some(OFF));
    }

    #[test]
    fn test_pseudo_diff_output() {
        let segmk = diff_pair(
            "SSTL15",
            IobPrim::Obufds {
                iostandard: "DIFF_SSTL15".into(),
                pair_site: "IOB_X1Y11".into(),
                drive: None,
                slew: Some(Slew::Fast),
            },
        );
        check_pseudo_diff_output(&segmk, OFF);
    }

    #[test]
    fn test_pseudo_diff_tristate_output() {
        let segmk = diff_pair(
            "SSTL15",
            IobPrim::Obuftds {
                iostandard: "DIFF_SSTL15".into(),
                pair_site: "IOB_X1Y11".into(),
                drive: None,
                slew: Some(Slew::Fast),
                tristate: CtrlSrc::Net("lut_0_o".into()),
            },
        );
        check_pseudo_diff_output(&segmk, ON);
    }

    #[test]
    fn test_true_diff_output() {
        let segmk = diff_pair(
            "LVCMOS18",
            IobPrim::Obufds {
                iostandard: "LVDS".into(),
                pair_site: "IOB_X1Y11".into(),
                drive: None,
                slew: None,
            },
        );
        let mut expected = vec![("LVDS.INOUT", OFF), ("LVDS.IN_DIFF", OFF)];
        expected.extend(pull_tags());
        assert_eq!(site_tags(&segmk, "IOB_X1Y12"), tag_map(&expected));
        assert!(site_tags(&segmk, "IOB_X1Y11").is_empty());
        assert_eq!(
            tile_tags(&segmk, "RIOB18_X43Y11"),
            tag_map(&[("OUT_TRUE_DIFF", ON), ("OUT_TRUE_TDIFF", OFF)])
        );
    }

    #[test]
    fn test_true_diff_only_bank() {
        let grid = test_grid();
        let m = manifest(
            "LVCMOS18",
            vec![
                rec(
                    "RIOB18_X43Y11",
                    "IOB_X1Y12",
                    "LVCMOS18",
                    Some(IobPrim::Obuftds {
                        iostandard: "LVDS".into(),
                        pair_site: "IOB_X1Y11".into(),
                        drive: None,
                        slew: None,
                        tristate: CtrlSrc::Gnd,
                    }),
                ),
                rec("RIOB18_X43Y11", "IOB_X1Y11", "LVCMOS18", None),
            ],
        );
        let (segmk, _) = run(&grid, &m, &VrefTable::new());
        let tags = site_tags(&segmk, "IOB_X1Y12");
        assert_eq!(tags["LVDS.INOUT"], OFF);
        assert_eq!(tags["LVDS.IN_DIFF"], OFF);
        assert!(!tags.contains_key("LVDS.IN_USE"));
        assert!(!tags.keys().any(|name| name.contains("DRIVE")));
        assert!(site_tags(&segmk, "IOB_X1Y11").is_empty());
        assert_eq!(segmk.tile_tag("RIOB18_X43Y11", "OUT_TRUE_DIFF"), Some(ON));
        assert_eq!(segmk.tile_tag("RIOB18_X43Y11", "OUT_TRUE_TDIFF"), Some(ON));
        assert_eq!(segmk.tile_tag("HCLK_IOI3_X43Y26", "DCI"), None);
    }

    #[test]
    fn test_sampled_designs() {
        let grid = test_grid();
        for seed in 0..200 {
            let m = sample_iobs(&grid, seed, 0);
            let vrefs = expected_vrefs(&m);
            let (first, summary) = run(&grid, &m, &vrefs);
            let (second, _) = run(&grid, &m, &vrefs);
            assert_eq!(
                first.compile(FrameFilter::MinFrame(38)),
                second.compile(FrameFilter::MinFrame(38))
            );
            let std = Iostd::lookup(&m.iostandard).unwrap();
            let (segmk, _) = run(&grid, &m, &vrefs);
            for rec in m.active_sites() {
                let usage = rec.usage.as_ref().unwrap();
                let rec_std = rec.iostd();
                if !usage.prim.drives_pad() || rec_std.is_true_diff() {
                    continue;
                }
                let tags = site_tags(&segmk, &rec.site);
                let on: Vec<_> = tags
                    .iter()
                    .filter(|(name, val)| name.contains(".DRIVE.") && **val == ON)
                    .map(|(name, _)| name.as_str())
                    .collect();
                assert_eq!(on, [drive_option_name(rec_std.family(), usage.prim.drive())]);
            }
            let any_active = m.active_sites().any(|rec| !rec.iostd().is_true_diff());
            assert_eq!(summary.any_dci_used, any_active && std.is_dci());
        }
    }
}
