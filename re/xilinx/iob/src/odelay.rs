//! Output delay fuzzer: one `OBUF` per chosen IOB pair, fed either through a
//! randomly configured `ODELAYE2` or straight from a constant.

use std::{error::Error, fs::read_to_string, path::Path};

use prjcombine_re_segmaker::TagSink;
use rand::{prelude::*, rngs::StdRng};
use serde::{Deserialize, Serialize};
use simple_error::bail;

use crate::device::{IobGrid, IobSiteKind, name_xy};

/// Width of `ODELAY_VALUE`.
pub const ODELAY_VALUE_BITS: usize = 5;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OdelayType {
    Fixed,
    Variable,
    VarLoad,
}

impl OdelayType {
    pub const ALL: [OdelayType; 3] = [OdelayType::Fixed, OdelayType::Variable, OdelayType::VarLoad];

    pub fn name(self) -> &'static str {
        match self {
            OdelayType::Fixed => "FIXED",
            OdelayType::Variable => "VARIABLE",
            OdelayType::VarLoad => "VAR_LOAD",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct OdelayParams {
    pub odelay_type: OdelayType,
    pub odelay_value: u8,
    pub high_performance_mode: bool,
    pub cinvctrl_sel: bool,
    pub pipe_sel: bool,
    pub is_c_inverted: bool,
    pub is_odatain_inverted: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OdelayUse {
    /// The OBUF is tied to a constant and both delays stay unused.
    Bypass { value: bool },
    Delay(OdelayParams),
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct OdelayRecord {
    pub tile: String,
    pub iob: String,
    pub odelay: String,
    pub other_odelay: String,
    /// Bit of the `do` port.
    pub index: usize,
    #[serde(rename = "use")]
    pub usage: OdelayUse,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct OdelayManifest {
    pub seed: u64,
    pub num_tiles: usize,
    pub num_outputs: usize,
    pub sites: Vec<OdelayRecord>,
}

impl OdelayManifest {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn Error>> {
        let path = path.as_ref();
        let s = match read_to_string(path) {
            Ok(s) => s,
            Err(e) => bail!("{}: {e}", path.display()),
        };
        let manifest: OdelayManifest = serde_json::from_str(&s)?;
        for rec in &manifest.sites {
            if let OdelayUse::Delay(params) = &rec.usage {
                if params.odelay_value >= 1 << ODELAY_VALUE_BITS {
                    bail!("{}: ODELAY_VALUE {} out of range", rec.odelay, params.odelay_value);
                }
            }
        }
        Ok(manifest)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn Error>> {
        std::fs::write(path, serde_json::to_string_pretty(self)? + "\n")?;
        Ok(())
    }
}

fn odelay_site(iob: &str) -> String {
    iob.replacen("IOB", "ODELAY", 1)
}

/// (tile, master IOB, slave IOB) for every paired tile, in coordinate order.
fn pair_tiles(grid: &impl IobGrid) -> Vec<(String, String, String)> {
    let mut res: Vec<_> = grid
        .tiles()
        .values()
        .filter_map(|tile| {
            let master = tile.site(IobSiteKind::Master)?;
            let slave = tile.site(IobSiteKind::Slave)?;
            Some((tile.name.clone(), master.name.clone(), slave.name.clone()))
        })
        .collect();
    res.sort_by_key(|(tile, _, _)| name_xy(tile));
    res
}

fn random_params(rng: &mut StdRng) -> OdelayParams {
    let odelay_type = *OdelayType::ALL.choose(rng).unwrap();
    let mut params = OdelayParams {
        odelay_type,
        odelay_value: rng.random_range(0..1 << ODELAY_VALUE_BITS),
        high_performance_mode: rng.random(),
        cinvctrl_sel: rng.random(),
        pipe_sel: rng.random(),
        is_c_inverted: rng.random(),
        is_odatain_inverted: rng.random(),
    };
    // only VAR_LOAD_PIPE may pipeline, and that mode is not exercised
    params.pipe_sel = false;
    if odelay_type == OdelayType::VarLoad {
        params.odelay_value = 0;
    }
    if odelay_type == OdelayType::Fixed {
        params.is_c_inverted = false;
    }
    params
}

pub fn sample_odelay(grid: &impl IobGrid, seed: u64, debug: u8) -> OdelayManifest {
    let mut rng = StdRng::seed_from_u64(seed);
    let tiles = pair_tiles(grid);
    let mut num_outputs = 0;
    let mut indices = vec![];
    for _ in &tiles {
        if rng.random() {
            indices.push(Some(num_outputs));
            num_outputs += 1;
        } else {
            indices.push(None);
        }
    }
    let mut sites = vec![];
    for ((tile, master, slave), index) in tiles.iter().zip(indices) {
        let (iob, other) = if rng.random() {
            (master, slave)
        } else {
            (slave, master)
        };
        let Some(index) = index else { continue };
        let params = random_params(&mut rng);
        let usage = if rng.random_range(0..6) == 0 {
            OdelayUse::Bypass {
                value: rng.random(),
            }
        } else {
            OdelayUse::Delay(params)
        };
        if debug >= 2 {
            clilog::debug!("{tile} {iob}: {usage:?}");
        }
        sites.push(OdelayRecord {
            tile: tile.clone(),
            iob: iob.clone(),
            odelay: odelay_site(iob),
            other_odelay: odelay_site(other),
            index,
            usage,
        });
    }
    OdelayManifest {
        seed,
        num_tiles: tiles.len(),
        num_outputs,
        sites,
    }
}

pub fn derive_odelay_tags(manifest: &OdelayManifest, sink: &mut impl TagSink) {
    for rec in &manifest.sites {
        sink.add_site_tag(&rec.other_odelay, "IN_USE", false);
        let params = match &rec.usage {
            OdelayUse::Bypass { .. } => {
                sink.add_site_tag(&rec.odelay, "IN_USE", false);
                continue;
            }
            OdelayUse::Delay(params) => params,
        };
        let site = &rec.odelay;
        sink.add_site_tag(site, "IN_USE", true);
        sink.add_site_group_zero(
            site,
            "ODELAY_TYPE_",
            OdelayType::ALL.map(OdelayType::name),
            OdelayType::Fixed.name(),
            params.odelay_type.name(),
        );
        for i in 0..ODELAY_VALUE_BITS {
            let bit = (params.odelay_value >> i) & 1 != 0;
            sink.add_site_tag(site, format!("ODELAY_VALUE[{i}]"), bit);
            sink.add_site_tag(site, format!("ZODELAY_VALUE[{i}]"), !bit);
        }
        sink.add_site_tag(site, "HIGH_PERFORMANCE_MODE", params.high_performance_mode);
        sink.add_site_tag(site, "CINVCTRL_SEL", params.cinvctrl_sel);
        sink.add_site_tag(site, "PIPE_SEL", params.pipe_sel);
        sink.add_site_tag(site, "IS_ODATAIN_INVERTED", params.is_odatain_inverted);
        // the clock is unused by FIXED delays
        if params.odelay_type != OdelayType::Fixed {
            sink.add_site_tag(site, "IS_C_INVERTED", params.is_c_inverted);
        }
    }
}

#[cfg(test)]
mod tests {
    use prjcombine_re_segmaker::{Segmaker, TagValue};

    use super::*;
    use crate::device::test_grid;

    #[test]
    fn test_sample_odelay() {
        let grid = test_grid();
        let mut bypassed = 0;
        let mut delayed = 0;
        for seed in 0..100 {
            let manifest = sample_odelay(&grid, seed, 0);
            assert_eq!(manifest, sample_odelay(&grid, seed, 0));
            assert_eq!(manifest.num_tiles, 6);
            assert_eq!(manifest.sites.len(), manifest.num_outputs);
            for (i, rec) in manifest.sites.iter().enumerate() {
                assert_eq!(rec.index, i);
                assert!(rec.odelay.starts_with("ODELAY_X1Y"));
                assert_ne!(rec.odelay, rec.other_odelay);
                assert!(!rec.tile.contains("SING"));
                match &rec.usage {
                    OdelayUse::Bypass { .. } => bypassed += 1,
                    OdelayUse::Delay(params) => {
                        delayed += 1;
                        assert!(!params.pipe_sel);
                        if params.odelay_type == OdelayType::VarLoad {
                            assert_eq!(params.odelay_value, 0);
                        }
                        if params.odelay_type == OdelayType::Fixed {
                            assert!(!params.is_c_inverted);
                        }
                    }
                }
            }
        }
        assert!(bypassed > 0);
        assert!(delayed > bypassed);
    }

    #[test]
    fn test_odelay_tags() {
        let manifest = OdelayManifest {
            seed: 0,
            num_tiles: 2,
            num_outputs: 2,
            sites: vec![
                OdelayRecord {
                    tile: "RIOB18_X43Y11".into(),
                    iob: "IOB_X1Y12".into(),
                    odelay: "ODELAY_X1Y12".into(),
                    other_odelay: "ODELAY_X1Y11".into(),
                    index: 0,
                    usage: OdelayUse::Delay(OdelayParams {
                        odelay_type: OdelayType::Variable,
                        odelay_value: 0b10110,
                        high_performance_mode: true,
                        cinvctrl_sel: false,
                        pipe_sel: false,
                        is_c_inverted: true,
                        is_odatain_inverted: false,
                    }),
                },
                OdelayRecord {
                    tile: "RIOB18_X43Y13".into(),
                    iob: "IOB_X1Y13".into(),
                    odelay: "ODELAY_X1Y13".into(),
                    other_odelay: "ODELAY_X1Y14".into(),
                    index: 1,
                    usage: OdelayUse::Bypass { value: true },
                },
            ],
        };
        let mut segmk = Segmaker::new();
        derive_odelay_tags(&manifest, &mut segmk);
        let on = TagValue::Bool(true);
        let off = TagValue::Bool(false);
        assert_eq!(segmk.site_tag("ODELAY_X1Y12", "IN_USE"), Some(on));
        assert_eq!(segmk.site_tag("ODELAY_X1Y11", "IN_USE"), Some(off));
        assert_eq!(segmk.site_tag("ODELAY_X1Y12", "ODELAY_TYPE_VARIABLE"), Some(on));
        assert_eq!(segmk.site_tag("ODELAY_X1Y12", "ODELAY_TYPE_FIXED"), Some(off));
        assert_eq!(segmk.site_tag("ODELAY_X1Y12", "ODELAY_VALUE[0]"), Some(off));
        assert_eq!(segmk.site_tag("ODELAY_X1Y12", "ODELAY_VALUE[1]"), Some(on));
        assert_eq!(segmk.site_tag("ODELAY_X1Y12", "ZODELAY_VALUE[4]"), Some(off));
        assert_eq!(segmk.site_tag("ODELAY_X1Y12", "IS_C_INVERTED"), Some(on));
        assert_eq!(segmk.site_tag("ODELAY_X1Y13", "IN_USE"), Some(off));
        assert_eq!(segmk.site_tag("ODELAY_X1Y14", "IN_USE"), Some(off));
        assert_eq!(segmk.site_tag("ODELAY_X1Y13", "ODELAY_TYPE_FIXED"), None);
    }

    #[test]
    fn test_odelay_manifest_file() {
        let grid = test_grid();
        let manifest = sample_odelay(&grid, 7, 0);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        manifest.write(&path).unwrap();
        let back = OdelayManifest::from_file(&path).unwrap();
        assert_eq!(back, manifest);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"mode\": \"delay\"") || text.contains("\"mode\": \"bypass\""));
    }
}
