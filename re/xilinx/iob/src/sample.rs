use std::collections::BTreeMap;

use rand::{prelude::*, rngs::StdRng};

use crate::{
    config::{CtrlSrc, IobPads, IobPrim, IobRecord, IobUsage, Pull, Slew},
    device::{IobGrid, IobSiteKind, IobTile},
    iostd::{FUZZ_IOSTDS, Iostd, VREF_MV},
    lutmaker::LutMaker,
    manifest::Manifest,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum PrimKind {
    Ibuf,
    Obuf,
    IobufDcien,
    Ibufds,
    Obufds,
    Obuftds,
}

impl PrimKind {
    fn is_diff(self) -> bool {
        matches!(self, PrimKind::Ibufds | PrimKind::Obufds | PrimKind::Obuftds)
    }
}

/// Draw pool for every site; leaving a site unused is the most likely outcome.
const PRIM_POOL: &[Option<PrimKind>] = &[
    Some(PrimKind::Ibuf),
    Some(PrimKind::Obuf),
    Some(PrimKind::IobufDcien),
    None,
    None,
    None,
    None,
    None,
];

const DIFF_POOL: &[Option<PrimKind>] = &[
    Some(PrimKind::Ibufds),
    Some(PrimKind::Obufds),
    Some(PrimKind::Obuftds),
];

struct Sampler<'a, G: IobGrid> {
    rng: StdRng,
    grid: &'a G,
    iostd: &'static Iostd,
    luts: LutMaker,
    n_di: usize,
    n_do: usize,
    n_dio: usize,
    debug: u8,
}

impl<G: IobGrid> Sampler<'_, G> {
    fn ctrl(&mut self) -> CtrlSrc {
        if self.rng.random_bool(0.5) {
            CtrlSrc::Net(self.luts.next_output_net())
        } else {
            CtrlSrc::Gnd
        }
    }

    fn drive(&mut self, std: &Iostd) -> Option<u8> {
        std.drive.choose(&mut self.rng).copied()
    }

    fn slew(&mut self) -> Slew {
        *Slew::ALL.choose(&mut self.rng).unwrap()
    }

    fn di(&mut self) -> String {
        let res = format!("di[{}]", self.n_di);
        self.n_di += 1;
        res
    }

    fn do_(&mut self) -> String {
        let res = format!("do[{}]", self.n_do);
        self.n_do += 1;
        res
    }

    fn dio(&mut self) -> String {
        let res = format!("dio[{}]", self.n_dio);
        self.n_dio += 1;
        res
    }

    fn input_net(&mut self, site: &str, idelay_only: bool) -> String {
        if idelay_only {
            format!("idelay_{site}")
        } else {
            self.luts.next_input_net()
        }
    }

    fn ibuf_low_pwr(&mut self, std: &Iostd) -> bool {
        if std.supports_ibuf_low_pwr() {
            self.rng.random()
        } else {
            true
        }
    }

    fn choose_prims(&mut self, tile: &IobTile) -> Vec<Option<PrimKind>> {
        let diff_ok = !self.iostd.diff_variants().is_empty();
        let mut res = vec![];
        for site in &tile.sites {
            let kind = if site.kind == IobSiteKind::Master && diff_ok {
                let pool: Vec<_> = PRIM_POOL.iter().chain(DIFF_POOL).copied().collect();
                *pool.choose(&mut self.rng).unwrap()
            } else {
                *PRIM_POOL.choose(&mut self.rng).unwrap()
            };
            res.push(kind);
        }
        let master_diff = tile
            .sites
            .iter()
            .zip(&res)
            .any(|(site, kind)| {
                site.kind == IobSiteKind::Master && kind.is_some_and(PrimKind::is_diff)
            });
        if master_diff {
            for (site, kind) in tile.sites.iter().zip(&mut res) {
                if site.kind == IobSiteKind::Slave {
                    *kind = None;
                }
            }
        }
        res
    }

    fn make_usage(&mut self, tile: &IobTile, site: &str, kind: PrimKind) -> IobUsage {
        let pull = *Pull::ALL.choose(&mut self.rng).unwrap();
        let iostd = self.iostd;
        let mut pads = IobPads::default();
        let prim = if kind.is_diff() {
            let iostandard = *iostd.diff_variants().choose(&mut self.rng).unwrap();
            let std = Iostd::lookup(iostandard).unwrap();
            let pair_site = tile.site(IobSiteKind::Slave).unwrap().name.clone();
            match kind {
                PrimKind::Ibufds => {
                    pads.pad = self.di();
                    pads.bpad = Some(self.di());
                    let idelay_only = self.rng.random();
                    let diff_term = self.rng.random();
                    pads.to_fabric = Some(self.input_net(site, idelay_only));
                    IobPrim::Ibufds {
                        iostandard: iostandard.to_string(),
                        pair_site,
                        idelay_only,
                        diff_term,
                        ibuf_low_pwr: self.ibuf_low_pwr(std),
                    }
                }
                _ => {
                    pads.pad = self.do_();
                    pads.bpad = Some(self.do_());
                    let tristate = (kind == PrimKind::Obuftds).then(|| self.ctrl());
                    pads.from_fabric = Some(self.luts.next_output_net());
                    let (drive, slew) = if std.is_true_diff() {
                        (None, None)
                    } else {
                        (self.drive(std), Some(self.slew()))
                    };
                    match tristate {
                        Some(tristate) => IobPrim::Obuftds {
                            iostandard: iostandard.to_string(),
                            pair_site,
                            drive,
                            slew,
                            tristate,
                        },
                        None => IobPrim::Obufds {
                            iostandard: iostandard.to_string(),
                            pair_site,
                            drive,
                            slew,
                        },
                    }
                }
            }
        } else {
            match kind {
                PrimKind::Ibuf => {
                    pads.pad = self.di();
                    let idelay_only = self.rng.random();
                    pads.to_fabric = Some(self.input_net(site, idelay_only));
                    IobPrim::Ibuf {
                        idelay_only,
                        ibuf_low_pwr: self.ibuf_low_pwr(iostd),
                    }
                }
                PrimKind::Obuf => {
                    pads.pad = self.do_();
                    pads.from_fabric = Some(self.luts.next_output_net());
                    IobPrim::Obuf {
                        drive: self.drive(iostd),
                        slew: self.slew(),
                    }
                }
                _ => {
                    pads.pad = self.dio();
                    pads.from_fabric = Some(self.luts.next_output_net());
                    pads.to_fabric = Some(self.luts.next_input_net());
                    IobPrim::IobufDcien {
                        drive: self.drive(iostd),
                        slew: self.slew(),
                        tristate: self.ctrl(),
                        ibufdisable: self.ctrl(),
                        dcitermdisable: self.ctrl(),
                    }
                }
            }
        };
        IobUsage { pull, prim, pads }
    }

    fn sample(mut self, seed: u64) -> Manifest {
        let iostandard = self.iostd.name;
        let grid = self.grid;
        let iobanks = grid.banks();
        let mut internal_vref = BTreeMap::new();
        if self.iostd.needs_vref() {
            for &bank in &iobanks {
                internal_vref.insert(bank, *VREF_MV.choose(&mut self.rng).unwrap());
            }
        }
        let mut sites = vec![];
        for tile in grid.tiles().values() {
            // single sites sit on the VRP/VRN rows and stay free for DCI
            let kinds = if tile.is_pair() {
                self.choose_prims(tile)
            } else {
                vec![None; tile.sites.len()]
            };
            for (site, kind) in tile.sites.iter().zip(kinds) {
                let usage = kind.map(|kind| self.make_usage(tile, &site.name, kind));
                if self.debug >= 2 {
                    match &usage {
                        Some(usage) => {
                            clilog::debug!("{} {}: {:?}", tile.name, site.name, usage.prim)
                        }
                        None => clilog::debug!("{} {}: unused", tile.name, site.name),
                    }
                }
                sites.push(IobRecord {
                    tile: tile.name.clone(),
                    site: site.name.clone(),
                    iostandard: iostandard.to_string(),
                    usage,
                });
            }
        }
        if self.debug >= 1 {
            clilog::info!(
                "{iostandard}: {} inputs, {} outputs, {} bidirectional pads",
                self.n_di,
                self.n_do,
                self.n_dio
            );
        }
        Manifest {
            seed,
            iostandard: iostandard.to_string(),
            iobanks,
            internal_vref,
            luts: self.luts,
            sites,
        }
    }
}

/// Draws one random IOB design for the whole grid. The same seed always
/// yields the same manifest.
pub fn sample_iobs(grid: &impl IobGrid, seed: u64, debug: u8) -> Manifest {
    let mut rng = StdRng::seed_from_u64(seed);
    let iostandard = *FUZZ_IOSTDS.choose(&mut rng).unwrap();
    let sampler = Sampler {
        rng,
        grid,
        iostd: Iostd::lookup(iostandard).unwrap(),
        luts: LutMaker::new(),
        n_di: 0,
        n_do: 0,
        n_dio: 0,
        debug,
    };
    sampler.sample(seed)
}
