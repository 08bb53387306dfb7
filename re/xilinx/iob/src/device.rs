use std::{
    collections::{BTreeMap, BTreeSet},
    error::Error,
    fs::read_to_string,
    path::Path,
};

use simple_error::bail;
use unnamed_entity::{EntityVec, entity_id};

use crate::settings::DeviceSettings;

entity_id! {
    pub id IobTileId u32;
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum IobSiteKind {
    /// `IOB18M`: decides whether its pair runs differentially.
    Master,
    /// `IOB18S`
    Slave,
    /// `IOB18`: the unpaired site at either end of a bank.
    Single,
}

impl IobSiteKind {
    pub fn from_site_type(site_type: &str) -> Option<IobSiteKind> {
        match site_type {
            "IOB18M" => Some(IobSiteKind::Master),
            "IOB18S" => Some(IobSiteKind::Slave),
            "IOB18" => Some(IobSiteKind::Single),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IobSite {
    pub name: String,
    pub kind: IobSiteKind,
}

/// Coordinates of a `..._X<n>Y<n>` site or tile name.
pub fn name_xy(name: &str) -> Option<(u32, u32)> {
    let (rest, y) = name.rsplit_once('Y')?;
    let (_, x) = rest.rsplit_once("_X")?;
    Some((x.parse().ok()?, y.parse().ok()?))
}

pub fn name_y(name: &str) -> Option<u32> {
    name_xy(name).map(|(_, y)| y)
}


#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IobTile {
    pub name: String,
    pub sites: Vec<IobSite>,
}

impl IobTile {
    pub fn site(&self, kind: IobSiteKind) -> Option<&IobSite> {
        self.sites.iter().find(|site| site.kind == kind)
    }

    pub fn is_pair(&self) -> bool {
        self.site(IobSiteKind::Master).is_some() && self.site(IobSiteKind::Slave).is_some()
    }
}

/// Tiles of a bank whose configuration depends on the bank-wide standard.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BankTiles {
    pub vrp: Option<String>,
    pub vrn: Option<String>,
    pub vref: Vec<String>,
}

pub trait IobGrid {
    fn tiles(&self) -> &EntityVec<IobTileId, IobTile>;
    fn banks(&self) -> Vec<u32>;
    fn site_bank(&self, site: &str) -> Option<u32>;
    fn site_region(&self, site: &str) -> Option<&str>;
    /// Regions with a delay-calibration site, that is, with a known HCLK tile.
    fn regions(&self) -> Vec<&str>;
    fn region_hclk_tile(&self, region: &str) -> Option<&str>;
    fn bank_special_tiles(&self, bank: u32) -> BankTiles;
    fn cfg_tile(&self) -> &str;

    fn bank_region(&self, bank: u32) -> Option<&str> {
        self.tiles()
            .values()
            .flat_map(|tile| &tile.sites)
            .filter(|site| self.site_bank(&site.name) == Some(bank))
            .find_map(|site| self.site_region(&site.name))
    }
}

#[derive(Clone, Debug, Default)]
pub struct IobDb {
    pub tiles: EntityVec<IobTileId, IobTile>,
    site_tile: BTreeMap<String, IobTileId>,
    site_bank: BTreeMap<String, u32>,
    site_region: BTreeMap<String, String>,
    // region -> (IDELAYCTRL site, HCLK tile)
    regions: BTreeMap<String, Option<(String, String)>>,
    pub settings: DeviceSettings,
}

impl IobDb {
    pub fn new(settings: DeviceSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    pub fn add_tile<'a>(
        &mut self,
        name: impl Into<String>,
        sites: impl IntoIterator<Item = (&'a str, IobSiteKind)>,
    ) -> IobTileId {
        let tile = IobTile {
            name: name.into(),
            sites: sites
                .into_iter()
                .map(|(name, kind)| IobSite {
                    name: name.to_string(),
                    kind,
                })
                .collect(),
        };
        let id = self.tiles.next_id();
        for site in &tile.sites {
            if let Some(prev) = self.site_tile.insert(site.name.clone(), id) {
                panic!(
                    "site {} in both {} and {}",
                    site.name, self.tiles[prev].name, tile.name
                );
            }
        }
        self.tiles.push(tile)
    }

    pub fn set_site_bank(&mut self, site: impl Into<String>, bank: u32) {
        let site = site.into();
        if let Some(prev) = self.site_bank.insert(site.clone(), bank) {
            panic!("site {site} in both bank {prev} and bank {bank}");
        }
    }

    /// Records a site's clock region; the region's `IDELAYCTRL` site fixes
    /// which HCLK tile carries the region-wide bits.
    pub fn add_region_site(
        &mut self,
        site: impl Into<String>,
        tile: impl Into<String>,
        region: impl Into<String>,
    ) {
        let site = site.into();
        let region = region.into();
        let entry = self.regions.entry(region.clone()).or_default();
        if site.contains("IDELAYCTRL") {
            if let Some((prev, _)) = entry {
                panic!("region {region} has two IDELAYCTRL sites: {prev} and {site}");
            }
            *entry = Some((site.clone(), tile.into()));
        }
        self.site_region.insert(site, region);
    }

    pub fn site_tile(&self, site: &str) -> Option<IobTileId> {
        self.site_tile.get(site).copied()
    }

    /// Loads the grid from a build directory holding `iob_tiles.csv`,
    /// `iobanks.txt`, `cmt_regions.csv` and, optionally, `device.toml`.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, Box<dyn Error>> {
        let dir = dir.as_ref();
        let mut db = IobDb::new(DeviceSettings::from_dir(dir)?);

        let mut tiles: BTreeMap<String, Vec<(String, IobSiteKind)>> = BTreeMap::new();
        for (lineno, fields) in read_csv(&dir.join("iob_tiles.csv"), 3)? {
            let Some(kind) = IobSiteKind::from_site_type(&fields[2]) else {
                bail!("iob_tiles.csv:{lineno}: unknown site type {}", fields[2]);
            };
            tiles
                .entry(fields[0].clone())
                .or_default()
                .push((fields[1].clone(), kind));
        }
        for (tile, sites) in &tiles {
            db.add_tile(
                tile.as_str(),
                sites.iter().map(|(site, kind)| (site.as_str(), *kind)),
            );
        }

        for (lineno, fields) in read_csv(&dir.join("iobanks.txt"), 2)? {
            let Ok(bank) = fields[1].parse() else {
                bail!("iobanks.txt:{lineno}: bad bank number {}", fields[1]);
            };
            if db.site_bank.contains_key(&fields[0]) {
                bail!("iobanks.txt:{lineno}: site {} listed twice", fields[0]);
            }
            db.set_site_bank(fields[0].as_str(), bank);
        }

        for (_, fields) in read_csv(&dir.join("cmt_regions.csv"), 3)? {
            db.add_region_site(&*fields[0], &*fields[1], &*fields[2]);
        }

        Ok(db)
    }
}

fn read_csv(path: &Path, num_fields: usize) -> Result<Vec<(usize, Vec<String>)>, Box<dyn Error>> {
    let text = match read_to_string(path) {
        Ok(text) => text,
        Err(e) => bail!("{}: {e}", path.display()),
    };
    let mut res = vec![];
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<String> = line.split(',').map(|f| f.trim().to_string()).collect();
        if fields.len() != num_fields {
            bail!(
                "{}:{}: expected {num_fields} fields, got {}",
                path.display(),
                idx + 1,
                fields.len()
            );
        }
        res.push((idx + 1, fields));
    }
    Ok(res)
}

impl IobGrid for IobDb {
    fn tiles(&self) -> &EntityVec<IobTileId, IobTile> {
        &self.tiles
    }

    fn banks(&self) -> Vec<u32> {
        let banks: BTreeSet<u32> = self.site_bank.values().copied().collect();
        banks.into_iter().collect()
    }

    fn site_bank(&self, site: &str) -> Option<u32> {
        self.site_bank.get(site).copied()
    }

    fn site_region(&self, site: &str) -> Option<&str> {
        self.site_region.get(site).map(|region| region.as_str())
    }

    fn regions(&self) -> Vec<&str> {
        self.regions
            .iter()
            .filter(|(_, hclk)| hclk.is_some())
            .map(|(region, _)| region.as_str())
            .collect()
    }

    fn region_hclk_tile(&self, region: &str) -> Option<&str> {
        let (_, tile) = self.regions.get(region)?.as_ref()?;
        Some(tile)
    }

    fn bank_special_tiles(&self, bank: u32) -> BankTiles {
        let settings = &self.settings;
        let mut res = BankTiles::default();
        let mut vref = BTreeMap::new();
        for (site, &site_bank) in &self.site_bank {
            if site_bank != bank {
                continue;
            }
            let (Some(y), Some(tile)) = (name_y(site), self.site_tile(site)) else {
                continue;
            };
            let tile = &self.tiles[tile].name;
            let row = y % settings.bank_rows;
            if row == settings.vrp_row {
                res.vrp = Some(tile.clone());
            }
            if row == settings.vrn_row {
                res.vrn = Some(tile.clone());
            }
            if let Some(idx) = settings.vref_rows.iter().position(|&r| r == row) {
                vref.insert(idx, tile.clone());
            }
        }
        res.vref = vref.into_values().collect();
        res
    }

    fn cfg_tile(&self) -> &str {
        &self.settings.cfg_tile
    }
}

/// Two HP banks (33 at rows 0-49, 34 at rows 50-99) with a handful of tiles
/// each, one clock region per bank, plus an extra region with no IOBs.
#[cfg(test)]
pub(crate) fn test_grid() -> IobDb {
    let mut db = IobDb::new(DeviceSettings::default());
    for (bank, base, region, hclk) in [
        (33, 0, "X1Y0", "HCLK_IOI3_X43Y26"),
        (34, 50, "X1Y1", "HCLK_IOI3_X43Y76"),
    ] {
        for y in [base, base + 49] {
            let site = format!("IOB_X1Y{y}");
            db.add_tile(
                format!("RIOB18_SING_X43Y{y}"),
                [(site.as_str(), IobSiteKind::Single)],
            );
        }
        for y in [base + 11, base + 13, base + 37] {
            let slave = format!("IOB_X1Y{y}");
            let master = format!("IOB_X1Y{}", y + 1);
            db.add_tile(
                format!("RIOB18_X43Y{y}"),
                [
                    (master.as_str(), IobSiteKind::Master),
                    (slave.as_str(), IobSiteKind::Slave),
                ],
            );
        }
        for row in [0, 11, 12, 13, 14, 37, 38, 49] {
            let site = format!("IOB_X1Y{}", base + row);
            db.set_site_bank(site.as_str(), bank);
            db.add_region_site(site, "RIOB18_X43Y0", region);
        }
        db.add_region_site(format!("IDELAYCTRL_X1Y{}", base / 50), hclk, region);
    }
    db.add_region_site("IDELAYCTRL_X1Y2", "HCLK_IOI3_X43Y126", "X1Y2");
    db.add_region_site("BUFHCE_X0Y0", "HCLK_L_X12Y26", "X0Y0");
    db
}

#[test]
fn test_name_xy() {
    assert_eq!(name_xy("RIOB18_SING_X43Y149"), Some((43, 149)));
    assert_eq!(name_xy("IDELAYCTRL_X1Y2"), Some((1, 2)));
    assert_eq!(name_xy("CFG_CENTER_MID"), None);
    assert_eq!(name_y("IOB_XAY3"), None);
}

#[test]
fn test_grid_lookups() {
    let db = test_grid();
    assert_eq!(db.banks(), [33, 34]);
    assert_eq!(db.site_bank("IOB_X1Y62"), Some(34));
    assert_eq!(db.site_bank("IOB_X1Y99"), Some(34));
    assert_eq!(db.site_region("IOB_X1Y12"), Some("X1Y0"));
    assert_eq!(db.regions(), ["X1Y0", "X1Y1", "X1Y2"]);
    assert_eq!(db.region_hclk_tile("X1Y1"), Some("HCLK_IOI3_X43Y76"));
    assert_eq!(db.region_hclk_tile("X0Y0"), None);
    assert_eq!(db.bank_region(34), Some("X1Y1"));
    assert_eq!(db.bank_region(35), None);
    let tile = &db.tiles[db.site_tile("IOB_X1Y12").unwrap()];
    assert_eq!(tile.name, "RIOB18_X43Y11");
    assert!(tile.is_pair());
    assert_eq!(name_y(&tile.site(IobSiteKind::Master).unwrap().name), Some(12));
}

#[test]
fn test_bank_special_tiles() {
    let db = test_grid();
    assert_eq!(
        db.bank_special_tiles(34),
        BankTiles {
            vrp: Some("RIOB18_SING_X43Y50".into()),
            vrn: Some("RIOB18_SING_X43Y99".into()),
            vref: vec!["RIOB18_X43Y61".into(), "RIOB18_X43Y87".into()],
        }
    );
    assert_eq!(db.bank_special_tiles(12), BankTiles::default());
}

#[test]
#[should_panic(expected = "two IDELAYCTRL sites")]
fn test_two_idelayctrl() {
    let mut db = test_grid();
    db.add_region_site("IDELAYCTRL_X1Y9", "HCLK_IOI3_X43Y27", "X1Y0");
}

#[test]
fn test_from_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("iob_tiles.csv"),
        "# tile,site,site_type\n\
         RIOB18_X43Y1,IOB_X1Y2,IOB18M\n\
         RIOB18_X43Y1,IOB_X1Y1,IOB18S\n\
         RIOB18_SING_X43Y0,IOB_X1Y0,IOB18\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("iobanks.txt"),
        "IOB_X1Y0,33\nIOB_X1Y1,33\nIOB_X1Y2,33\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("cmt_regions.csv"),
        "IOB_X1Y0,RIOB18_SING_X43Y0,X1Y0\nIDELAYCTRL_X1Y0,HCLK_IOI3_X43Y26,X1Y0\n",
    )
    .unwrap();
    let db = IobDb::from_dir(dir.path()).unwrap();
    assert_eq!(db.tiles.len(), 2);
    let names: Vec<_> = db.tiles.values().map(|tile| tile.name.as_str()).collect();
    assert_eq!(names, ["RIOB18_SING_X43Y0", "RIOB18_X43Y1"]);
    assert_eq!(db.bank_region(33), Some("X1Y0"));
    assert_eq!(db.region_hclk_tile("X1Y0"), Some("HCLK_IOI3_X43Y26"));
    assert_eq!(db.cfg_tile(), "CFG_CENTER_MID_X61Y84");

    std::fs::write(dir.path().join("iobanks.txt"), "IOB_X1Y0\n").unwrap();
    let err = IobDb::from_dir(dir.path()).unwrap_err();
    assert!(err.to_string().contains("expected 2 fields"));
}
