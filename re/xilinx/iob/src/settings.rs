use std::error::Error;
use std::fs::read_to_string;
use std::path::Path;

use prjcombine_re_segmaker::FrameFilter;
use serde::Deserialize;

/// Per-device knobs that the physical grid files don't carry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Tile holding the device-wide DCI enable.
    pub cfg_tile: String,
    /// Height of an I/O bank in IOB rows.
    pub bank_rows: u32,
    pub vrp_row: u32,
    pub vrn_row: u32,
    pub vref_rows: Vec<u32>,
    /// Frames below this one belong to the interconnect, not the IOBs.
    pub min_frame: u32,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            cfg_tile: "CFG_CENTER_MID_X61Y84".into(),
            bank_rows: 50,
            vrp_row: 0,
            vrn_row: 49,
            vref_rows: vec![11, 37],
            min_frame: 38,
        }
    }
}

impl DeviceSettings {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn Error>> {
        let s = read_to_string(path)?;
        Ok(toml::from_str(&s)?)
    }

    /// Loads `device.toml` from a build directory, falling back to the
    /// defaults when there is none.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, Box<dyn Error>> {
        let path = dir.as_ref().join("device.toml");
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn frame_filter(&self) -> FrameFilter {
        FrameFilter::MinFrame(self.min_frame)
    }
}

#[test]
fn test_partial_settings() {
    let settings: DeviceSettings = toml::from_str(
        r#"
        cfg_tile = "CFG_CENTER_MID_X85Y130"
        vref_rows = [12, 38]
        "#,
    )
    .unwrap();
    assert_eq!(settings.cfg_tile, "CFG_CENTER_MID_X85Y130");
    assert_eq!(settings.vref_rows, [12, 38]);
    assert_eq!(settings.bank_rows, 50);
    assert_eq!(settings.frame_filter(), FrameFilter::MinFrame(38));
}

#[test]
fn test_missing_settings() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(
        DeviceSettings::from_dir(dir.path()).unwrap(),
        DeviceSettings::default()
    );
    std::fs::write(dir.path().join("device.toml"), "bank_rows = \"fifty\"\n").unwrap();
    assert!(DeviceSettings::from_dir(dir.path()).is_err());
}
