use std::{
    collections::{BTreeMap, btree_map},
    error::Error,
    fmt::{self, Display},
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use simple_error::bail;

/// Where a tag lives: on a single site (resolved to its tile position by the
/// correlation stage), or on a whole tile.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TagScope {
    Site(String),
    Tile(String),
}

impl Display for TagScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagScope::Site(site) => write!(f, "site:{site}"),
            TagScope::Tile(tile) => write!(f, "tile:{tile}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagValue {
    Bool(bool),
}

impl From<bool> for TagValue {
    fn from(value: bool) -> Self {
        TagValue::Bool(value)
    }
}

impl Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TagValue::Bool(val) => write!(f, "{}", u8::from(val)),
        }
    }
}

/// Which configuration frames the correlation stage may attribute tags to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFilter {
    All,
    MinFrame(u32),
}

impl FrameFilter {
    pub fn accepts(self, frame: u32, _word: u32) -> bool {
        match self {
            FrameFilter::All => true,
            FrameFilter::MinFrame(min) => frame >= min,
        }
    }
}

impl Display for FrameFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            FrameFilter::All => write!(f, "all"),
            FrameFilter::MinFrame(min) => write!(f, ">={min}"),
        }
    }
}

/// Append-only destination for tags.
pub trait TagSink {
    fn add_site_tag(&mut self, site: &str, name: impl Into<String>, value: impl Into<TagValue>);

    fn add_tile_tag(&mut self, tile: &str, name: impl Into<String>, value: impl Into<TagValue>);

    /// Emits `prefix + option` for every option of an enumerated setting,
    /// true exactly for `value`.
    ///
    /// `zero` is the option the hardware encodes as all-clear. It must be part
    /// of the option set, and gets a tag like every other option so that its
    /// selection shows up as explicit negative evidence on the others.
    fn add_site_group_zero<S: AsRef<str>>(
        &mut self,
        site: &str,
        prefix: &str,
        options: impl IntoIterator<Item = S>,
        zero: &str,
        value: &str,
    ) {
        for (option, hit) in check_group(prefix, options, zero, value) {
            self.add_site_tag(site, format!("{prefix}{option}"), hit);
        }
    }

    fn add_tile_group_zero<S: AsRef<str>>(
        &mut self,
        tile: &str,
        prefix: &str,
        options: impl IntoIterator<Item = S>,
        zero: &str,
        value: &str,
    ) {
        for (option, hit) in check_group(prefix, options, zero, value) {
            self.add_tile_tag(tile, format!("{prefix}{option}"), hit);
        }
    }
}

fn check_group<S: AsRef<str>>(
    prefix: &str,
    options: impl IntoIterator<Item = S>,
    zero: &str,
    value: &str,
) -> Vec<(String, bool)> {
    let options: Vec<String> = options
        .into_iter()
        .map(|option| option.as_ref().to_string())
        .collect();
    assert!(
        options.iter().any(|option| option == zero),
        "group {prefix}: zero value {zero} not among {options:?}"
    );
    assert!(
        options.iter().any(|option| option == value),
        "group {prefix}: value {value} not among {options:?}"
    );
    options
        .into_iter()
        .map(|option| {
            let hit = option == value;
            (option, hit)
        })
        .collect()
}

/// In-memory tag collection for one pass over a design.
///
/// Every `(scope, name)` pair is write-once: emitting the same value again is
/// harmless, emitting a different one means two parts of the fuzzer disagree
/// about the design and aborts the run.
#[derive(Debug, Default)]
pub struct Segmaker {
    tags: BTreeMap<(TagScope, String), TagValue>,
    pub debug: u8,
}

impl Segmaker {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_tag(&mut self, scope: TagScope, name: String, value: TagValue) {
        match self.tags.entry((scope, name)) {
            btree_map::Entry::Occupied(e) => {
                let (scope, name) = e.key();
                let cur = *e.get();
                if cur != value {
                    panic!("TAG CONFLICT: {scope} {name}: {cur} vs {value}");
                }
            }
            btree_map::Entry::Vacant(e) => {
                if self.debug >= 3 {
                    let (scope, name) = e.key();
                    clilog::debug!("TAG {scope} {name} {value}");
                }
                e.insert(value);
            }
        }
    }

    pub fn get(&self, scope: &TagScope, name: &str) -> Option<TagValue> {
        self.tags.get(&(scope.clone(), name.to_string())).copied()
    }

    pub fn site_tag(&self, site: &str, name: &str) -> Option<TagValue> {
        self.get(&TagScope::Site(site.to_string()), name)
    }

    pub fn tile_tag(&self, tile: &str, name: &str) -> Option<TagValue> {
        self.get(&TagScope::Tile(tile.to_string()), name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TagScope, &str, TagValue)> {
        self.tags
            .iter()
            .map(|((scope, name), &value)| (scope, name.as_str(), value))
    }

    /// All tags attached to one scope, in name order.
    pub fn scope_tags(&self, scope: &TagScope) -> BTreeMap<&str, TagValue> {
        self.iter()
            .filter(|&(s, _, _)| s == scope)
            .map(|(_, name, value)| (name, value))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn compile(self, filter: FrameFilter) -> CompiledTags {
        CompiledTags {
            filter,
            tags: self
                .tags
                .into_iter()
                .map(|((scope, name), value)| (scope, name, value))
                .collect(),
        }
    }
}

impl TagSink for Segmaker {
    fn add_site_tag(&mut self, site: &str, name: impl Into<String>, value: impl Into<TagValue>) {
        self.add_tag(TagScope::Site(site.to_string()), name.into(), value.into());
    }

    fn add_tile_tag(&mut self, tile: &str, name: impl Into<String>, value: impl Into<TagValue>) {
        self.add_tag(TagScope::Tile(tile.to_string()), name.into(), value.into());
    }
}

/// A frozen tag set, ready to be handed to the correlation stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledTags {
    pub filter: FrameFilter,
    pub tags: Vec<(TagScope, String, TagValue)>,
}

impl CompiledTags {
    pub fn emit(&self, mut f: impl Write) -> std::io::Result<()> {
        writeln!(f, "# frames: {}", self.filter)?;
        for (scope, name, value) in &self.tags {
            writeln!(f, "{scope} {name} {value}")?;
        }
        Ok(())
    }

    pub fn write(&self, path: impl AsRef<Path>, allow_empty: bool) -> Result<(), Box<dyn Error>> {
        let path = path.as_ref();
        if self.tags.is_empty() && !allow_empty {
            bail!("no tags to write to {}", path.display());
        }
        let mut f = BufWriter::new(File::create(path)?);
        self.emit(&mut f)?;
        f.flush()?;
        Ok(())
    }
}

#[test]
fn test_write_once() {
    let mut segmk = Segmaker::new();
    segmk.add_site_tag("IOB_X1Y10", "LVCMOS18.IN_USE", true);
    segmk.add_site_tag("IOB_X1Y10", "LVCMOS18.IN_USE", true);
    segmk.add_tile_tag("RIOB18_X43Y9", "IN_DIFF", false);
    assert_eq!(segmk.len(), 2);
    assert_eq!(
        segmk.site_tag("IOB_X1Y10", "LVCMOS18.IN_USE"),
        Some(TagValue::Bool(true))
    );
    assert_eq!(segmk.tile_tag("RIOB18_X43Y9", "IN_DIFF"), Some(false.into()));
    assert_eq!(segmk.site_tag("IOB_X1Y9", "LVCMOS18.IN_USE"), None);
}

#[test]
#[should_panic(expected = "TAG CONFLICT")]
fn test_write_once_conflict() {
    let mut segmk = Segmaker::new();
    segmk.add_tile_tag("RIOB18_X43Y9", "OUT_DIFF", true);
    segmk.add_tile_tag("RIOB18_X43Y9", "OUT_DIFF", false);
}

#[test]
fn test_group_zero() {
    let mut segmk = Segmaker::new();
    segmk.add_site_group_zero(
        "IOB_X1Y10",
        "PULLTYPE.",
        ["NONE", "KEEPER", "PULLDOWN", "PULLUP"],
        "PULLDOWN",
        "KEEPER",
    );
    let tags = segmk.scope_tags(&TagScope::Site("IOB_X1Y10".into()));
    assert_eq!(tags.len(), 4);
    assert_eq!(tags["PULLTYPE.KEEPER"], TagValue::Bool(true));
    assert_eq!(
        tags.values()
            .filter(|&&v| v == TagValue::Bool(true))
            .count(),
        1
    );
}

#[test]
#[should_panic(expected = "not among")]
fn test_group_zero_bad_value() {
    let mut segmk = Segmaker::new();
    segmk.add_tile_group_zero("HCLK_IOI_X43Y25", "VREF.", ["V_600_MV"], "V_600_MV", "V_1_MV");
}

#[test]
fn test_compile_write() {
    let mut segmk = Segmaker::new();
    segmk.add_tile_tag("CFG_CENTER_MID_X61Y84", "DCI_USED", true);
    segmk.add_site_tag("IOB_X1Y3", "SSTL15.IN", false);
    let compiled = segmk.compile(FrameFilter::MinFrame(38));
    assert!(compiled.filter.accepts(38, 0));
    assert!(!compiled.filter.accepts(37, 100));
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("segdata.txt");
    compiled.write(&path, false).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(
        text,
        "# frames: >=38\nsite:IOB_X1Y3 SSTL15.IN 0\ntile:CFG_CENTER_MID_X61Y84 DCI_USED 1\n"
    );
}

#[test]
fn test_write_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("segdata.txt");
    let compiled = Segmaker::new().compile(FrameFilter::All);
    assert!(compiled.write(&path, false).is_err());
    compiled.write(&path, true).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "# frames: all\n");
}
