//! Per-site configuration chosen by the sampler.

use serde::{Deserialize, Serialize};

use crate::iostd::{Iostd, PULLS};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Pull {
    None,
    Keeper,
    Pulldown,
    Pullup,
}

impl Pull {
    pub const ALL: [Pull; 4] = [Pull::None, Pull::Keeper, Pull::Pulldown, Pull::Pullup];

    pub fn name(self) -> &'static str {
        PULLS[self as usize]
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Slew {
    Slow,
    Fast,
}

impl Slew {
    pub const ALL: [Slew; 2] = [Slew::Slow, Slew::Fast];

    pub fn name(self) -> &'static str {
        match self {
            Slew::Slow => "SLOW",
            Slew::Fast => "FAST",
        }
    }
}

/// What drives a tristate or disable pin.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CtrlSrc {
    Gnd,
    Net(String),
}

impl CtrlSrc {
    pub fn is_driven(&self) -> bool {
        matches!(self, CtrlSrc::Net(_))
    }

    pub fn verilog(&self) -> &str {
        match self {
            CtrlSrc::Gnd => "1'b0",
            CtrlSrc::Net(net) => net,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IobPrim {
    Ibuf {
        idelay_only: bool,
        ibuf_low_pwr: bool,
    },
    Ibufds {
        /// Standard of the pair, differential flavor of the bank one.
        iostandard: String,
        pair_site: String,
        idelay_only: bool,
        diff_term: bool,
        ibuf_low_pwr: bool,
    },
    Obuf {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        drive: Option<u8>,
        slew: Slew,
    },
    Obufds {
        iostandard: String,
        pair_site: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        drive: Option<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slew: Option<Slew>,
    },
    Obuftds {
        iostandard: String,
        pair_site: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        drive: Option<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slew: Option<Slew>,
        tristate: CtrlSrc,
    },
    IobufDcien {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        drive: Option<u8>,
        slew: Slew,
        tristate: CtrlSrc,
        ibufdisable: CtrlSrc,
        dcitermdisable: CtrlSrc,
    },
}

impl IobPrim {
    pub fn name(&self) -> &'static str {
        match self {
            IobPrim::Ibuf { .. } => "IBUF",
            IobPrim::Ibufds { .. } => "IBUFDS",
            IobPrim::Obuf { .. } => "OBUF",
            IobPrim::Obufds { .. } => "OBUFDS",
            IobPrim::Obuftds { .. } => "OBUFTDS",
            IobPrim::IobufDcien { .. } => "IOBUF_DCIEN",
        }
    }

    /// The companion site of a differential primitive.
    pub fn pair_site(&self) -> Option<&str> {
        match self {
            IobPrim::Ibufds { pair_site, .. }
            | IobPrim::Obufds { pair_site, .. }
            | IobPrim::Obuftds { pair_site, .. } => Some(pair_site),
            _ => None,
        }
    }

    /// Standard override of a differential primitive.
    pub fn iostandard(&self) -> Option<&str> {
        match self {
            IobPrim::Ibufds { iostandard, .. }
            | IobPrim::Obufds { iostandard, .. }
            | IobPrim::Obuftds { iostandard, .. } => Some(iostandard),
            _ => None,
        }
    }

    pub fn is_input(&self) -> bool {
        matches!(self, IobPrim::Ibuf { .. } | IobPrim::Ibufds { .. })
    }

    pub fn drives_pad(&self) -> bool {
        !self.is_input()
    }

    pub fn is_bidir(&self) -> bool {
        matches!(self, IobPrim::IobufDcien { .. })
    }

    pub fn idelay_only(&self) -> bool {
        match *self {
            IobPrim::Ibuf { idelay_only, .. } | IobPrim::Ibufds { idelay_only, .. } => idelay_only,
            _ => false,
        }
    }

    pub fn drive(&self) -> Option<u8> {
        match *self {
            IobPrim::Obuf { drive, .. }
            | IobPrim::Obufds { drive, .. }
            | IobPrim::Obuftds { drive, .. }
            | IobPrim::IobufDcien { drive, .. } => drive,
            _ => None,
        }
    }

    pub fn slew(&self) -> Option<Slew> {
        match *self {
            IobPrim::Obuf { slew, .. } | IobPrim::IobufDcien { slew, .. } => Some(slew),
            IobPrim::Obufds { slew, .. } | IobPrim::Obuftds { slew, .. } => slew,
            _ => None,
        }
    }
}

/// Routing bookkeeping for an active site: which top-level pads it uses and
/// which fabric nets connect it to the LUT network.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct IobPads {
    pub pad: String,
    /// Complementary pad of a differential pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpad: Option<String>,
    /// Net driven by the buffer's fabric-side output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_fabric: Option<String>,
    /// Net feeding the buffer's fabric-side input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_fabric: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct IobUsage {
    pub pull: Pull,
    pub prim: IobPrim,
    pub pads: IobPads,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct IobRecord {
    pub tile: String,
    pub site: String,
    /// Bank-wide standard; differential primitives carry their own.
    pub iostandard: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<IobUsage>,
}

impl IobRecord {
    /// The standard the site actually runs.
    pub fn iostd(&self) -> &'static Iostd {
        let name = self
            .usage
            .as_ref()
            .and_then(|usage| usage.prim.iostandard())
            .unwrap_or(&self.iostandard);
        match Iostd::lookup(name) {
            Some(std) => std,
            None => panic!("site {}: unknown IOSTANDARD {name}", self.site),
        }
    }

    pub fn is_active(&self) -> bool {
        self.usage.is_some()
    }
}
