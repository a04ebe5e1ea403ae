//! Strongly-typed identifiers.
//!
//! Context handles, metric identifiers and instance domains all travel as
//! 32-bit integers on the wire; the newtypes keep them apart in the API.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain number reserved for derived (computed client-side) metrics.
pub const DYNAMIC_DOMAIN: u32 = 511;

/// Context handle. Non-negative for live contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Handle(i32);

impl Handle {
    /// Reconstruct a handle from its raw value. Negative values are
    /// rejected later by the context table with `NoContext`.
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Macro to define a domain-qualified 32-bit identifier.
///
/// Generates: struct, `from_raw()`, `as_raw()`, `domain()`.
/// The domain occupies bits 22..31 in both metric ids and instance domains.
macro_rules! define_ident {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            pub const fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            pub const fn as_raw(self) -> u32 {
                self.0
            }

            /// Agent domain responsible for this identifier.
            pub const fn domain(self) -> u32 {
                (self.0 >> 22) & 0x1ff
            }
        }
    };
}

define_ident!(Pmid);
define_ident!(InDom);

impl Pmid {
    /// Build a metric id from its domain, cluster and item parts.
    pub const fn new(domain: u32, cluster: u32, item: u32) -> Self {
        Self(((domain & 0x1ff) << 22) | ((cluster & 0xfff) << 10) | (item & 0x3ff))
    }

    pub const fn cluster(self) -> u32 {
        (self.0 >> 10) & 0xfff
    }

    pub const fn item(self) -> u32 {
        self.0 & 0x3ff
    }

    /// Derived metrics have no agent and therefore no help text.
    pub const fn is_derived(self) -> bool {
        self.domain() == DYNAMIC_DOMAIN && self.item() != 0
    }
}

impl fmt::Display for Pmid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.domain(), self.cluster(), self.item())
    }
}

impl InDom {
    pub const fn new(domain: u32, serial: u32) -> Self {
        Self(((domain & 0x1ff) << 22) | (serial & 0x3f_ffff))
    }

    pub const fn serial(self) -> u32 {
        self.0 & 0x3f_ffff
    }
}

impl fmt::Display for InDom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain(), self.serial())
    }
}

/// Requested text detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextLevel {
    OneLine,
    Help,
}

/// What the text describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextTarget {
    Pmid,
    Indom,
}

/// Wire bit for [`TextLevel::OneLine`].
pub const TEXT_ONELINE: u32 = 0x1;
/// Wire bit for [`TextLevel::Help`].
pub const TEXT_HELP: u32 = 0x2;
/// Wire bit for [`TextTarget::Pmid`].
pub const TEXT_PMID: u32 = 0x4;
/// Wire bit for [`TextTarget::Indom`].
pub const TEXT_INDOM: u32 = 0x8;

/// One text lookup: ident plus level and target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextRequest {
    pub ident: u32,
    pub level: TextLevel,
    pub target: TextTarget,
}

impl TextRequest {
    pub fn pmid(pmid: Pmid, level: TextLevel) -> Self {
        Self {
            ident: pmid.as_raw(),
            level,
            target: TextTarget::Pmid,
        }
    }

    pub fn indom(indom: InDom, level: TextLevel) -> Self {
        Self {
            ident: indom.as_raw(),
            level,
            target: TextTarget::Indom,
        }
    }

    /// Domain of the agent that owns the ident.
    pub const fn domain(&self) -> u32 {
        (self.ident >> 22) & 0x1ff
    }

    /// Same request at one-line level.
    pub fn one_line(self) -> Self {
        Self {
            level: TextLevel::OneLine,
            ..self
        }
    }

    /// Encode level and target as the wire `type` bits.
    pub fn type_bits(&self) -> u32 {
        let level = match self.level {
            TextLevel::OneLine => TEXT_ONELINE,
            TextLevel::Help => TEXT_HELP,
        };
        let target = match self.target {
            TextTarget::Pmid => TEXT_PMID,
            TextTarget::Indom => TEXT_INDOM,
        };
        level | target
    }

    /// Inverse of [`TextRequest::type_bits`]. `None` if the bits do not name
    /// exactly one level and one target.
    pub fn from_wire(ident: u32, bits: u32) -> Option<Self> {
        let level = match bits & (TEXT_ONELINE | TEXT_HELP) {
            TEXT_ONELINE => TextLevel::OneLine,
            TEXT_HELP => TextLevel::Help,
            _ => return None,
        };
        let target = match bits & (TEXT_PMID | TEXT_INDOM) {
            TEXT_PMID => TextTarget::Pmid,
            TEXT_INDOM => TextTarget::Indom,
            _ => return None,
        };
        Some(Self {
            ident,
            level,
            target,
        })
    }
}
