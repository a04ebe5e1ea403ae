//! `$PCP_DEBUG` bitmask.

use std::sync::OnceLock;

static PROCESS_FLAGS: OnceLock<DebugFlags> = OnceLock::new();

/// Categories of debug tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugFlags(u32);

impl DebugFlags {
    /// Frame-level send/receive tracing.
    pub const PDU: u32 = 0x1;
    /// Context create/destroy/reconnect tracing.
    pub const CONTEXT: u32 = 0x2;
    /// Lock tracing master switch.
    pub const LOCK: u32 = 0x4;
    /// Report the global lock.
    pub const LOCK_GLOBAL: u32 = 0x8;
    /// Report per-context locks.
    pub const LOCK_CONTEXT: u32 = 0x10;
    /// Report scoped locks.
    pub const LOCK_OTHER: u32 = 0x20;
    /// Report lock failures with a backtrace.
    pub const DESPERATE: u32 = 0x40;

    const LOCK_CATEGORIES: u32 = Self::LOCK_GLOBAL | Self::LOCK_CONTEXT | Self::LOCK_OTHER;

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    /// Whether lock tracing covers `category`. With no category bit set,
    /// every category is reported.
    pub(crate) const fn reports_lock(self, category: u32) -> bool {
        if !self.contains(Self::LOCK) {
            return false;
        }
        self.0 & Self::LOCK_CATEGORIES == 0 || self.0 & category != 0
    }

    /// Parse a `$PCP_DEBUG` value. Decimal only.
    pub fn parse(raw: &str) -> Option<Self> {
        raw.trim().parse::<u32>().ok().map(Self)
    }

    /// Process-wide flags from `$PCP_DEBUG`, read on first use only.
    pub(crate) fn process() -> Self {
        *PROCESS_FLAGS.get_or_init(|| match std::env::var("PCP_DEBUG") {
            Ok(raw) => Self::parse(&raw).unwrap_or_else(|| {
                tracing::warn!("$PCP_DEBUG={} is not numeric, ignored", raw);
                Self::default()
            }),
            Err(_) => Self::default(),
        })
    }
}
