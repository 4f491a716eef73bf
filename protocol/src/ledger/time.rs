//! # Slots and Wall-Clock Time
//!
//! The ledger measures time in slots; the escrow datum measures it in POSIX
//! milliseconds. The two never mix implicitly: every conversion goes through
//! a [`SlotConfig`], and seconds only enter through
//! [`PosixMillis::from_secs`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Milliseconds in one second.
pub const MILLIS_PER_SECOND: u64 = 1_000;

/// Milliseconds in one day.
pub const MILLIS_PER_DAY: u64 = 86_400 * MILLIS_PER_SECOND;

/// A ledger slot number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slot(pub u64);

impl Slot {
    /// Slot `n` later, saturating at `u64::MAX`.
    pub fn saturating_add(self, n: u64) -> Slot {
        Slot(self.0.saturating_add(n))
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}", self.0)
    }
}

/// A POSIX timestamp in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PosixMillis(pub u64);

impl PosixMillis {
    /// Converts whole POSIX seconds. `None` on overflow.
    pub fn from_secs(secs: u64) -> Option<Self> {
        secs.checked_mul(MILLIS_PER_SECOND).map(Self)
    }

    /// Whole seconds, truncating.
    pub fn as_secs(self) -> u64 {
        self.0 / MILLIS_PER_SECOND
    }

    /// The raw millisecond count.
    pub fn as_millis(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PosixMillis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Mapping between slots and wall-clock time for one network era.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotConfig {
    /// POSIX time (ms) at which `zero_slot` began.
    pub zero_time_ms: u64,
    /// First slot of the era this mapping describes.
    pub zero_slot: u64,
    /// Slot duration in milliseconds.
    pub slot_length_ms: u64,
}

impl SlotConfig {
    /// Public testnet "preprod".
    pub const PREPROD: SlotConfig = SlotConfig {
        zero_time_ms: 1_655_769_600_000,
        zero_slot: 86_400,
        slot_length_ms: 1_000,
    };

    /// Public testnet "preview".
    pub const PREVIEW: SlotConfig = SlotConfig {
        zero_time_ms: 1_666_656_000_000,
        zero_slot: 0,
        slot_length_ms: 1_000,
    };

    /// Mainnet, Shelley era onwards.
    pub const MAINNET: SlotConfig = SlotConfig {
        zero_time_ms: 1_596_059_091_000,
        zero_slot: 4_492_800,
        slot_length_ms: 1_000,
    };

    /// POSIX time at which `slot` begins. Slots before the era start map to
    /// the era start.
    pub fn slot_to_posix(&self, slot: Slot) -> PosixMillis {
        let elapsed = slot.0.saturating_sub(self.zero_slot);
        PosixMillis(
            self.zero_time_ms
                .saturating_add(elapsed.saturating_mul(self.slot_length_ms)),
        )
    }

    /// The slot containing `time`, i.e. the last slot that starts at or
    /// before it.
    pub fn posix_to_slot(&self, time: PosixMillis) -> Slot {
        let elapsed = time.0.saturating_sub(self.zero_time_ms);
        let length = self.slot_length_ms.max(1);
        Slot(self.zero_slot.saturating_add(elapsed / length))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preprod_zero_slot_maps_to_zero_time() {
        let cfg = SlotConfig::PREPROD;
        assert_eq!(
            cfg.slot_to_posix(Slot(86_400)),
            PosixMillis(1_655_769_600_000)
        );
        assert_eq!(cfg.posix_to_slot(PosixMillis(1_655_769_600_000)), Slot(86_400));
    }

    #[test]
    fn conversion_roundtrips_on_slot_boundaries() {
        let cfg = SlotConfig::MAINNET;
        for slot in [4_492_800u64, 4_492_801, 100_000_000] {
            assert_eq!(cfg.posix_to_slot(cfg.slot_to_posix(Slot(slot))), Slot(slot));
        }
    }

    #[test]
    fn mid_slot_time_floors() {
        let cfg = SlotConfig::PREVIEW;
        let start = cfg.slot_to_posix(Slot(10));
        assert_eq!(cfg.posix_to_slot(PosixMillis(start.0 + 999)), Slot(10));
        assert_eq!(cfg.posix_to_slot(PosixMillis(start.0 + 1_000)), Slot(11));
    }

    #[test]
    fn seconds_convert_exactly() {
        assert_eq!(PosixMillis::from_secs(1_700_000_000), Some(PosixMillis(1_700_000_000_000)));
        assert_eq!(PosixMillis(1_700_000_000_999).as_secs(), 1_700_000_000);
        assert_eq!(PosixMillis::from_secs(u64::MAX), None);
    }

    #[test]
    fn serde_is_transparent() {
        assert_eq!(serde_json::to_string(&Slot(42)).unwrap(), "42");
        assert_eq!(serde_json::to_string(&PosixMillis(7)).unwrap(), "7");
    }
}
