//! Persistent bootloader info store (§3 "Persistent bootloader info", §6 "Info
//! store API consumed").
//!
//! Read-only to the core apart from the one journal write performed at init
//! (§9 "Pointer aliasing between info store and live records").

use p256::ecdsa::VerifyingKey;

use crate::components::MemoryMap;
use crate::protocol::Fwid;

/// All six info entries read at init (§4.8).
#[derive(Clone)]
pub struct BootInfo {
    pub fwid: Fwid,
    pub memory_map: MemoryMap,
    pub sd_intact: bool,
    pub app_intact: bool,
    pub public_key: Option<VerifyingKey>,
    /// Journal area reserved for the flash writer; `None` until the first
    /// init pass allocates it (§4.8).
    pub journal: Option<[u8; JOURNAL_LEN]>,
}

/// Scratch area size for the flash writer's journal. Two halves, per §4.8
/// ("Initialize the flash writer's journal with two halves of the journal
/// area").
pub const JOURNAL_LEN: usize = 64;

/// Sentinel marking a version field as "not yet provisioned" (§4.8,
/// "the runtime version is the sentinel 'invalid'").
pub const VERSION_INVALID: u16 = 0xFFFF;

/// Read-only (save for the journal) persistent info store consumed by the core.
pub trait InfoStore {
    /// Fatal if any of the six fixed entries is missing or malformed (§4.8,
    /// "Any pointer into non-info memory is fatal").
    fn read_boot_info(&self) -> Option<BootInfo>;

    /// Persists a freshly allocated (all-0xFF) journal the first time the
    /// entry is absent (§4.8).
    fn write_journal(&mut self, journal: &[u8; JOURNAL_LEN]) -> bool;
}
