//! Tunable constants an integrator can retarget for a different radio or flash
//! layout without touching core logic (§3.1).

use embassy_time::Duration;

use crate::protocol::IntervalClass;

/// Mesh DFU UUID bytes referenced from the outbound advertisement envelope (§6).
pub const DEFAULT_MESH_UUID: [u8; 2] = [0xFE, 0xCA];

/// Fixed overhead (packet_type byte + length fields) added on top of the DFU
/// payload length when filling the outbound advertisement envelope (§6).
pub const DFU_PACKET_ADV_OVERHEAD: usize = 3;

/// Bytes per on-flash segment (§4.6, glossary "Segment").
pub const SEGMENT_LENGTH: u32 = 16;

/// Ring-buffer capacities (§3), both power-of-two.
pub const REQ_CACHE_LEN: usize = 4;
pub const TID_CACHE_LEN: usize = 8;

/// Per-state timeouts (§4.1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BootloaderConfig {
    pub find_fwid_timeout: Duration,
    pub req_timeout: Duration,
    pub ready_timeout: Duration,
    pub target_timeout: Duration,
    pub rampdown_timeout: Duration,
    /// Flash erase granularity; used to compute the bootloader-upgrade bank
    /// address (§4.6).
    pub page_size: u32,
    pub mesh_uuid: [u8; 2],
    pub data_repeat_count: u8,
    pub data_interval_class: IntervalClass,
    pub rsp_repeat_count: u8,
    pub rsp_interval_class: IntervalClass,
}

impl Default for BootloaderConfig {
    fn default() -> Self {
        Self {
            find_fwid_timeout: Duration::from_millis(500),
            req_timeout: Duration::from_secs(1),
            ready_timeout: Duration::from_secs(3),
            target_timeout: Duration::from_secs(5),
            rampdown_timeout: Duration::from_secs(1),
            page_size: 0x1000,
            mesh_uuid: DEFAULT_MESH_UUID,
            data_repeat_count: 3,
            data_interval_class: IntervalClass::Fast,
            rsp_repeat_count: 1,
            rsp_interval_class: IntervalClass::Fast,
        }
    }
}
