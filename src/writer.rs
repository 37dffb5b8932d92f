//! Trait for the flash writer that persists received segments and tracks the
//! running image hash (§6 "Flash writer API consumed"). Synchronous, per §5:
//! "calls into it return immediately with a best-effort status".

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashWriterError {
    Busy,
    OutOfBounds,
    NotStarted,
}

/// Status of a single `dfu_data` write (§4.6: "Decrement `segments_remaining`
/// only on successful write. Duplicate or invalid writes do not decrement.").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteStatus {
    Written,
    Duplicate,
    Rejected(FlashWriterError),
}

/// Driver boundary for the flash writer (§6).
pub trait FlashWriter {
    /// Seeds the writer's journal with the two halves of the journal area
    /// read from persistent info (§4.8).
    fn init_journal(&mut self, first_half: &[u8], second_half: &[u8]);

    /// Opens a transfer: target start address, bank (staging) address, total
    /// length, and the carried-over `segment_is_valid_after_transfer` flag
    /// from the start packet (§3, §4.6).
    fn dfu_start(&mut self, start: u32, bank: u32, length: u32, seg_valid_after_transfer: bool) -> Result<(), FlashWriterError>;

    /// Writes `bytes` at `addr`. Idempotent: re-writing the same bytes at the
    /// same address that were already durably written is reported as
    /// `Duplicate`, not `Written` (§4.6, §5 "Ordering guarantees").
    fn dfu_data(&mut self, addr: u32, bytes: &[u8]) -> WriteStatus;

    /// Closes the transfer; the running SHA-256 is finalized for
    /// `dfu_sha256` (§4.6 "Finalization").
    fn dfu_end(&mut self);

    /// True and fills `out` iff the segment at `addr` (`len` bytes) has
    /// already been durably written, for serving `DATA_REQ` (§4.7).
    fn dfu_has_entry(&self, addr: u32, out: &mut [u8]) -> bool;

    /// Running SHA-256 hash over everything written since `dfu_start` (§4.6).
    fn dfu_sha256(&self) -> [u8; 32];
}

/// A no-op fake used by tests and by integrators bringing up the rest of the
/// stack before a real flash driver exists.
#[derive(Default)]
pub struct FlashWriterNop;

impl FlashWriter for FlashWriterNop {
    fn init_journal(&mut self, _first_half: &[u8], _second_half: &[u8]) {}

    fn dfu_start(&mut self, _start: u32, _bank: u32, _length: u32, _seg_valid_after_transfer: bool) -> Result<(), FlashWriterError> {
        Ok(())
    }

    fn dfu_data(&mut self, _addr: u32, _bytes: &[u8]) -> WriteStatus {
        WriteStatus::Written
    }

    fn dfu_end(&mut self) {}

    fn dfu_has_entry(&self, _addr: u32, _out: &mut [u8]) -> bool {
        false
    }

    fn dfu_sha256(&self) -> [u8; 32] {
        [0u8; 32]
    }
}
