//! Error and terminal-reason kinds for the bootloader core (§7).

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum BootloaderError {
    /// Transport buffer unavailable when one was required to make progress.
    OutOfMemory,
    /// A required persistent-info entry was missing or malformed at init.
    InvalidPersistentStorage,
}

/// Reason a transaction or the whole bootloader run terminated (§6, §7).
///
/// `FwidValid` and `Success` are not errors — they are the two "boot through"
/// paths — but they share the same funnel (`abort(reason)`) as the failure
/// reasons, so they live in one enum per the spec's terminal-exit design.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AbortReason {
    /// Completed transfer failed its signature check.
    Unauthorized,
    /// A REQ or READY state timed out without progressing.
    NoStart,
    /// FIND_FWID expired with no newer FWID seen; normal boot-through.
    FwidValid,
    /// RAMPDOWN completed; reboot into the freshly received image.
    Success,
    /// Fatal error at init or during a required allocation.
    Error(BootloaderError),
}

impl AbortReason {
    /// Per §6 "Terminal exits": `Unauthorized` chain-loads back into the
    /// bootloader itself (another attempt); everything else chain-loads the
    /// application.
    pub fn chain_loads_to_bootloader(self) -> bool {
        matches!(self, AbortReason::Unauthorized)
    }
}

impl From<BootloaderError> for AbortReason {
    fn from(err: BootloaderError) -> Self {
        AbortReason::Error(err)
    }
}
