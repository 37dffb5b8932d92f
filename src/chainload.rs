//! Chain-load helper: jumps to the application or previous bootloader after a
//! terminal `abort(reason)` (§6 "Terminal exits", §6.1 ADDED).

/// Both exits are divergent: the bootloader core never regains control after
/// calling either.
pub trait ChainLoader {
    fn jump_to_application(&self) -> !;
    fn jump_to_bootloader(&self) -> !;
}
