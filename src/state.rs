//! The five-state lifecycle (C5, §4.1).

use embassy_time::Duration;

use crate::config::BootloaderConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DfuState {
    FindFwid,
    DfuReq,
    DfuReady,
    DfuTarget,
    Rampdown,
}

impl DfuState {
    /// The timeout armed on entry to this state (§4.1).
    pub fn timeout(self, config: &BootloaderConfig) -> Duration {
        match self {
            DfuState::FindFwid => config.find_fwid_timeout,
            DfuState::DfuReq => config.req_timeout,
            DfuState::DfuReady => config.ready_timeout,
            DfuState::DfuTarget => config.target_timeout,
            DfuState::Rampdown => config.rampdown_timeout,
        }
    }
}
