//! Monotonic timer used for state timeouts (§6.1 ADDED, §9 "Timer as explicit
//! state"). Arming replaces any previously armed deadline; the core never
//! reads wall-clock time other than through this trait.

use embassy_time::{Duration, Instant};

pub trait StateTimer {
    /// Arms the timer to fire `deadline` from now, replacing any previously
    /// armed deadline (§4.1: entering a state arms it; leaving clears it).
    fn arm(&mut self, deadline: Duration);

    /// Disarms the timer; a no-op if it was not armed.
    fn disarm(&mut self);

    fn now(&self) -> Instant;
}
