//! Tunable timing constants. These are runtime configuration, not part
//! of the wire protocol - two peers with different `Config`s still
//! interoperate, they just disagree on how chatty/patient to be.

use std::time::Duration;

/// Timing and sizing knobs for one `Socket`/`Connection` set.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// How often an otherwise-idle connection sends a heartbeat.
    pub heartbeat_interval: Duration,
    /// How long a connection may go without a received datagram before
    /// it is considered dead and reaped.
    pub keep_alive_timeout: Duration,
    /// Minimum gap between retransmits of a normal-priority reliable packet.
    pub resend_interval: Duration,
    /// Minimum gap between retransmits of a high-priority reliable packet.
    pub high_priority_resend_interval: Duration,
    /// Largest datagram the socket manager will attempt to read in one go.
    pub max_datagram: usize,
}

impl Config {
    /// Release-profile timings.
    pub const fn release() -> Self {
        Config {
            heartbeat_interval: Duration::from_millis(100),
            keep_alive_timeout: Duration::from_millis(2000),
            resend_interval: Duration::from_millis(200),
            high_priority_resend_interval: Duration::from_millis(10),
            max_datagram: 1024,
        }
    }

    /// Debug-profile timings: the liveness window is relaxed to several
    /// seconds so a connection does not get reaped while paused at a
    /// breakpoint.
    pub const fn debug() -> Self {
        Config {
            heartbeat_interval: Duration::from_millis(100),
            keep_alive_timeout: Duration::from_secs(10),
            resend_interval: Duration::from_millis(200),
            high_priority_resend_interval: Duration::from_millis(10),
            max_datagram: 1024,
        }
    }
}

impl Default for Config {
    /// Mirrors `cfg!(debug_assertions)` so a plain `Config::default()`
    /// picks debug or release timings automatically.
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Config::debug()
        } else {
            Config::release()
        }
    }
}
