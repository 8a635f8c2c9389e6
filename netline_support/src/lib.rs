//! Ambient stack shared by `netline` and `netobj`: error taxonomy, a
//! mockable clock, wire read/write cursors and structured logging setup.

pub mod clock;
pub mod error;
pub mod logging;
pub mod wire;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CodecError, ErrorUtils, TransportError};
