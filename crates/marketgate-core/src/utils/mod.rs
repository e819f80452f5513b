//! Small shared helpers.
//!
//! - `clock`: injectable monotonic time source so cache freshness can be tested without sleeping
//! - `redact`: masking of credentials and API keys embedded in RPC URLs and error text

pub mod clock;
pub mod redact;

pub use clock::{Clock, ManualClock, SystemClock};
pub use redact::{redact_secrets, redact_url};
