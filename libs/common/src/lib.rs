//! Ambient infrastructure shared across the workspace: telemetry init,
//! environment-driven configuration, and the injectable clock.

pub mod clock;
pub mod config;
pub mod telemetry;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{CoreConfig, DbConfig};
pub use telemetry::init_tracing;
