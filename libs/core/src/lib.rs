//! `pcore-core`: the `PlatformCore` facade: Spec ingestion, golden
//! path and retry launches, cancellation, and the read boundary every
//! caller (the HTTP/WebSocket server, the CLI, tests) goes through instead
//! of touching the Store, the engine, or the registry directly.

pub mod errors;
pub mod facade;
pub mod ingest;

pub use errors::{remediation_hint, CoreError, CoreErrorKind};
pub use facade::{PlatformCore, PlatformCoreConfig};
pub use ingest::{system_caller, IngestError, ParsedSpec};
