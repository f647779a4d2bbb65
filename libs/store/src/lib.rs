//! `pcore-store`: sole authority for persisted state.
//!
//! The [`Store`] trait is implemented twice: [`PgStore`] against Postgres
//! for production, and [`InMemoryStore`] for engine/scheduler/reconciler
//! tests that shouldn't need a live database.

pub mod errors;
pub mod in_memory;
pub mod pg;
pub mod traits;

pub use errors::StoreError;
pub use in_memory::InMemoryStore;
pub use pg::PgStore;
pub use traits::{StepRunTransition, Store, Transaction};
