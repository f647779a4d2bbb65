//! Shared application state: a single `PlatformCore` behind an `Arc`.

use std::sync::Arc;

use pcore_core::PlatformCore;

#[derive(Clone)]
pub struct AppState {
    pub core: Arc<PlatformCore>,
}
