//! Application state.

use std::sync::Arc;

use sift_core::SiftEngine;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SiftEngine>,
}

impl AppState {
    pub fn new(engine: Arc<SiftEngine>) -> Self {
        Self { engine }
    }
}
