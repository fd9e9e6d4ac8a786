//! Server state

use std::sync::Arc;

use crate::engine::reconciler::Reconciler;

/// Server state shared across handlers
pub struct ServerState {
    pub reconciler: Arc<Reconciler>,
}

impl ServerState {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }
}
