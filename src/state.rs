//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::config::TransferConfig;
use crate::connection::ConnectionManager;
use crate::options::UploadOptions;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Registered source and target connections
    pub connections: ConnectionManager,

    /// Deadline and reference policy applied to every transfer
    pub transfer: TransferConfig,
}

impl AppState {
    pub fn new(connections: ConnectionManager, transfer: TransferConfig) -> Self {
        Self { connections, transfer }
    }

    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            unresolved_references: self.transfer.unresolved_references,
            timeout: self.transfer.timeout,
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
