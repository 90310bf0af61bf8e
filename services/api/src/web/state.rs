//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use mail_report_core::pipeline::ReportPipeline;
use mail_report_core::ports::ReportStore;
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The wired report pipeline; owns the mail source and generation provider.
    pub pipeline: Arc<ReportPipeline>,
    /// Direct store access for the read/delete endpoints.
    pub store: Arc<dyn ReportStore>,
}
