pub mod rest;
pub mod state;

// Re-export the handlers to make them easily accessible to the binary that
// will build the web server router.
pub use rest::{
    delete_report_handler, generate_report_handler, get_report_by_date_handler,
    get_report_by_id_handler, list_reports_handler,
};
