// Handler modules
pub mod explain;
pub mod scan;

// Re-export all handler functions
pub use explain::{handle_checklist, handle_explain};
pub use scan::{handle_fix, handle_scan};
