//! Terminal presentation and event recording

pub mod event_log;
pub mod status;

pub use event_log::EventLog;
pub use status::{format_status, StatusLine};
