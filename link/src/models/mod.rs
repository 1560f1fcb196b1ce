//! Data models for the logdb-link client library.
//!
//! Defines the msgbus wire envelope and the payloads exchanged with the
//! log query plugin.

pub mod envelope;
pub mod query_status;
pub mod result_page;
pub mod trap_event;

pub use envelope::Message;
pub use query_status::QueryStatus;
pub use result_page::ResultPage;
pub use trap_event::TrapEvent;
