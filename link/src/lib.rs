//! Async client for a log-database server reached over an HTTP
//! message-bus RPC protocol.
//!
//! The library authenticates a session with a challenge-response login,
//! submits queries for asynchronous execution, and pages through their
//! results, while a background long-poll loop delivers the trap
//! notifications that drive query completion.
//!
//! # Example
//!
//! ```rust,no_run
//! use logdb_link::LogDbClient;
//!
//! # async fn example() -> logdb_link::Result<()> {
//! let client = LogDbClient::connect("logdb.example.com:8080", "admin", "secret").await?;
//!
//! // One-shot: create, start, wait for completion, stream the rows.
//! let mut cursor = client.query("table events").await?;
//! while let Some(row) = cursor.next().await {
//!     println!("{}", row?);
//! }
//!
//! // Or drive the lifecycle by hand.
//! let id = client.create_query("table events | count").await?;
//! client.start_query(id).await?;
//! let total = client.wait_until(id, None).await?;
//! let page = client.get_result(id, 0, total).await?;
//! println!("{} row(s)", page.rows.len());
//! client.remove_query(id).await?;
//!
//! client.close().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod cursor;
pub mod error;
pub mod models;
pub mod query;
pub mod session;
pub mod timeouts;
mod trap;

pub use client::{LogDbClient, LogDbClientBuilder};
pub use cursor::{QueryCursor, DEFAULT_FETCH_WINDOW};
pub use error::{LogDbError, Result};
pub use models::{Message, QueryStatus, ResultPage, TrapEvent};
pub use query::{LogQuery, QueryInfo};
pub use session::RpcSession;
pub use timeouts::SessionTimeouts;
pub use trap::TrapListener;
