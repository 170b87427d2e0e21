//! View Module
//!
//! Live, paged views over a store.
//!
//! ## Responsibilities
//! - `TailEngine`: replay the index, then follow the main log as it grows
//! - `FilterEngine`: incrementally derive a filtered subsequence
//! - `MessageCache`: bounded LRU of decoded message bodies
//!
//! ## Threads
//! ```text
//!   Writer (caller thread) ──▶ main log + indexes
//!                                   │ poll
//!                                   ▼
//!                      tail worker ──▶ record list ──▶ listeners
//!                                   │ cursor
//!                                   ▼
//!                    filter worker ──▶ filtered list ──▶ listeners
//! ```
//!
//! Every worker stops the same way: cancel flag, wake, join. Once `stop()`
//! returns, that worker fires no further events.

mod cache;
mod events;
mod filter;
mod tail;
mod worker;

pub use cache::MessageCache;
pub use events::{channel_listener, Listener, ViewEvent};
pub use filter::{FilterEngine, FilterState};
pub use tail::{TailEngine, TailState};
pub use worker::{CancelToken, Worker};
