//! # harnesslog
//!
//! Diagnostic log store for a test harness:
//! - Line-framed record log with a signature header
//! - Fixed-width side index for resuming without reparsing
//! - Background tail worker with paged notifications
//! - Incremental filter worker (logger × severity, substring)
//! - Bounded message-body cache
//! - Erase that quiesces every reader before truncating
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Producers                             │
//! │                 publish(severity, ...)                       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                       Writer                                 │
//! │          (single critical section, erase, backup)            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    LogStoreFile                              │
//! │        main log  ·  .rec.index  ·  .log.index                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ poll
//!          ┌────────────▼────────────┐        ┌──────────────┐
//!          │       TailEngine        │◀──────▶│ MessageCache │
//!          │  (worker, record list)  │        └──────────────┘
//!          └────────────┬────────────┘
//!                       │ cursor
//!          ┌────────────▼────────────┐
//!          │      FilterEngine       │
//!          │ (worker, filtered list) │
//!          └────────────┬────────────┘
//!                       ▼
//!                   listeners
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod model;

pub mod codec;
pub mod store;
pub mod view;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{LogError, Result};
pub use config::Config;
pub use engine::LogEngine;
pub use model::{LogRecord, SeverityBucket};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of harnesslog
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
