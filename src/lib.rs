//! # RelayKV
//!
//! A two-part distributed service:
//! - A least-connections HTTP load balancer with health-probed backends
//! - An append-only, log-structured key-value store with background
//!   segment compaction, exposed over a thin HTTP façade
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Load Balancer                            │
//! │        (least-connections dispatch + health probes)          │
//! └───────────┬─────────────────┬─────────────────┬─────────────┘
//!             │                 │                 │
//!             ▼                 ▼                 ▼
//!       ┌──────────┐      ┌──────────┐      ┌──────────┐
//!       │ replica 1│      │ replica 2│      │ replica 3│
//!       └────┬─────┘      └────┬─────┘      └────┬─────┘
//!            └─────────────────┼─────────────────┘
//!                              ▼
//!                    ┌───────────────────┐
//!                    │    DB façade      │
//!                    │  (GET/POST /db)   │
//!                    └────────┬──────────┘
//!                             ▼
//!                    ┌───────────────────┐
//!                    │  Storage Engine   │
//!                    │ (log + segments)  │
//!                    └───────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod datastore;
pub mod balancer;
pub mod api;
pub mod shutdown;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{RelayError, Result};
pub use config::BalancerConfig;
pub use datastore::Engine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of RelayKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
