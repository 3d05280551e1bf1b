//! Core domain models and storage for the claim anchoring engine.
//!
//! Provides strongly-typed domain primitives, batch-id generation, the
//! repository layer over PostgreSQL, and the clock abstraction the rest of
//! the workspace builds on.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod batch_id;
pub mod error;
pub mod models;
pub mod storage;
pub mod time;

pub use batch_id::{BatchIdGenerator, BatchIdStore};
pub use error::{CoreError, Result};
pub use models::{BatchId, Claim, ClaimId, Product, ProductId, TopicId, TransactionId};
pub use time::{Clock, RealClock, TestClock};
