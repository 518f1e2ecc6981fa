//! Domain Core - Pure Controller Vocabulary
//!
//! This crate contains the domain entities and value objects of the
//! worker-pool controller. It has no dependencies on infrastructure,
//! ports, or the async runtime.

pub mod error;
pub mod worker;

pub use crate::error::{DomainError, Result};
pub use crate::worker::{Worker, WorkerId, WorkerState};
