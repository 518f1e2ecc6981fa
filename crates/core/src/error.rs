//! Error types shared across the system

use thiserror::Error;

use crate::worker::WorkerId;

/// Base error type for the domain layer
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("worker {0} already has an address assigned")]
    AddressAssigned(WorkerId),
}

pub type Result<T> = std::result::Result<T, DomainError>;
