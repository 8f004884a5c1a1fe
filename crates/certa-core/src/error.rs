//! Error types for Certa Core.

use thiserror::Error;

use crate::types::RequestStatus;

/// Errors raised while ingesting identities and attributes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid user identity: {0}")]
    InvalidIdentity(String),

    #[error("invalid attribute name: {0:?}")]
    InvalidAttribute(String),

    #[error("unknown request status code: {0}")]
    UnknownStatus(u8),

    #[error("illegal status transition {from} -> {to}")]
    IllegalTransition {
        from: RequestStatus,
        to: RequestStatus,
    },
}

/// Errors raised while parsing an access policy.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("empty policy")]
    Empty,

    #[error("unexpected token {found:?} at position {position}")]
    UnexpectedToken { found: String, position: usize },

    #[error("unexpected end of policy, expected {0}")]
    UnexpectedEnd(&'static str),

    #[error("threshold {threshold} out of range for {children} children")]
    InvalidThreshold { threshold: usize, children: usize },

    #[error("attribute error: {0}")]
    Attribute(#[from] CoreError),
}
