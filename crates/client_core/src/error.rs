use thiserror::Error;

use crate::transport::TransportError;

/// Failures of the plain CRUD screens (profile, task list, requests, email).
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("not signed in")]
    NotSignedIn,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("login response did not include a session token")]
    MissingToken,
    #[error("login request failed: {0}")]
    Request(#[source] TransportError),
}
