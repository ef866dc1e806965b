//! Error type for `staffroom-core`.
//!
//! A failed operation never leaves a partially-applied attendance change:
//! whatever was persisted before the error stays authoritative.

use thiserror::Error;

use crate::types::{DescriptorError, IdentityId};

#[derive(Debug, Error)]
pub enum Error {
    /// The extractor produced no descriptor for the captured frame.
    #[error("no face detected in the captured frame")]
    NoFaceDetected,

    #[error("enrollment is missing a {0}")]
    IncompleteEnrollment(&'static str),

    #[error("transition requires a {0}")]
    IncompleteManualTransition(&'static str),

    #[error("unknown identity: {0}")]
    UnknownIdentity(IdentityId),

    #[error("unknown destination: {0:?}")]
    UnknownDestination(String),

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    /// Another transition for the same identity has not completed yet.
    #[error("a transition for identity {0} is already in progress")]
    TransitionInProgress(IdentityId),

    #[error("no destination prompt is pending for identity {0}")]
    NoPendingPrompt(IdentityId),

    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(#[from] DescriptorError),

    #[error("persistence failure: {0}")]
    Persistence(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Persistence(Box::new(err))
    }

    /// Whether the operator supplied bad or missing input (as opposed to
    /// a state conflict or a storage failure).
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Error::IncompleteEnrollment(_)
                | Error::IncompleteManualTransition(_)
                | Error::UnknownDestination(_)
                | Error::EmptyField(_)
                | Error::InvalidDescriptor(_)
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
