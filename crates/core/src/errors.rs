use thiserror::Error;

use crate::lifecycle::DispatchTransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Transition(#[from] DispatchTransitionError),
    #[error("orchestration invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OrchestrationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("external integration failure: {0}")]
    Integration(String),
}

impl OrchestrationError {
    /// Rendering safe to hand to the conversational model. Internal detail
    /// stays in the error itself for logs; the model relays this text.
    pub fn conversational(&self) -> String {
        match self {
            Self::Domain(_) => {
                "I hit an internal inconsistency handling that request. Please try again.".to_owned()
            }
            Self::Configuration(_) => {
                "The calling service is not fully configured yet, so I could not complete that."
                    .to_owned()
            }
            Self::Integration(detail) => {
                format!("An external service did not respond as expected ({detail}). It is safe to retry.")
            }
        }
    }
}
