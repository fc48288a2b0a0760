use crate::amount::RepAmount;
use crate::id::StakeId;
use thiserror::Error;

/// Error taxonomy for the merit core.
///
/// Business-rule failures (insufficient balance, wrong state) are ordinary
/// results; `Persistence` is the only variant that signals the system itself
/// failed to process an otherwise-valid request.
#[derive(Error, Debug)]
pub enum MeritError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Insufficient REP: have {have}, need {need}")]
    InsufficientBalance { have: RepAmount, need: RepAmount },

    #[error("Insufficient staked REP: {available} available to escrow, need {need}")]
    InsufficientStakedBalance {
        available: RepAmount,
        need: RepAmount,
    },

    #[error("Stake {0} is escrowed to an active ticket")]
    StakeLocked(StakeId),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl MeritError {
    /// Whether the failure is a fault of the system rather than the request.
    pub fn is_system_fault(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

impl From<serde_json::Error> for MeritError {
    fn from(e: serde_json::Error) -> Self {
        Self::Validation(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MeritError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_classification() {
        assert!(MeritError::Persistence("disk gone".into()).is_system_fault());
        assert!(!MeritError::Validation("bad input".into()).is_system_fault());
        assert!(!MeritError::InsufficientBalance {
            have: RepAmount::new(1),
            need: RepAmount::new(2),
        }
        .is_system_fault());
    }
}
