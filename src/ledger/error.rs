use sea_orm::DbErr;

use super::types::{DartNumber, TurnId};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("throw slot {dart_number} of turn {turn_id} is inconsistent: {reason}")]
    Invariant {
        turn_id: TurnId,
        dart_number: DartNumber,
        reason: String,
    },
}

impl IngestError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(turn_id: TurnId, dart_number: DartNumber, reason: impl Into<String>) -> Self {
        Self::Invariant {
            turn_id,
            dart_number,
            reason: reason.into(),
        }
    }
}
