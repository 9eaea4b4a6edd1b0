use thiserror::Error;

use crate::gateway::GatewayError;
use crate::pagination::PaginationError;
use crate::record::RecordKind;

/// Everything a user-facing operation can fail with. The `Display` text of the non-internal
/// variants is shown to the actor as-is.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("You are not authorized to perform this action")]
    Unauthorized,

    #[error(transparent)]
    Pagination(#[from] PaginationError),

    #[error("{kind} #{id} does not exist!")]
    NotFound { kind: RecordKind, id: i32 },

    #[error("No user exists with User ID #{0}")]
    UnknownUser(i32),

    #[error("This channel is not attached to an open submission")]
    NoSubmissionForChannel(String),

    #[error(
        "You don't have enough Judgement Points for a Spending Submission. \
         Current balance is `{balance}` Points, the cost is `{cost}` Points"
    )]
    InsufficientBalance { balance: i32, cost: i32 },

    #[error(
        "The submitter has only `{balance}` Points, {kind} #{id} costs `{cost}` Points"
    )]
    SubmitterCannotAfford {
        kind: RecordKind,
        id: i32,
        balance: i32,
        cost: i32,
    },

    #[error("{kind} #{id} has already been approved!")]
    AlreadyApproved { kind: RecordKind, id: i32 },

    #[error("{kind} #{id} has already been denied!")]
    AlreadyDenied { kind: RecordKind, id: i32 },

    #[error("{kind} #{id} has already been submitted!")]
    AlreadySubmitted { kind: RecordKind, id: i32 },

    #[error("{kind} #{id} has not been submitted for review")]
    NotSubmitted { kind: RecordKind, id: i32 },

    #[error("{kind} #{id} has not been denied, no changes are necessary")]
    NotDenied { kind: RecordKind, id: i32 },

    #[error("{kind} #{id} has been approved, no changes are necessary!")]
    ChangesUnnecessary { kind: RecordKind, id: i32 },

    #[error("Already Making Changes: <#{channel_id}>")]
    AlreadyEditing { channel_id: String },

    #[error("{kind} #{id} is incomplete, still missing: {}", missing.join(", "))]
    Incomplete {
        kind: RecordKind,
        id: i32,
        missing: Vec<&'static str>,
    },

    #[error("Only the owner of {kind} #{id} can change it")]
    NotOwner { kind: RecordKind, id: i32 },

    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl BotError {
    /// Failures of our own infrastructure rather than of the actor's request.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            BotError::Database(_) | BotError::Pool(_) | BotError::Join(_)
        )
    }

    /// The text shown to the actor.
    pub fn user_message(&self) -> String {
        if self.is_internal() {
            "Something went wrong while processing this request. Please try again.".to_string()
        } else {
            self.to_string()
        }
    }
}

pub type BotResult<T> = Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        let err = BotError::NotFound {
            kind: RecordKind::EarningSubmission,
            id: 7,
        };
        assert_eq!(err.user_message(), "Earning Submission #7 does not exist!");

        let err = BotError::Incomplete {
            kind: RecordKind::SpendingSubmission,
            id: 2,
            missing: vec!["Ability Requested", "Lore/Rule Compliance"],
        };
        assert_eq!(
            err.to_string(),
            "Spending Submission #2 is incomplete, still missing: Ability Requested, Lore/Rule Compliance"
        );
    }

    #[test]
    fn test_balance_messages_name_the_right_person() {
        let own = BotError::InsufficientBalance {
            balance: 150,
            cost: 200,
        };
        assert!(own.to_string().starts_with("You don't have enough Judgement Points"));

        let reviewed = BotError::SubmitterCannotAfford {
            kind: RecordKind::SpendingSubmission,
            id: 4,
            balance: 150,
            cost: 200,
        };
        assert_eq!(
            reviewed.user_message(),
            "The submitter has only `150` Points, Spending Submission #4 costs `200` Points"
        );
    }

    #[test]
    fn test_internal_errors_are_hidden() {
        let err = BotError::Database(diesel::result::Error::NotFound);
        assert!(err.is_internal());
        assert!(!err.user_message().contains("database"));
        assert!(!BotError::Unauthorized.is_internal());
    }
}
