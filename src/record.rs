//! The three kinds of record that can move points, as one tagged type with a shared `inspect`.

use std::fmt;

use diesel::prelude::*;
use diesel::SqliteConnection;
use serde::{Deserialize, Serialize};

use crate::error::{BotError, BotResult};
use crate::ledger;
use crate::model::{AdminTransaction, EarningSubmission, SpendingSubmission, User};
use crate::schema::{admin_transactions, earning_submissions, spending_submissions};
use crate::view::{self, Card};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    #[serde(alias = "Earning Submission")]
    EarningSubmission,
    #[serde(alias = "Spending Submission")]
    SpendingSubmission,
    #[serde(alias = "Admin Transaction")]
    AdminTransaction,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordKind::EarningSubmission => "Earning Submission",
            RecordKind::SpendingSubmission => "Spending Submission",
            RecordKind::AdminTransaction => "Admin Transaction",
        })
    }
}

/// The two kinds of record that go through the guided form and admin review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    Earning,
    Spending,
}

impl SubmissionKind {
    pub fn record_kind(self) -> RecordKind {
        match self {
            SubmissionKind::Earning => RecordKind::EarningSubmission,
            SubmissionKind::Spending => RecordKind::SpendingSubmission,
        }
    }

    /// Prefix used in component ids and channel names.
    pub fn prefix(self) -> &'static str {
        match self {
            SubmissionKind::Earning => "earning",
            SubmissionKind::Spending => "spending",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "earning" => Some(SubmissionKind::Earning),
            "spending" => Some(SubmissionKind::Spending),
            _ => None,
        }
    }
}

impl fmt::Display for SubmissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.record_kind().fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Earning(EarningSubmission),
    Spending(SpendingSubmission),
    Admin(AdminTransaction),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Earning(_) => RecordKind::EarningSubmission,
            Record::Spending(_) => RecordKind::SpendingSubmission,
            Record::Admin(_) => RecordKind::AdminTransaction,
        }
    }

    pub fn id(&self) -> i32 {
        match self {
            Record::Earning(s) => s.id,
            Record::Spending(s) => s.id,
            Record::Admin(t) => t.id,
        }
    }

    /// The user whose balance this record affects.
    pub fn owner_id(&self) -> i32 {
        match self {
            Record::Earning(s) => s.user_id,
            Record::Spending(s) => s.user_id,
            Record::Admin(t) => t.user_id,
        }
    }

    /// The routing channel of a submission.
    pub fn channel_id(&self) -> Option<&str> {
        match self {
            Record::Earning(s) => Some(&s.channel_id),
            Record::Spending(s) => Some(&s.channel_id),
            Record::Admin(_) => None,
        }
    }

    pub fn find(conn: &mut SqliteConnection, kind: RecordKind, id: i32) -> BotResult<Record> {
        let record = match kind {
            RecordKind::EarningSubmission => earning_submissions::table
                .find(id)
                .select(EarningSubmission::as_select())
                .first(conn)
                .optional()?
                .map(Record::Earning),
            RecordKind::SpendingSubmission => spending_submissions::table
                .find(id)
                .select(SpendingSubmission::as_select())
                .first(conn)
                .optional()?
                .map(Record::Spending),
            RecordKind::AdminTransaction => admin_transactions::table
                .find(id)
                .select(AdminTransaction::as_select())
                .first(conn)
                .optional()?
                .map(Record::Admin),
        };
        record.ok_or(BotError::NotFound { kind, id })
    }
}

/// A record together with the users it refers to, ready to be displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inspection {
    pub record: Record,
    pub owner: User,
    pub admin: Option<User>,
}

impl Inspection {
    pub fn card(&self, title: &str) -> Card {
        match &self.record {
            Record::Earning(s) => view::earning_card(s, title, &self.owner),
            Record::Spending(s) => view::spending_card(s, title, &self.owner),
            Record::Admin(t) => {
                let admin = self.admin.as_ref().unwrap_or(&self.owner);
                view::admin_transaction_card(t, title, &self.owner, admin)
            }
        }
    }
}

pub fn inspect(conn: &mut SqliteConnection, kind: RecordKind, id: i32) -> BotResult<Inspection> {
    let record = Record::find(conn, kind, id)?;
    let owner = ledger::find_user(conn, record.owner_id())?;
    let admin = match &record {
        Record::Admin(t) => Some(ledger::find_user(conn, t.admin_user_id)?),
        _ => None,
    };
    Ok(Inspection {
        record,
        owner,
        admin,
    })
}
