use chrono::NaiveDateTime;
use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Integer;
use diesel::sqlite::Sqlite;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(Sqlite))]
pub struct User {
    pub id: i32,
    pub discord_id: String,
    pub balance: i32,
    pub visible: bool,
    pub is_admin: bool,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser<'a> {
    pub discord_id: &'a str,
    // balance, visible, and is_admin use defaults
}

/// Where a character acted relative to the alignment of the location they acted in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Integer)]
#[serde(rename_all = "snake_case")]
pub enum LocationAlignment {
    InAlignment = 0,
    InContravention = 1,
    NotApplicable = 2,
}

impl LocationAlignment {
    pub const ALL: [LocationAlignment; 3] = [
        LocationAlignment::InAlignment,
        LocationAlignment::InContravention,
        LocationAlignment::NotApplicable,
    ];

    /// Point multiplier as an exact ratio `(numerator, denominator)`.
    pub fn multiplier(self) -> (i64, i64) {
        match self {
            LocationAlignment::InAlignment => (3, 2),
            LocationAlignment::InContravention => (2, 1),
            LocationAlignment::NotApplicable => (1, 1),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LocationAlignment::InAlignment => "In Alignment",
            LocationAlignment::InContravention => "In Contravention",
            LocationAlignment::NotApplicable => "Not Applicable",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            LocationAlignment::InAlignment => {
                "In Alignment with their location (good in good loc, evil in evil loc)"
            }
            LocationAlignment::InContravention => {
                "In Contravention to their location (good in evil loc, evil in good loc)"
            }
            LocationAlignment::NotApplicable => "Not Applicable",
        }
    }

    /// Value carried by the select option for this alignment.
    pub fn choice(self) -> String {
        (self as i32).to_string()
    }

    pub fn from_choice(value: &str) -> Option<Self> {
        Self::from_i32(value.trim().parse().ok()?)
    }

    fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(LocationAlignment::InAlignment),
            1 => Some(LocationAlignment::InContravention),
            2 => Some(LocationAlignment::NotApplicable),
            _ => None,
        }
    }
}

impl ToSql<Integer, Sqlite> for LocationAlignment {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(*self as i32);
        Ok(IsNull::No)
    }
}

impl FromSql<Integer, Sqlite> for LocationAlignment {
    fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let raw = <i32 as FromSql<Integer, Sqlite>>::from_sql(bytes)?;
        LocationAlignment::from_i32(raw)
            .ok_or_else(|| format!("unknown location alignment {raw}").into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = crate::schema::earning_submissions)]
#[diesel(check_for_backend(Sqlite))]
pub struct EarningSubmission {
    pub id: i32,
    pub channel_id: String,
    pub user_id: i32,
    pub created_at: NaiveDateTime,
    pub points_lodged: Option<i32>,
    pub act_summary: Option<String>,
    pub location_alignment: Option<LocationAlignment>,
    pub submitted: bool,
    pub approved: Option<bool>,
    pub denied_reason: Option<String>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::earning_submissions)]
pub struct NewEarningSubmission<'a> {
    pub id: i32,
    pub channel_id: &'a str,
    pub user_id: i32,
    pub created_at: NaiveDateTime,
    // every form field starts out unset
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = crate::schema::spending_submissions)]
#[diesel(check_for_backend(Sqlite))]
pub struct SpendingSubmission {
    pub id: i32,
    pub channel_id: String,
    pub user_id: i32,
    pub created_at: NaiveDateTime,
    pub cost: i32,
    pub ability_requested: Option<String>,
    pub ability_description: Option<String>,
    pub ability_limitations: Option<String>,
    pub cost_weakness: Option<String>,
    pub cost_weakness_description: Option<String>,
    pub lore_rule_compliant: Option<bool>,
    pub submitted: bool,
    pub approved: Option<bool>,
    pub denied_reason: Option<String>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::spending_submissions)]
pub struct NewSpendingSubmission<'a> {
    pub id: i32,
    pub channel_id: &'a str,
    pub user_id: i32,
    pub created_at: NaiveDateTime,
    pub cost: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = crate::schema::admin_transactions)]
#[diesel(check_for_backend(Sqlite))]
pub struct AdminTransaction {
    pub id: i32,
    pub created_at: NaiveDateTime,
    pub user_id: i32,
    pub admin_user_id: i32,
    pub net_points: i32,
    pub reason: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::admin_transactions)]
pub struct NewAdminTransaction<'a> {
    pub created_at: NaiveDateTime,
    pub user_id: i32,
    pub admin_user_id: i32,
    pub net_points: i32,
    pub reason: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = crate::schema::transaction_log)]
#[diesel(check_for_backend(Sqlite))]
pub struct TransactionLogEntry {
    pub id: i32,
    pub created_at: NaiveDateTime,
    pub user_id: i32,
    pub earning_submission_id: Option<i32>,
    pub spending_submission_id: Option<i32>,
    pub admin_transaction_id: Option<i32>,
    pub points: i32,
}

impl TransactionLogEntry {
    /// The record that caused this ledger row. Exactly one reference column is set on every
    /// row the ledger writes.
    pub fn provenance(&self) -> Option<Provenance> {
        match (
            self.earning_submission_id,
            self.spending_submission_id,
            self.admin_transaction_id,
        ) {
            (Some(id), None, None) => Some(Provenance::EarningSubmission(id)),
            (None, Some(id), None) => Some(Provenance::SpendingSubmission(id)),
            (None, None, Some(id)) => Some(Provenance::AdminTransaction(id)),
            _ => None,
        }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::transaction_log)]
pub struct NewTransactionLogEntry {
    pub created_at: NaiveDateTime,
    pub user_id: i32,
    pub earning_submission_id: Option<i32>,
    pub spending_submission_id: Option<i32>,
    pub admin_transaction_id: Option<i32>,
    pub points: i32,
}

impl NewTransactionLogEntry {
    /// Builds a ledger row whose reference columns are derived from a single provenance, so a
    /// row can never point at two origins.
    pub fn new(user_id: i32, provenance: Provenance, points: i32, at: NaiveDateTime) -> Self {
        let mut entry = NewTransactionLogEntry {
            created_at: at,
            user_id,
            earning_submission_id: None,
            spending_submission_id: None,
            admin_transaction_id: None,
            points,
        };
        match provenance {
            Provenance::EarningSubmission(id) => entry.earning_submission_id = Some(id),
            Provenance::SpendingSubmission(id) => entry.spending_submission_id = Some(id),
            Provenance::AdminTransaction(id) => entry.admin_transaction_id = Some(id),
        }
        entry
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    EarningSubmission(i32),
    SpendingSubmission(i32),
    AdminTransaction(i32),
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provenance::EarningSubmission(id) => write!(f, "Earn Sub #{id}"),
            Provenance::SpendingSubmission(id) => write!(f, "Spend Sub #{id}"),
            Provenance::AdminTransaction(id) => write!(f, "Admin Txn #{id}"),
        }
    }
}
