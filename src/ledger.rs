//! Users, balances, and the append-only transaction log.
//!
//! A balance only ever changes through [`post`], which appends the ledger row and applies the
//! same delta to the user inside one transaction, so that a user's balance always equals the
//! sum of their ledger rows.

use std::collections::HashMap;
use std::fmt;

use chrono::Utc;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use diesel::SqliteConnection;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{BotError, BotResult};
use crate::model::{
    AdminTransaction, EarningSubmission, LocationAlignment, NewAdminTransaction,
    NewTransactionLogEntry, NewUser, Provenance, SpendingSubmission, TransactionLogEntry, User,
};
use crate::record::RecordKind;
use crate::schema::{admin_transactions, transaction_log, users};

/// Fetches the user for an external account, creating it with a zero balance on first sight.
pub fn get_or_create_user(conn: &mut SqliteConnection, discord_id: &str) -> BotResult<User> {
    let discord_id = discord_id.trim();
    if discord_id.is_empty() {
        return Err(BotError::InvalidInput(
            "A user identity is required".to_string(),
        ));
    }
    conn.transaction(|conn| {
        diesel::insert_into(users::table)
            .values(&NewUser { discord_id })
            .on_conflict(users::discord_id)
            .do_nothing()
            .execute(conn)?;
        let user = users::table
            .filter(users::discord_id.eq(discord_id))
            .select(User::as_select())
            .first(conn)?;
        Ok(user)
    })
}

pub fn find_user(conn: &mut SqliteConnection, user_id: i32) -> BotResult<User> {
    users::table
        .find(user_id)
        .select(User::as_select())
        .first(conn)
        .optional()?
        .ok_or(BotError::UnknownUser(user_id))
}

pub fn users_by_ids(conn: &mut SqliteConnection, ids: &[i32]) -> BotResult<HashMap<i32, User>> {
    let found: Vec<User> = users::table
        .filter(users::id.eq_any(ids))
        .select(User::as_select())
        .load(conn)?;
    Ok(found.into_iter().map(|u| (u.id, u)).collect())
}

/// Resolves the acting user and rejects them unless they hold the admin flag.
pub fn require_admin(conn: &mut SqliteConnection, discord_id: &str) -> BotResult<User> {
    let user = get_or_create_user(conn, discord_id)?;
    if user.is_admin {
        Ok(user)
    } else {
        Err(BotError::Unauthorized)
    }
}

pub fn set_visible(conn: &mut SqliteConnection, user_id: i32, visible: bool) -> BotResult<User> {
    diesel::update(users::table.find(user_id))
        .set(users::visible.eq(visible))
        .returning(User::as_returning())
        .get_result(conn)
        .optional()?
        .ok_or(BotError::UnknownUser(user_id))
}

pub fn set_admin(conn: &mut SqliteConnection, user_id: i32, is_admin: bool) -> BotResult<User> {
    diesel::update(users::table.find(user_id))
        .set(users::is_admin.eq(is_admin))
        .returning(User::as_returning())
        .get_result(conn)
        .optional()?
        .ok_or(BotError::UnknownUser(user_id))
}

/// Points an approved earning submission is worth. Fractional results round half up.
pub fn earning_points(points_lodged: i32, alignment: LocationAlignment) -> BotResult<i32> {
    let (num, den) = alignment.multiplier();
    let scaled = i64::from(points_lodged) * num;
    let rounded = (2 * scaled + den).div_euclid(2 * den);
    i32::try_from(rounded)
        .map_err(|_| BotError::InvalidInput(format!("{points_lodged} points is too many")))
}

/// Appends a ledger row and applies its delta to the user's balance as one unit of work.
fn post(
    conn: &mut SqliteConnection,
    user_id: i32,
    provenance: Provenance,
    points: i32,
) -> BotResult<TransactionLogEntry> {
    let result = conn.transaction(|conn| {
        let balance: i32 = users::table
            .find(user_id)
            .select(users::balance)
            .first(conn)
            .optional()?
            .ok_or(BotError::UnknownUser(user_id))?;
        let new_balance = i64::from(balance) + i64::from(points);
        if i32::try_from(new_balance).is_err() {
            return Err(BotError::InvalidInput(format!(
                "A balance of {new_balance} points is out of range"
            )));
        }
        let entry = diesel::insert_into(transaction_log::table)
            .values(&NewTransactionLogEntry::new(
                user_id,
                provenance,
                points,
                Utc::now().naive_utc(),
            ))
            .returning(TransactionLogEntry::as_returning())
            .get_result(conn)?;
        let updated = diesel::update(users::table.find(user_id))
            .set(users::balance.eq(users::balance + points))
            .execute(conn)?;
        if updated != 1 {
            return Err(BotError::UnknownUser(user_id));
        }
        Ok(entry)
    });

    match result {
        Ok(entry) => {
            info!(user_id, %provenance, points, entry_id = entry.id, "posted ledger entry");
            Ok(entry)
        }
        Err(BotError::Database(diesel::result::Error::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            _,
        ))) => {
            let (kind, id) = match provenance {
                Provenance::EarningSubmission(id) => (RecordKind::EarningSubmission, id),
                Provenance::SpendingSubmission(id) => (RecordKind::SpendingSubmission, id),
                Provenance::AdminTransaction(id) => (RecordKind::AdminTransaction, id),
            };
            Err(BotError::AlreadyApproved { kind, id })
        }
        Err(e) => Err(e),
    }
}

pub fn post_earning_submission(
    conn: &mut SqliteConnection,
    submission: &EarningSubmission,
) -> BotResult<TransactionLogEntry> {
    let (points_lodged, alignment) = match (submission.points_lodged, submission.location_alignment)
    {
        (Some(points), Some(alignment)) => (points, alignment),
        _ => {
            return Err(BotError::Incomplete {
                kind: RecordKind::EarningSubmission,
                id: submission.id,
                missing: crate::submission::earning_missing_fields(submission),
            })
        }
    };
    let points = earning_points(points_lodged, alignment)?;
    post(
        conn,
        submission.user_id,
        Provenance::EarningSubmission(submission.id),
        points,
    )
}

pub fn post_spending_submission(
    conn: &mut SqliteConnection,
    submission: &SpendingSubmission,
) -> BotResult<TransactionLogEntry> {
    post(
        conn,
        submission.user_id,
        Provenance::SpendingSubmission(submission.id),
        -submission.cost,
    )
}

pub fn post_admin_transaction(
    conn: &mut SqliteConnection,
    transaction: &AdminTransaction,
) -> BotResult<TransactionLogEntry> {
    post(
        conn,
        transaction.user_id,
        Provenance::AdminTransaction(transaction.id),
        transaction.net_points,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustOp {
    #[serde(rename = "+", alias = "add")]
    Add,
    #[serde(rename = "-", alias = "sub")]
    Sub,
    #[serde(rename = "=", alias = "set")]
    Set,
}

impl AdjustOp {
    /// The signed delta that takes `current` to the result of this operation.
    pub fn net_points(self, current: i32, amount: i32) -> BotResult<i32> {
        let net = match self {
            AdjustOp::Add => i64::from(amount),
            AdjustOp::Sub => -i64::from(amount),
            AdjustOp::Set => i64::from(amount) - i64::from(current),
        };
        let result = i64::from(current) + net;
        if i32::try_from(result).is_err() {
            return Err(BotError::InvalidInput(format!(
                "A balance of {result} points is out of range"
            )));
        }
        i32::try_from(net)
            .map_err(|_| BotError::InvalidInput(format!("A change of {net} points is out of range")))
    }
}

impl fmt::Display for AdjustOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AdjustOp::Add => "increased by",
            AdjustOp::Sub => "decreased by",
            AdjustOp::Set => "set to",
        })
    }
}

/// Records an admin-issued adjustment and posts it. Returns the transaction and the target's
/// updated user row.
pub fn admin_adjust_balance(
    conn: &mut SqliteConnection,
    admin: &User,
    target_user_id: i32,
    op: AdjustOp,
    amount: i32,
    reason: &str,
) -> BotResult<(AdminTransaction, User)> {
    if !admin.is_admin {
        return Err(BotError::Unauthorized);
    }
    if amount < 0 {
        return Err(BotError::InvalidInput(
            "The amount must not be negative".to_string(),
        ));
    }
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(BotError::InvalidInput("A reason is required".to_string()));
    }

    conn.immediate_transaction(|conn| {
        let target = find_user(conn, target_user_id)?;
        let net_points = op.net_points(target.balance, amount)?;
        let transaction = diesel::insert_into(admin_transactions::table)
            .values(&NewAdminTransaction {
                created_at: Utc::now().naive_utc(),
                user_id: target.id,
                admin_user_id: admin.id,
                net_points,
                reason,
            })
            .returning(AdminTransaction::as_returning())
            .get_result(conn)?;
        post_admin_transaction(conn, &transaction)?;
        let target = find_user(conn, target.id)?;
        info!(
            admin_id = admin.id,
            target_id = target.id,
            net_points,
            balance = target.balance,
            "admin transaction performed"
        );
        Ok((transaction, target))
    })
}

/// Sum of a user's ledger rows, which must always equal their balance.
pub fn ledger_total(conn: &mut SqliteConnection, user_id: i32) -> BotResult<i64> {
    let total: Option<i64> = transaction_log::table
        .filter(transaction_log::user_id.eq(user_id))
        .select(diesel::dsl::sum(transaction_log::points))
        .first(conn)?;
    Ok(total.unwrap_or(0))
}
