//! Paged, read-only listings over users and the ledger.

use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use diesel::SqliteConnection;
use serde::{Deserialize, Serialize};

use crate::error::BotResult;
use crate::ledger;
use crate::model::{AdminTransaction, TransactionLogEntry, User};
use crate::pagination::Page;
use crate::schema::{admin_transactions, transaction_log, users};

/// One page of rows together with where it sits in the whole listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing<T> {
    pub page: Page,
    pub rows: Vec<T>,
}

/// Visible users by balance, highest first. Equal balances keep user id order.
pub fn leaderboard(conn: &mut SqliteConnection, page: i64) -> BotResult<Listing<User>> {
    let total: i64 = users::table
        .filter(users::visible.eq(true))
        .count()
        .get_result(conn)?;
    let page = Page::checked(page, total)?;
    let rows = users::table
        .filter(users::visible.eq(true))
        .order((users::balance.desc(), users::id.asc()))
        .offset(page.offset())
        .limit(page.limit())
        .select(User::as_select())
        .load(conn)?;
    Ok(Listing { page, rows })
}

/// A user's ledger rows, newest first.
pub fn transaction_log(
    conn: &mut SqliteConnection,
    user_id: i32,
    page: i64,
) -> BotResult<Listing<TransactionLogEntry>> {
    let total: i64 = transaction_log::table
        .filter(transaction_log::user_id.eq(user_id))
        .count()
        .get_result(conn)?;
    let page = Page::checked(page, total)?;
    let rows = transaction_log::table
        .filter(transaction_log::user_id.eq(user_id))
        .order((transaction_log::created_at.desc(), transaction_log::id.desc()))
        .offset(page.offset())
        .limit(page.limit())
        .select(TransactionLogEntry::as_select())
        .load(conn)?;
    Ok(Listing { page, rows })
}

/// Narrows the admin transaction log to a target user, an acting admin, or both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdminLogFilter {
    pub target: Option<i32>,
    pub admin: Option<i32>,
}

impl AdminLogFilter {
    fn apply(
        self,
        mut query: admin_transactions::BoxedQuery<'static, Sqlite>,
    ) -> admin_transactions::BoxedQuery<'static, Sqlite> {
        if let Some(target) = self.target {
            query = query.filter(admin_transactions::user_id.eq(target));
        }
        if let Some(admin) = self.admin {
            query = query.filter(admin_transactions::admin_user_id.eq(admin));
        }
        query
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminLogRow {
    pub transaction: AdminTransaction,
    pub target: User,
    pub admin: User,
}

pub fn admin_transaction_log(
    conn: &mut SqliteConnection,
    filter: AdminLogFilter,
    page: i64,
) -> BotResult<Listing<AdminLogRow>> {
    let total: i64 = filter
        .apply(admin_transactions::table.into_boxed())
        .count()
        .get_result(conn)?;
    let page = Page::checked(page, total)?;
    let transactions: Vec<AdminTransaction> = filter
        .apply(admin_transactions::table.into_boxed())
        .order((
            admin_transactions::created_at.desc(),
            admin_transactions::id.desc(),
        ))
        .offset(page.offset())
        .limit(page.limit())
        .select(AdminTransaction::as_select())
        .load(conn)?;

    let ids: Vec<i32> = transactions
        .iter()
        .flat_map(|t| [t.user_id, t.admin_user_id])
        .collect();
    let known = ledger::users_by_ids(conn, &ids)?;
    let mut rows = Vec::with_capacity(transactions.len());
    for transaction in transactions {
        let target = match known.get(&transaction.user_id) {
            Some(user) => user.clone(),
            None => ledger::find_user(conn, transaction.user_id)?,
        };
        let admin = match known.get(&transaction.admin_user_id) {
            Some(user) => user.clone(),
            None => ledger::find_user(conn, transaction.admin_user_id)?,
        };
        rows.push(AdminLogRow {
            transaction,
            target,
            admin,
        });
    }
    Ok(Listing { page, rows })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserFilter {
    #[default]
    All,
    #[serde(alias = "user")]
    Users,
    #[serde(alias = "bot admin", alias = "admin")]
    Admins,
}

impl UserFilter {
    pub fn label(self) -> &'static str {
        match self {
            UserFilter::All => "All Users",
            UserFilter::Users => "Standard Users",
            UserFilter::Admins => "Bot Admins",
        }
    }

    fn apply(
        self,
        query: users::BoxedQuery<'static, Sqlite>,
    ) -> users::BoxedQuery<'static, Sqlite> {
        match self {
            UserFilter::All => query,
            UserFilter::Users => query.filter(users::is_admin.eq(false)),
            UserFilter::Admins => query.filter(users::is_admin.eq(true)),
        }
    }
}

/// Every known user matching `filter`, hidden ones included, in id order.
pub fn list_users(
    conn: &mut SqliteConnection,
    filter: UserFilter,
    page: i64,
) -> BotResult<Listing<User>> {
    let total: i64 = filter
        .apply(users::table.into_boxed())
        .count()
        .get_result(conn)?;
    let page = Page::checked(page, total)?;
    let rows = filter
        .apply(users::table.into_boxed())
        .order(users::id.asc())
        .offset(page.offset())
        .limit(page.limit())
        .select(User::as_select())
        .load(conn)?;
    Ok(Listing { page, rows })
}
