//! Admin review of submitted forms: approval posts to the ledger exactly once, denial sends the
//! submission back to its owner with a reason.

use diesel::prelude::*;
use diesel::SqliteConnection;
use tracing::info;

use crate::error::{BotError, BotResult};
use crate::ledger;
use crate::model::{EarningSubmission, SpendingSubmission, TransactionLogEntry, User};
use crate::schema::{earning_submissions, spending_submissions};
use crate::submission::{self, Stage, Submission};

/// An approved submission and the ledger row its approval posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Approval<S> {
    pub submission: S,
    pub entry: TransactionLogEntry,
}

fn ensure_admin(actor: &User) -> BotResult<()> {
    if actor.is_admin {
        Ok(())
    } else {
        Err(BotError::Unauthorized)
    }
}

/// Only a submitted form without a decision can be reviewed.
fn ensure_pending<S: Submission>(submission: &S) -> BotResult<()> {
    let kind = S::KIND.record_kind();
    let id = submission.id();
    match submission.stage() {
        Stage::Submitted => Ok(()),
        Stage::Approved => Err(BotError::AlreadyApproved { kind, id }),
        Stage::Denied => Err(BotError::AlreadyDenied { kind, id }),
        Stage::Drafting(_) | Stage::ReadyToSubmit => Err(BotError::NotSubmitted { kind, id }),
    }
}

fn normalize_reason(reason: &str) -> BotResult<&str> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(BotError::InvalidInput(
            "A denial reason is required".to_string(),
        ));
    }
    Ok(reason)
}

/// Checks that `admin` may review earning submission `id` right now, without changing it.
pub fn check_earning_reviewable(
    conn: &mut SqliteConnection,
    id: i32,
    admin: &User,
) -> BotResult<EarningSubmission> {
    ensure_admin(admin)?;
    let pending = submission::earning_by_id(conn, id)?;
    ensure_pending(&pending)?;
    Ok(pending)
}

pub fn check_spending_reviewable(
    conn: &mut SqliteConnection,
    id: i32,
    admin: &User,
) -> BotResult<SpendingSubmission> {
    ensure_admin(admin)?;
    let pending = submission::spending_by_id(conn, id)?;
    ensure_pending(&pending)?;
    Ok(pending)
}

pub fn approve_earning(
    conn: &mut SqliteConnection,
    id: i32,
    admin: &User,
) -> BotResult<Approval<EarningSubmission>> {
    ensure_admin(admin)?;
    conn.immediate_transaction(|conn| {
        let pending = submission::earning_by_id(conn, id)?;
        ensure_pending(&pending)?;
        let approved = diesel::update(
            earning_submissions::table
                .find(id)
                .filter(earning_submissions::submitted.eq(true))
                .filter(earning_submissions::approved.is_null()),
        )
        .set(earning_submissions::approved.eq(true))
        .returning(EarningSubmission::as_returning())
        .get_result(conn)
        .optional()?
        .ok_or(BotError::AlreadyApproved {
            kind: EarningSubmission::KIND.record_kind(),
            id,
        })?;
        let entry = ledger::post_earning_submission(conn, &approved)?;
        info!(id, admin_id = admin.id, points = entry.points, "approved earning submission");
        Ok(Approval {
            submission: approved,
            entry,
        })
    })
}

/// Approves a spending submission. The owner's balance must still cover the cost.
pub fn approve_spending(
    conn: &mut SqliteConnection,
    id: i32,
    admin: &User,
) -> BotResult<Approval<SpendingSubmission>> {
    ensure_admin(admin)?;
    conn.immediate_transaction(|conn| {
        let pending = submission::spending_by_id(conn, id)?;
        ensure_pending(&pending)?;
        let owner = ledger::find_user(conn, pending.user_id)?;
        if owner.balance < pending.cost {
            return Err(BotError::SubmitterCannotAfford {
                kind: SpendingSubmission::KIND.record_kind(),
                id,
                balance: owner.balance,
                cost: pending.cost,
            });
        }
        let approved = diesel::update(
            spending_submissions::table
                .find(id)
                .filter(spending_submissions::submitted.eq(true))
                .filter(spending_submissions::approved.is_null()),
        )
        .set(spending_submissions::approved.eq(true))
        .returning(SpendingSubmission::as_returning())
        .get_result(conn)
        .optional()?
        .ok_or(BotError::AlreadyApproved {
            kind: SpendingSubmission::KIND.record_kind(),
            id,
        })?;
        let entry = ledger::post_spending_submission(conn, &approved)?;
        info!(id, admin_id = admin.id, points = entry.points, "approved spending submission");
        Ok(Approval {
            submission: approved,
            entry,
        })
    })
}

pub fn deny_earning(
    conn: &mut SqliteConnection,
    id: i32,
    admin: &User,
    reason: &str,
) -> BotResult<EarningSubmission> {
    ensure_admin(admin)?;
    let reason = normalize_reason(reason)?;
    conn.immediate_transaction(|conn| {
        let pending = submission::earning_by_id(conn, id)?;
        ensure_pending(&pending)?;
        let denied = diesel::update(
            earning_submissions::table
                .find(id)
                .filter(earning_submissions::approved.is_null()),
        )
        .set((
            earning_submissions::approved.eq(false),
            earning_submissions::denied_reason.eq(reason),
        ))
        .returning(EarningSubmission::as_returning())
        .get_result(conn)?;
        info!(id, admin_id = admin.id, "denied earning submission");
        Ok(denied)
    })
}

pub fn deny_spending(
    conn: &mut SqliteConnection,
    id: i32,
    admin: &User,
    reason: &str,
) -> BotResult<SpendingSubmission> {
    ensure_admin(admin)?;
    let reason = normalize_reason(reason)?;
    conn.immediate_transaction(|conn| {
        let pending = submission::spending_by_id(conn, id)?;
        ensure_pending(&pending)?;
        let denied = diesel::update(
            spending_submissions::table
                .find(id)
                .filter(spending_submissions::approved.is_null()),
        )
        .set((
            spending_submissions::approved.eq(false),
            spending_submissions::denied_reason.eq(reason),
        ))
        .returning(SpendingSubmission::as_returning())
        .get_result(conn)?;
        info!(id, admin_id = admin.id, "denied spending submission");
        Ok(denied)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{find_user, get_or_create_user, ledger_total};
    use crate::model::{LocationAlignment, Provenance};
    use crate::record::{RecordKind, SubmissionKind};
    use crate::schema::transaction_log;
    use crate::submission::{
        create_earning, create_spending, make_earning_edits, make_spending_edits, reserve_id,
        set_ability_info, set_act_summary, set_location_alignment, set_lore_compliance,
        set_points_lodged, submit_earning, submit_spending, AbilityInfo,
    };
    use crate::test_support::*;

    fn submitted_earning(
        conn: &mut SqliteConnection,
        owner: &User,
        channel: &str,
        points: i32,
        alignment: LocationAlignment,
    ) -> EarningSubmission {
        let id = reserve_id(conn, SubmissionKind::Earning).expect("id reserved");
        create_earning(conn, id, channel, owner.id).expect("draft created");
        set_points_lodged(conn, channel, owner, points).expect("points set");
        set_act_summary(conn, channel, owner, "Foiled the heist").expect("summary set");
        set_location_alignment(conn, channel, owner, alignment).expect("alignment set");
        submit_earning(conn, channel, owner).expect("submits")
    }

    fn submitted_spending(
        conn: &mut SqliteConnection,
        owner: &User,
        channel: &str,
    ) -> SpendingSubmission {
        let id = reserve_id(conn, SubmissionKind::Spending).expect("id reserved");
        create_spending(conn, id, channel, owner.id, 200).expect("draft created");
        set_ability_info(
            conn,
            channel,
            owner,
            AbilityInfo {
                ability_requested: Some("Night Sight".to_string()),
                ability_description: Some("See in the dark".to_string()),
                ability_limitations: Some("Not in sunlight".to_string()),
                cost_weakness: Some("Light sensitivity".to_string()),
                cost_weakness_description: Some("Blinded by bright light".to_string()),
            },
        )
        .expect("ability info set");
        set_lore_compliance(conn, channel, owner, true).expect("compliance set");
        submit_spending(conn, channel, owner).expect("submits")
    }

    fn ledger_rows(conn: &mut SqliteConnection) -> i64 {
        transaction_log::table
            .count()
            .get_result(conn)
            .expect("Query failed")
    }

    #[test]
    fn test_approval_applies_multiplier() {
        let cases = [
            (LocationAlignment::InContravention, 20),
            (LocationAlignment::InAlignment, 15),
            (LocationAlignment::NotApplicable, 10),
        ];
        for (alignment, expected) in cases {
            let mut conn = test_conn();
            let boss = admin(&mut conn, "1");
            let owner = get_or_create_user(&mut conn, "2").expect("user created");
            let submitted = submitted_earning(&mut conn, &owner, "500", 10, alignment);

            let approval = approve_earning(&mut conn, submitted.id, &boss).expect("approves");
            assert_eq!(approval.entry.points, expected);
            assert_eq!(
                approval.entry.provenance(),
                Some(Provenance::EarningSubmission(submitted.id))
            );
            assert_eq!(approval.submission.approved, Some(true));
            assert_eq!(find_user(&mut conn, owner.id).unwrap().balance, expected);
        }
    }

    #[test]
    fn test_approval_is_at_most_once() {
        let mut conn = test_conn();
        let boss = admin(&mut conn, "1");
        let owner = get_or_create_user(&mut conn, "2").expect("user created");
        let submitted =
            submitted_earning(&mut conn, &owner, "500", 20, LocationAlignment::NotApplicable);

        approve_earning(&mut conn, submitted.id, &boss).expect("first approval");
        let err = approve_earning(&mut conn, submitted.id, &boss).expect_err("second approval");
        assert!(matches!(
            err,
            BotError::AlreadyApproved {
                kind: RecordKind::EarningSubmission,
                ..
            }
        ));
        assert_eq!(ledger_rows(&mut conn), 1);
        assert_eq!(find_user(&mut conn, owner.id).unwrap().balance, 20);
    }

    #[test]
    fn test_review_requires_admin() {
        let mut conn = test_conn();
        let owner = get_or_create_user(&mut conn, "2").expect("user created");
        let submitted =
            submitted_earning(&mut conn, &owner, "500", 20, LocationAlignment::NotApplicable);

        let err = approve_earning(&mut conn, submitted.id, &owner).expect_err("not an admin");
        assert!(matches!(err, BotError::Unauthorized));
        let err = deny_earning(&mut conn, submitted.id, &owner, "no").expect_err("not an admin");
        assert!(matches!(err, BotError::Unauthorized));

        let unchanged = submission::earning_by_id(&mut conn, submitted.id).unwrap();
        assert_eq!(unchanged, submitted);
        assert_eq!(ledger_rows(&mut conn), 0);
    }

    #[test]
    fn test_cannot_review_a_draft() {
        let mut conn = test_conn();
        let boss = admin(&mut conn, "1");
        let owner = get_or_create_user(&mut conn, "2").expect("user created");
        let id = reserve_id(&mut conn, SubmissionKind::Earning).expect("id reserved");
        create_earning(&mut conn, id, "500", owner.id).expect("draft created");

        let err = approve_earning(&mut conn, id, &boss).expect_err("still a draft");
        assert!(matches!(err, BotError::NotSubmitted { .. }));
        let err = approve_earning(&mut conn, 77, &boss).expect_err("missing");
        assert!(matches!(err, BotError::NotFound { id: 77, .. }));
    }

    #[test]
    fn test_spending_approval_rechecks_balance() {
        let mut conn = test_conn();
        let boss = admin(&mut conn, "1");
        let owner = user_with_balance(&mut conn, "2", 200);
        let submitted = submitted_spending(&mut conn, &owner, "600");

        ledger::admin_adjust_balance(&mut conn, &boss, owner.id, ledger::AdjustOp::Sub, 1, "fine")
            .expect("balance lowered");
        let err = approve_spending(&mut conn, submitted.id, &boss).expect_err("too poor now");
        assert!(matches!(
            err,
            BotError::SubmitterCannotAfford {
                balance: 199,
                cost: 200,
                ..
            }
        ));
        let unchanged = submission::spending_by_id(&mut conn, submitted.id).unwrap();
        assert_eq!(unchanged.approved, None);

        ledger::admin_adjust_balance(&mut conn, &boss, owner.id, ledger::AdjustOp::Add, 51, "gift")
            .expect("balance raised");
        let approval = approve_spending(&mut conn, submitted.id, &boss).expect("approves");
        assert_eq!(approval.entry.points, -200);
        assert_eq!(find_user(&mut conn, owner.id).unwrap().balance, 50);
        assert_eq!(ledger_total(&mut conn, owner.id).unwrap(), 50);
    }

    #[test]
    fn test_denial_and_edit_cycle() {
        let mut conn = test_conn();
        let boss = admin(&mut conn, "1");
        let owner = get_or_create_user(&mut conn, "2").expect("user created");
        let submitted =
            submitted_earning(&mut conn, &owner, "500", 30, LocationAlignment::InAlignment);

        assert!(matches!(
            deny_earning(&mut conn, submitted.id, &boss, "  "),
            Err(BotError::InvalidInput(_))
        ));
        let denied =
            deny_earning(&mut conn, submitted.id, &boss, "Needs more detail").expect("denies");
        assert_eq!(denied.approved, Some(false));
        assert_eq!(denied.denied_reason.as_deref(), Some("Needs more detail"));
        assert!(matches!(
            deny_earning(&mut conn, submitted.id, &boss, "again"),
            Err(BotError::AlreadyDenied { .. })
        ));
        assert!(matches!(
            approve_earning(&mut conn, submitted.id, &boss),
            Err(BotError::AlreadyDenied { .. })
        ));

        let reopened =
            make_earning_edits(&mut conn, submitted.id, &owner, "501").expect("reopened");
        assert_eq!(reopened.channel_id, "501");
        assert_eq!(reopened.stage(), Stage::ReadyToSubmit);
        assert_eq!(reopened.denied_reason, None);
        assert_eq!(reopened.approved, None);
        assert_eq!(reopened.points_lodged, submitted.points_lodged);
        assert_eq!(reopened.act_summary, submitted.act_summary);
        assert_eq!(reopened.location_alignment, submitted.location_alignment);

        submit_earning(&mut conn, "501", &owner).expect("resubmits");
        let approval = approve_earning(&mut conn, submitted.id, &boss).expect("approves");
        assert_eq!(approval.entry.points, 45);

        let err = make_earning_edits(&mut conn, submitted.id, &owner, "502")
            .expect_err("approved is final");
        assert!(matches!(err, BotError::ChangesUnnecessary { .. }));
    }

    #[test]
    fn test_approval_cannot_overflow_balance() {
        let mut conn = test_conn();
        let boss = admin(&mut conn, "1");
        let owner = get_or_create_user(&mut conn, "2").expect("user created");
        let first = submitted_earning(
            &mut conn,
            &owner,
            "500",
            1_200_000_000,
            LocationAlignment::NotApplicable,
        );
        let second = submitted_earning(
            &mut conn,
            &owner,
            "501",
            1_200_000_000,
            LocationAlignment::NotApplicable,
        );

        approve_earning(&mut conn, first.id, &boss).expect("first approval fits");
        let err = approve_earning(&mut conn, second.id, &boss).expect_err("balance would overflow");
        assert!(matches!(err, BotError::InvalidInput(_)));

        let unchanged = submission::earning_by_id(&mut conn, second.id).unwrap();
        assert_eq!(unchanged.approved, None);
        assert_eq!(ledger_rows(&mut conn), 1);
        let balance = find_user(&mut conn, owner.id).unwrap().balance;
        assert_eq!(balance, 1_200_000_000);
        assert_eq!(i64::from(balance), ledger_total(&mut conn, owner.id).unwrap());
    }

    #[test]
    fn test_spending_denial_and_edit_cycle() {
        let mut conn = test_conn();
        let boss = admin(&mut conn, "1");
        let owner = user_with_balance(&mut conn, "2", 260);
        let submitted = submitted_spending(&mut conn, &owner, "600");

        deny_spending(&mut conn, submitted.id, &boss, "Too strong").expect("denies");
        let reopened =
            make_spending_edits(&mut conn, submitted.id, &owner, "601").expect("reopened");
        assert_eq!(reopened.channel_id, "601");
        assert_eq!(reopened.stage(), Stage::ReadyToSubmit);
        assert_eq!(reopened.approved, None);
        assert_eq!(reopened.denied_reason, None);
        assert!(!reopened.submitted);
        assert_eq!(reopened.ability_requested, submitted.ability_requested);
        assert_eq!(reopened.ability_description, submitted.ability_description);
        assert_eq!(reopened.ability_limitations, submitted.ability_limitations);
        assert_eq!(reopened.cost_weakness, submitted.cost_weakness);
        assert_eq!(
            reopened.cost_weakness_description,
            submitted.cost_weakness_description
        );
        assert_eq!(reopened.lore_rule_compliant, Some(true));

        submit_spending(&mut conn, "601", &owner).expect("resubmits");
        let approval = approve_spending(&mut conn, submitted.id, &boss).expect("approves");
        assert_eq!(approval.entry.points, -200);
        let err = approve_spending(&mut conn, submitted.id, &boss).expect_err("second approval");
        assert!(matches!(
            err,
            BotError::AlreadyApproved {
                kind: RecordKind::SpendingSubmission,
                ..
            }
        ));

        let spends: Vec<i32> = transaction_log::table
            .filter(transaction_log::spending_submission_id.eq(submitted.id))
            .select(transaction_log::points)
            .load(&mut conn)
            .expect("Query failed");
        assert_eq!(spends, vec![-200]);
        assert_eq!(find_user(&mut conn, owner.id).unwrap().balance, 60);
        assert_eq!(ledger_total(&mut conn, owner.id).unwrap(), 60);
        assert!(matches!(
            make_spending_edits(&mut conn, submitted.id, &owner, "602"),
            Err(BotError::ChangesUnnecessary { .. })
        ));
    }

    #[test]
    fn test_balances_match_ledger_after_mixed_activity() {
        let mut conn = test_conn();
        let boss = admin(&mut conn, "1");
        let alice = user_with_balance(&mut conn, "2", 250);
        let bob = get_or_create_user(&mut conn, "3").expect("user created");

        let earning =
            submitted_earning(&mut conn, &bob, "500", 15, LocationAlignment::InAlignment);
        approve_earning(&mut conn, earning.id, &boss).expect("approves");
        let spending = submitted_spending(&mut conn, &alice, "600");
        approve_spending(&mut conn, spending.id, &boss).expect("approves");
        let earning =
            submitted_earning(&mut conn, &alice, "501", 10, LocationAlignment::InContravention);
        deny_earning(&mut conn, earning.id, &boss, "Off topic").expect("denies");

        for user in [&boss, &alice, &bob] {
            let balance = find_user(&mut conn, user.id).unwrap().balance;
            assert_eq!(i64::from(balance), ledger_total(&mut conn, user.id).unwrap());
        }
        assert_eq!(find_user(&mut conn, alice.id).unwrap().balance, 50);
        assert_eq!(find_user(&mut conn, bob.id).unwrap().balance, 23);
    }

    #[test]
    fn test_check_reviewable() {
        let mut conn = test_conn();
        let boss = admin(&mut conn, "1");
        let owner = user_with_balance(&mut conn, "2", 300);
        let submitted = submitted_spending(&mut conn, &owner, "600");
        assert!(check_spending_reviewable(&mut conn, submitted.id, &boss).is_ok());
        assert!(matches!(
            check_spending_reviewable(&mut conn, submitted.id, &owner),
            Err(BotError::Unauthorized)
        ));
        deny_spending(&mut conn, submitted.id, &boss, "Too strong").expect("denies");
        assert!(matches!(
            check_spending_reviewable(&mut conn, submitted.id, &boss),
            Err(BotError::AlreadyDenied { .. })
        ));
    }
}
