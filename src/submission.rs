//! The guided forms behind earning and spending submissions.
//!
//! A submission is located through the private channel it is bound to. Required fields are
//! filled in a fixed order; every field write reports whether it populated the field for the
//! first time, which is what decides whether the next step of the form gets presented. The
//! read and the write happen in one immediate transaction so two concurrent writes cannot both
//! claim the first population.

use chrono::Utc;
use diesel::prelude::*;
use diesel::SqliteConnection;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{BotError, BotResult};
use crate::model::{
    EarningSubmission, LocationAlignment, NewEarningSubmission, NewSpendingSubmission,
    SpendingSubmission, User,
};
use crate::record::SubmissionKind;
use crate::schema::{earning_submissions, id_sequences, spending_submissions, users};

/// Where a submission is in its lifecycle. `Drafting` carries the next field the form asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage<S> {
    Drafting(S),
    ReadyToSubmit,
    Submitted,
    Approved,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum EarningStep {
    PointsLodged,
    ActSummary,
    LocationAlignment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum SpendingStep {
    AbilityInfo,
    LoreCompliance,
}

/// Common view over both submission kinds.
pub trait Submission {
    type Step: Copy + Ord;
    const KIND: SubmissionKind;

    fn id(&self) -> i32;
    fn owner_id(&self) -> i32;
    fn channel_id(&self) -> &str;
    fn is_submitted(&self) -> bool;
    /// `None` while pending, otherwise whether an admin approved it.
    fn decision(&self) -> Option<bool>;
    /// The first required step that still has unset fields.
    fn next_step(&self) -> Option<Self::Step>;
    fn missing_fields(&self) -> Vec<&'static str>;

    fn stage(&self) -> Stage<Self::Step> {
        match (self.is_submitted(), self.decision()) {
            (_, Some(true)) => Stage::Approved,
            (_, Some(false)) => Stage::Denied,
            (true, None) => Stage::Submitted,
            (false, None) => match self.next_step() {
                Some(step) => Stage::Drafting(step),
                None => Stage::ReadyToSubmit,
            },
        }
    }
}

impl Submission for EarningSubmission {
    type Step = EarningStep;
    const KIND: SubmissionKind = SubmissionKind::Earning;

    fn id(&self) -> i32 {
        self.id
    }

    fn owner_id(&self) -> i32 {
        self.user_id
    }

    fn channel_id(&self) -> &str {
        &self.channel_id
    }

    fn is_submitted(&self) -> bool {
        self.submitted
    }

    fn decision(&self) -> Option<bool> {
        self.approved
    }

    fn next_step(&self) -> Option<EarningStep> {
        if self.points_lodged.is_none() {
            Some(EarningStep::PointsLodged)
        } else if self.act_summary.is_none() {
            Some(EarningStep::ActSummary)
        } else if self.location_alignment.is_none() {
            Some(EarningStep::LocationAlignment)
        } else {
            None
        }
    }

    fn missing_fields(&self) -> Vec<&'static str> {
        earning_missing_fields(self)
    }
}

impl Submission for SpendingSubmission {
    type Step = SpendingStep;
    const KIND: SubmissionKind = SubmissionKind::Spending;

    fn id(&self) -> i32 {
        self.id
    }

    fn owner_id(&self) -> i32 {
        self.user_id
    }

    fn channel_id(&self) -> &str {
        &self.channel_id
    }

    fn is_submitted(&self) -> bool {
        self.submitted
    }

    fn decision(&self) -> Option<bool> {
        self.approved
    }

    fn next_step(&self) -> Option<SpendingStep> {
        if !ability_info_complete(self) {
            Some(SpendingStep::AbilityInfo)
        } else if self.lore_rule_compliant.is_none() {
            Some(SpendingStep::LoreCompliance)
        } else {
            None
        }
    }

    fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing: Vec<&'static str> = AbilityField::ALL
            .iter()
            .filter(|field| field.value(self).is_none())
            .map(|field| field.label())
            .collect();
        if self.lore_rule_compliant.is_none() {
            missing.push("Lore/Rule Compliance");
        }
        missing
    }
}

pub fn earning_missing_fields(submission: &EarningSubmission) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if submission.points_lodged.is_none() {
        missing.push("Points Lodged");
    }
    if submission.act_summary.is_none() {
        missing.push("Act Summary");
    }
    if submission.location_alignment.is_none() {
        missing.push("Location Alignment");
    }
    missing
}

/// The five free-text fields of the ability information step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbilityField {
    Requested,
    Description,
    Limitations,
    CostWeakness,
    CostWeaknessDescription,
}

impl AbilityField {
    pub const ALL: [AbilityField; 5] = [
        AbilityField::Requested,
        AbilityField::Description,
        AbilityField::Limitations,
        AbilityField::CostWeakness,
        AbilityField::CostWeaknessDescription,
    ];

    pub fn label(self) -> &'static str {
        match self {
            AbilityField::Requested => "Ability Requested",
            AbilityField::Description => "Description of Ability",
            AbilityField::Limitations => "Scope/Limitations of Ability",
            AbilityField::CostWeakness => "Cost or Balancing Weakness",
            AbilityField::CostWeaknessDescription => "Description of Cost/Weakness",
        }
    }

    /// Input key used by the ability form.
    pub fn key(self) -> &'static str {
        match self {
            AbilityField::Requested => "ability_requested",
            AbilityField::Description => "ability_description",
            AbilityField::Limitations => "ability_limitations",
            AbilityField::CostWeakness => "cost_weakness",
            AbilityField::CostWeaknessDescription => "cost_weakness_description",
        }
    }

    /// Short inputs are single-line in the form.
    pub fn multiline(self) -> bool {
        !matches!(self, AbilityField::Requested | AbilityField::CostWeakness)
    }

    pub fn value(self, submission: &SpendingSubmission) -> Option<&str> {
        match self {
            AbilityField::Requested => submission.ability_requested.as_deref(),
            AbilityField::Description => submission.ability_description.as_deref(),
            AbilityField::Limitations => submission.ability_limitations.as_deref(),
            AbilityField::CostWeakness => submission.cost_weakness.as_deref(),
            AbilityField::CostWeaknessDescription => {
                submission.cost_weakness_description.as_deref()
            }
        }
    }

    fn patch(self, info: &AbilityInfo) -> Option<&str> {
        match self {
            AbilityField::Requested => info.ability_requested.as_deref(),
            AbilityField::Description => info.ability_description.as_deref(),
            AbilityField::Limitations => info.ability_limitations.as_deref(),
            AbilityField::CostWeakness => info.cost_weakness.as_deref(),
            AbilityField::CostWeaknessDescription => info.cost_weakness_description.as_deref(),
        }
    }
}

fn ability_info_complete(submission: &SpendingSubmission) -> bool {
    AbilityField::ALL
        .iter()
        .all(|field| field.value(submission).is_some())
}

/// A partial update of the ability information. Unset fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, AsChangeset)]
#[diesel(table_name = spending_submissions)]
pub struct AbilityInfo {
    pub ability_requested: Option<String>,
    pub ability_description: Option<String>,
    pub ability_limitations: Option<String>,
    pub cost_weakness: Option<String>,
    pub cost_weakness_description: Option<String>,
}

impl AbilityInfo {
    /// Treats blank inputs as "leave unchanged".
    pub fn normalized(self) -> Self {
        let clean = |value: Option<String>| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        AbilityInfo {
            ability_requested: clean(self.ability_requested),
            ability_description: clean(self.ability_description),
            ability_limitations: clean(self.ability_limitations),
            cost_weakness: clean(self.cost_weakness),
            cost_weakness_description: clean(self.cost_weakness_description),
        }
    }

    pub fn is_empty(&self) -> bool {
        AbilityField::ALL.iter().all(|f| f.patch(self).is_none())
    }

    /// Which fields this patch would actually change on `submission`.
    pub fn changes(&self, submission: &SpendingSubmission) -> Vec<AbilityField> {
        AbilityField::ALL
            .iter()
            .copied()
            .filter(|f| f.patch(self).is_some() && f.patch(self) != f.value(submission))
            .collect()
    }
}

/// Result of writing one step of a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldUpdate<S> {
    /// The record as it stands after the write.
    pub submission: S,
    /// True when the write completed a step that was previously incomplete.
    pub first_time: bool,
}

impl<S: Submission> FieldUpdate<S> {
    /// The stage to present next, or `None` when this was an edit of an already-completed step.
    pub fn advance(&self) -> Option<Stage<S::Step>> {
        self.first_time.then(|| self.submission.stage())
    }
}

/// Allocates the next id for a submission kind with a single atomic increment.
pub fn reserve_id(conn: &mut SqliteConnection, kind: SubmissionKind) -> BotResult<i32> {
    let sequence = match kind {
        SubmissionKind::Earning => "earning_submissions",
        SubmissionKind::Spending => "spending_submissions",
    };
    let id = diesel::update(id_sequences::table.find(sequence))
        .set(id_sequences::last_value.eq(id_sequences::last_value + 1))
        .returning(id_sequences::last_value)
        .get_result(conn)?;
    Ok(id)
}

pub fn create_earning(
    conn: &mut SqliteConnection,
    id: i32,
    channel_id: &str,
    user_id: i32,
) -> BotResult<EarningSubmission> {
    let submission = diesel::insert_into(earning_submissions::table)
        .values(&NewEarningSubmission {
            id,
            channel_id,
            user_id,
            created_at: Utc::now().naive_utc(),
        })
        .returning(EarningSubmission::as_returning())
        .get_result(conn)?;
    info!(id, user_id, channel_id, "created earning submission");
    Ok(submission)
}

/// Rejects a spending submission from a user who cannot cover its cost.
pub fn check_spending_balance(user: &User, cost: i32) -> BotResult<()> {
    if user.balance < cost {
        return Err(BotError::InsufficientBalance {
            balance: user.balance,
            cost,
        });
    }
    Ok(())
}

/// Creates a spending draft with its cost fixed at `cost`. The balance is checked against the
/// cost again here, inside the same transaction as the insert.
pub fn create_spending(
    conn: &mut SqliteConnection,
    id: i32,
    channel_id: &str,
    user_id: i32,
    cost: i32,
) -> BotResult<SpendingSubmission> {
    conn.immediate_transaction(|conn| {
        let user = users::table
            .find(user_id)
            .select(User::as_select())
            .first(conn)
            .optional()?
            .ok_or(BotError::UnknownUser(user_id))?;
        check_spending_balance(&user, cost)?;
        let submission = diesel::insert_into(spending_submissions::table)
            .values(&NewSpendingSubmission {
                id,
                channel_id,
                user_id,
                created_at: Utc::now().naive_utc(),
                cost,
            })
            .returning(SpendingSubmission::as_returning())
            .get_result(conn)?;
        info!(id, user_id, channel_id, cost, "created spending submission");
        Ok(submission)
    })
}

pub fn earning_by_id(conn: &mut SqliteConnection, id: i32) -> BotResult<EarningSubmission> {
    earning_submissions::table
        .find(id)
        .select(EarningSubmission::as_select())
        .first(conn)
        .optional()?
        .ok_or(BotError::NotFound {
            kind: SubmissionKind::Earning.record_kind(),
            id,
        })
}

pub fn spending_by_id(conn: &mut SqliteConnection, id: i32) -> BotResult<SpendingSubmission> {
    spending_submissions::table
        .find(id)
        .select(SpendingSubmission::as_select())
        .first(conn)
        .optional()?
        .ok_or(BotError::NotFound {
            kind: SubmissionKind::Spending.record_kind(),
            id,
        })
}

pub fn earning_by_channel(
    conn: &mut SqliteConnection,
    channel_id: &str,
) -> BotResult<EarningSubmission> {
    earning_submissions::table
        .filter(earning_submissions::channel_id.eq(channel_id))
        .order(earning_submissions::id.desc())
        .select(EarningSubmission::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| BotError::NoSubmissionForChannel(channel_id.to_string()))
}

pub fn spending_by_channel(
    conn: &mut SqliteConnection,
    channel_id: &str,
) -> BotResult<SpendingSubmission> {
    spending_submissions::table
        .filter(spending_submissions::channel_id.eq(channel_id))
        .order(spending_submissions::id.desc())
        .select(SpendingSubmission::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| BotError::NoSubmissionForChannel(channel_id.to_string()))
}

fn ensure_owner<S: Submission>(submission: &S, actor: &User) -> BotResult<()> {
    if submission.owner_id() != actor.id {
        return Err(BotError::NotOwner {
            kind: S::KIND.record_kind(),
            id: submission.id(),
        });
    }
    Ok(())
}

/// Fields can be written only by the owner, and only before the submission is handed to review.
fn ensure_editable<S: Submission>(submission: &S, actor: &User) -> BotResult<()> {
    ensure_owner(submission, actor)?;
    let kind = S::KIND.record_kind();
    let id = submission.id();
    match submission.stage() {
        Stage::Drafting(_) | Stage::ReadyToSubmit => Ok(()),
        Stage::Submitted | Stage::Denied => Err(BotError::AlreadySubmitted { kind, id }),
        Stage::Approved => Err(BotError::AlreadyApproved { kind, id }),
    }
}

/// Steps are filled in order; a step can be written once every step before it is complete.
fn ensure_reachable<S: Submission>(submission: &S, step: S::Step) -> BotResult<()> {
    match submission.next_step() {
        Some(next) if next < step => Err(BotError::Incomplete {
            kind: S::KIND.record_kind(),
            id: submission.id(),
            missing: submission.missing_fields(),
        }),
        _ => Ok(()),
    }
}

fn update_earning<F>(
    conn: &mut SqliteConnection,
    channel_id: &str,
    actor: &User,
    step: EarningStep,
    write: F,
) -> BotResult<FieldUpdate<EarningSubmission>>
where
    F: FnOnce(&mut SqliteConnection, i32) -> QueryResult<usize>,
{
    conn.immediate_transaction(|conn| {
        let before = earning_by_channel(conn, channel_id)?;
        ensure_editable(&before, actor)?;
        ensure_reachable(&before, step)?;
        let first_time = match step {
            EarningStep::PointsLodged => before.points_lodged.is_none(),
            EarningStep::ActSummary => before.act_summary.is_none(),
            EarningStep::LocationAlignment => before.location_alignment.is_none(),
        };
        write(conn, before.id)?;
        let submission = earning_by_id(conn, before.id)?;
        info!(id = submission.id, ?step, first_time, "updated earning submission");
        Ok(FieldUpdate {
            submission,
            first_time,
        })
    })
}

pub fn set_points_lodged(
    conn: &mut SqliteConnection,
    channel_id: &str,
    actor: &User,
    points: i32,
) -> BotResult<FieldUpdate<EarningSubmission>> {
    if points <= 0 {
        return Err(BotError::InvalidInput(
            "Points lodged must be a positive number".to_string(),
        ));
    }
    update_earning(conn, channel_id, actor, EarningStep::PointsLodged, |conn, id| {
        diesel::update(earning_submissions::table.find(id))
            .set(earning_submissions::points_lodged.eq(points))
            .execute(conn)
    })
}

pub fn set_act_summary(
    conn: &mut SqliteConnection,
    channel_id: &str,
    actor: &User,
    act_summary: &str,
) -> BotResult<FieldUpdate<EarningSubmission>> {
    let act_summary = act_summary.trim();
    if act_summary.is_empty() {
        return Err(BotError::InvalidInput(
            "The act summary must not be empty".to_string(),
        ));
    }
    update_earning(conn, channel_id, actor, EarningStep::ActSummary, |conn, id| {
        diesel::update(earning_submissions::table.find(id))
            .set(earning_submissions::act_summary.eq(act_summary))
            .execute(conn)
    })
}

pub fn set_location_alignment(
    conn: &mut SqliteConnection,
    channel_id: &str,
    actor: &User,
    alignment: LocationAlignment,
) -> BotResult<FieldUpdate<EarningSubmission>> {
    update_earning(
        conn,
        channel_id,
        actor,
        EarningStep::LocationAlignment,
        |conn, id| {
            diesel::update(earning_submissions::table.find(id))
                .set(earning_submissions::location_alignment.eq(alignment))
                .execute(conn)
        },
    )
}

/// Writes any subset of the five ability fields. `first_time` is set when this write is the
/// one that completes the ability step.
pub fn set_ability_info(
    conn: &mut SqliteConnection,
    channel_id: &str,
    actor: &User,
    info: AbilityInfo,
) -> BotResult<FieldUpdate<SpendingSubmission>> {
    let info = info.normalized();
    conn.immediate_transaction(|conn| {
        let before = spending_by_channel(conn, channel_id)?;
        ensure_editable(&before, actor)?;
        let was_complete = ability_info_complete(&before);
        if !info.is_empty() {
            diesel::update(spending_submissions::table.find(before.id))
                .set(&info)
                .execute(conn)?;
        }
        let submission = spending_by_id(conn, before.id)?;
        let first_time = !was_complete && ability_info_complete(&submission);
        info!(id = submission.id, first_time, "updated spending ability information");
        Ok(FieldUpdate {
            submission,
            first_time,
        })
    })
}

pub fn set_lore_compliance(
    conn: &mut SqliteConnection,
    channel_id: &str,
    actor: &User,
    compliant: bool,
) -> BotResult<FieldUpdate<SpendingSubmission>> {
    conn.immediate_transaction(|conn| {
        let before = spending_by_channel(conn, channel_id)?;
        ensure_editable(&before, actor)?;
        ensure_reachable(&before, SpendingStep::LoreCompliance)?;
        let first_time = before.lore_rule_compliant.is_none();
        diesel::update(spending_submissions::table.find(before.id))
            .set(spending_submissions::lore_rule_compliant.eq(compliant))
            .execute(conn)?;
        let submission = spending_by_id(conn, before.id)?;
        info!(id = submission.id, compliant, first_time, "updated spending lore compliance");
        Ok(FieldUpdate {
            submission,
            first_time,
        })
    })
}

/// Only a complete draft, by its owner, can be handed to review; and only once.
fn ensure_submittable<S: Submission>(submission: &S, actor: &User) -> BotResult<()> {
    ensure_editable(submission, actor)?;
    if let Stage::Drafting(_) = submission.stage() {
        return Err(BotError::Incomplete {
            kind: S::KIND.record_kind(),
            id: submission.id(),
            missing: submission.missing_fields(),
        });
    }
    Ok(())
}

pub fn submit_earning(
    conn: &mut SqliteConnection,
    channel_id: &str,
    actor: &User,
) -> BotResult<EarningSubmission> {
    conn.immediate_transaction(|conn| {
        let draft = earning_by_channel(conn, channel_id)?;
        ensure_submittable(&draft, actor)?;
        let submitted = diesel::update(
            earning_submissions::table
                .find(draft.id)
                .filter(earning_submissions::submitted.eq(false)),
        )
        .set(earning_submissions::submitted.eq(true))
        .returning(EarningSubmission::as_returning())
        .get_result(conn)
        .optional()?
        .ok_or(BotError::AlreadySubmitted {
            kind: SubmissionKind::Earning.record_kind(),
            id: draft.id,
        })?;
        info!(id = submitted.id, user_id = submitted.user_id, "earning submission submitted");
        Ok(submitted)
    })
}

pub fn submit_spending(
    conn: &mut SqliteConnection,
    channel_id: &str,
    actor: &User,
) -> BotResult<SpendingSubmission> {
    conn.immediate_transaction(|conn| {
        let draft = spending_by_channel(conn, channel_id)?;
        ensure_submittable(&draft, actor)?;
        let submitted = diesel::update(
            spending_submissions::table
                .find(draft.id)
                .filter(spending_submissions::submitted.eq(false)),
        )
        .set(spending_submissions::submitted.eq(true))
        .returning(SpendingSubmission::as_returning())
        .get_result(conn)
        .optional()?
        .ok_or(BotError::AlreadySubmitted {
            kind: SubmissionKind::Spending.record_kind(),
            id: draft.id,
        })?;
        info!(id = submitted.id, user_id = submitted.user_id, "spending submission submitted");
        Ok(submitted)
    })
}

/// A denied submission can be reopened by its owner; anything else explains why not.
pub fn ensure_revisable<S: Submission>(submission: &S, actor: &User) -> BotResult<()> {
    ensure_owner(submission, actor)?;
    let kind = S::KIND.record_kind();
    let id = submission.id();
    match submission.stage() {
        Stage::Denied => Ok(()),
        Stage::Approved => Err(BotError::ChangesUnnecessary { kind, id }),
        Stage::Submitted => Err(BotError::NotDenied { kind, id }),
        Stage::Drafting(_) | Stage::ReadyToSubmit => Err(BotError::AlreadyEditing {
            channel_id: submission.channel_id().to_string(),
        }),
    }
}

/// Moves a denied earning submission back to editing in `new_channel_id`. Field values are
/// kept; the review outcome is cleared.
pub fn make_earning_edits(
    conn: &mut SqliteConnection,
    id: i32,
    actor: &User,
    new_channel_id: &str,
) -> BotResult<EarningSubmission> {
    conn.immediate_transaction(|conn| {
        let denied = earning_by_id(conn, id)?;
        ensure_revisable(&denied, actor)?;
        let reopened = diesel::update(
            earning_submissions::table
                .find(id)
                .filter(earning_submissions::approved.eq(false)),
        )
        .set((
            earning_submissions::channel_id.eq(new_channel_id),
            earning_submissions::submitted.eq(false),
            earning_submissions::approved.eq(None::<bool>),
            earning_submissions::denied_reason.eq(None::<String>),
        ))
        .returning(EarningSubmission::as_returning())
        .get_result(conn)?;
        info!(id, channel_id = new_channel_id, "reopened earning submission for edits");
        Ok(reopened)
    })
}

pub fn make_spending_edits(
    conn: &mut SqliteConnection,
    id: i32,
    actor: &User,
    new_channel_id: &str,
) -> BotResult<SpendingSubmission> {
    conn.immediate_transaction(|conn| {
        let denied = spending_by_id(conn, id)?;
        ensure_revisable(&denied, actor)?;
        let reopened = diesel::update(
            spending_submissions::table
                .find(id)
                .filter(spending_submissions::approved.eq(false)),
        )
        .set((
            spending_submissions::channel_id.eq(new_channel_id),
            spending_submissions::submitted.eq(false),
            spending_submissions::approved.eq(None::<bool>),
            spending_submissions::denied_reason.eq(None::<String>),
        ))
        .returning(SpendingSubmission::as_returning())
        .get_result(conn)?;
        info!(id, channel_id = new_channel_id, "reopened spending submission for edits");
        Ok(reopened)
    })
}
