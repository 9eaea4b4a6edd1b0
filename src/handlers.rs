//! Turns gateway interactions into operations on the store and replies for the actor.
//!
//! Every handler gets the same [`Context`]: the connection pool, the gateway, the runtime
//! config and the pagination sessions. Blocking diesel work runs on the blocking thread pool.
//! Errors never escape [`dispatch`]; they become ephemeral replies.

use std::collections::HashMap;
use std::sync::Arc;

use diesel::SqliteConnection;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{BotError, BotResult};
use crate::gateway::{Gateway, GatewayError};
use crate::ledger::{self, AdjustOp};
use crate::model::{LocationAlignment, User};
use crate::query::{self, AdminLogFilter, UserFilter};
use crate::record::{self, Inspection, RecordKind, SubmissionKind};
use crate::review;
use crate::session::{PagedListing, SessionStore};
use crate::submission::{self, AbilityField, AbilityInfo, EarningStep, SpendingStep, Stage};
use crate::view::{self, Card, ComponentId, ModalId, NextStep, Reply};
use crate::DbPool;

#[derive(Clone)]
pub struct Context {
    pub pool: DbPool,
    pub gateway: Arc<dyn Gateway>,
    pub config: Arc<Config>,
    pub sessions: Arc<SessionStore>,
}

impl Context {
    pub fn new(pool: DbPool, gateway: Arc<dyn Gateway>, config: Config) -> Self {
        Context {
            pool,
            gateway,
            config: Arc::new(config),
            sessions: Arc::new(SessionStore::new()),
        }
    }

    /// Runs `work` with a pooled connection on the blocking thread pool.
    pub async fn db<T, F>(&self, work: F) -> BotResult<T>
    where
        F: FnOnce(&mut SqliteConnection) -> BotResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            work(&mut conn)
        })
        .await?
    }
}

/// One user action, already authenticated by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    /// External identity of the acting user.
    pub actor: String,
    /// The channel the action happened in, if any.
    #[serde(default)]
    pub channel_id: Option<String>,
    pub kind: InteractionKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Command(Command),
    Component {
        custom_id: String,
        #[serde(default)]
        values: Vec<String>,
    },
    Modal {
        custom_id: String,
        #[serde(default)]
        fields: HashMap<String, String>,
    },
}

fn first_page() -> i64 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Visible,
    Invisible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "bot admin", alias = "admin", alias = "bot_admin")]
    BotAdmin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Command {
    EarningSubmission,
    SpendingSubmission,
    Balance {
        user: Option<String>,
    },
    AdminTransaction {
        user: String,
        action: AdjustOp,
        amount: i64,
        reason: String,
    },
    AdminTransactionLog {
        target_user: Option<String>,
        admin_user: Option<String>,
        #[serde(default = "first_page")]
        page: i64,
    },
    Leaderboard {
        #[serde(default = "first_page")]
        page: i64,
    },
    TransactionLog {
        user: String,
        #[serde(default = "first_page")]
        page: i64,
    },
    Inspect {
        record_type: RecordKind,
        record_id: i32,
    },
    SetVisibility {
        visibility: Visibility,
        user: Option<String>,
        user_id: Option<i32>,
    },
    #[serde(alias = "set_user_privs")]
    SetRole {
        user_privs: Role,
        user: Option<String>,
        user_id: Option<i32>,
    },
    Users {
        #[serde(default)]
        user_type: UserFilter,
        #[serde(default = "first_page")]
        page: i64,
    },
}

pub async fn dispatch(ctx: &Context, interaction: Interaction) -> Reply {
    let Interaction {
        actor,
        channel_id,
        kind,
    } = interaction;
    let channel_id = channel_id.as_deref();
    let result = match kind {
        InteractionKind::Command(command) => handle_command(ctx, &actor, command).await,
        InteractionKind::Component { custom_id, values } => match custom_id.parse::<ComponentId>() {
            Ok(component) => handle_component(ctx, &actor, channel_id, component, values).await,
            Err(e) => Err(e),
        },
        InteractionKind::Modal { custom_id, fields } => match custom_id.parse::<ModalId>() {
            Ok(modal) => handle_modal(ctx, &actor, channel_id, modal, fields).await,
            Err(e) => Err(e),
        },
    };
    match result {
        Ok(reply) => reply,
        Err(e) => {
            if e.is_internal() {
                error!(actor = %actor, error = %e, "interaction failed");
            } else {
                debug!(actor = %actor, error = %e, "interaction rejected");
            }
            Reply::private(e.user_message())
        }
    }
}

fn require_channel(channel_id: Option<&str>) -> BotResult<String> {
    channel_id.map(str::to_string).ok_or_else(|| {
        BotError::InvalidInput("This action can only be used inside a submission channel".to_string())
    })
}

fn single_value(values: &[String]) -> BotResult<&str> {
    values
        .first()
        .map(String::as_str)
        .ok_or_else(|| BotError::InvalidInput("No option was selected".to_string()))
}

fn to_amount(amount: i64) -> BotResult<i32> {
    i32::try_from(amount)
        .map_err(|_| BotError::InvalidInput(format!("{amount} is not a valid amount of points")))
}

// Gateway side effects. Failures here never undo what has already been stored.

/// Sends `reply` to `channel_id`, logging instead of failing.
async fn notify(ctx: &Context, channel_id: &str, reply: &Reply) -> bool {
    match ctx.gateway.send_message(channel_id, reply).await {
        Ok(()) => true,
        Err(e) => {
            warn!(channel_id, error = %e, "failed to post message");
            false
        }
    }
}

async fn direct_message(ctx: &Context, user: &User, reply: &Reply) {
    if let Err(e) = ctx.gateway.send_direct_message(&user.discord_id, reply).await {
        warn!(user_id = user.id, error = %e, "failed to send direct message");
    }
}

/// Deletes a channel; one that is already gone counts as deleted.
async fn discard_channel(ctx: &Context, channel_id: &str, reason: &str) {
    match ctx.gateway.delete_channel(channel_id, reason).await {
        Ok(()) => debug!(channel_id, reason, "deleted channel"),
        Err(GatewayError::NotFound(_)) => debug!(channel_id, "channel already deleted"),
        Err(e) => warn!(channel_id, error = %e, "failed to delete channel"),
    }
}

async fn open_channel(ctx: &Context, name: &str, owner: &User) -> BotResult<String> {
    let channel_id = ctx
        .gateway
        .create_private_channel(name, &ctx.config.submission_category, &owner.discord_id)
        .await?;
    info!(channel_id = %channel_id, name, user_id = owner.id, "opened submission channel");
    Ok(channel_id)
}

fn controls(kind: SubmissionKind) -> NextStep {
    match kind {
        SubmissionKind::Earning => view::earning_controls(),
        SubmissionKind::Spending => view::spending_controls(),
    }
}

fn review_channel(config: &Config, kind: SubmissionKind) -> &str {
    match kind {
        SubmissionKind::Earning => &config.earning_review_channel_id,
        SubmissionKind::Spending => &config.spending_review_channel_id,
    }
}

fn approved_channel(config: &Config, kind: SubmissionKind) -> &str {
    match kind {
        SubmissionKind::Earning => &config.earning_approved_channel_id,
        SubmissionKind::Spending => &config.spending_approved_channel_id,
    }
}

// Commands

async fn handle_command(ctx: &Context, actor: &str, command: Command) -> BotResult<Reply> {
    match command {
        Command::EarningSubmission => start_earning(ctx, actor).await,
        Command::SpendingSubmission => start_spending(ctx, actor).await,
        Command::Balance { user } => balance(ctx, actor, user).await,
        Command::AdminTransaction {
            user,
            action,
            amount,
            reason,
        } => admin_transaction(ctx, actor, user, action, amount, reason).await,
        Command::AdminTransactionLog {
            target_user,
            admin_user,
            page,
        } => {
            let actor = actor.to_string();
            let filter = ctx
                .db(move |conn| {
                    ledger::require_admin(conn, &actor)?;
                    let target = target_user
                        .map(|id| ledger::get_or_create_user(conn, &id))
                        .transpose()?;
                    let admin = admin_user
                        .map(|id| ledger::get_or_create_user(conn, &id))
                        .transpose()?;
                    Ok(AdminLogFilter {
                        target: target.map(|u| u.id),
                        admin: admin.map(|u| u.id),
                    })
                })
                .await?;
            open_listing(ctx, PagedListing::AdminTransactionLog(filter), page).await
        }
        Command::Leaderboard { page } => {
            let mut reply = open_listing(ctx, PagedListing::Leaderboard, page).await?;
            reply.ephemeral = false;
            Ok(reply)
        }
        Command::TransactionLog { user, page } => {
            let actor = actor.to_string();
            let owner = ctx
                .db(move |conn| {
                    ledger::require_admin(conn, &actor)?;
                    ledger::get_or_create_user(conn, &user)
                })
                .await?;
            open_listing(ctx, PagedListing::TransactionLog { user_id: owner.id }, page).await
        }
        Command::Inspect {
            record_type,
            record_id,
        } => {
            let actor = actor.to_string();
            let inspection = ctx
                .db(move |conn| {
                    ledger::require_admin(conn, &actor)?;
                    record::inspect(conn, record_type, record_id)
                })
                .await?;
            let title = format!("Inspecting {record_type}");
            Ok(Reply::from_card(inspection.card(&title)).hidden())
        }
        Command::SetVisibility {
            visibility,
            user,
            user_id,
        } => {
            let visible = visibility == Visibility::Visible;
            let updated =
                update_user(ctx, actor, user, user_id, move |conn, target| {
                    ledger::set_visible(conn, target.id, visible)
                })
                .await?;
            let label = if visible { "visible" } else { "invisible" };
            Ok(Reply::private(format!(
                "Visibility updated! User #{} ({}) has been set to {label}",
                updated.id,
                view::mention(&updated.discord_id)
            )))
        }
        Command::SetRole {
            user_privs,
            user,
            user_id,
        } => {
            let is_admin = user_privs == Role::BotAdmin;
            let updated = update_user(ctx, actor, user, user_id, move |conn, target| {
                ledger::set_admin(conn, target.id, is_admin)
            })
            .await?;
            let label = if is_admin { "bot admin" } else { "user" };
            Ok(Reply::private(format!(
                "Privileges updated! User #{} ({}) has been set to {label}",
                updated.id,
                view::mention(&updated.discord_id)
            )))
        }
        Command::Users { user_type, page } => {
            let actor = actor.to_string();
            ctx.db(move |conn| ledger::require_admin(conn, &actor))
                .await?;
            open_listing(ctx, PagedListing::Users(user_type), page).await
        }
    }
}

async fn start_earning(ctx: &Context, actor: &str) -> BotResult<Reply> {
    let actor = actor.to_string();
    let (owner, id) = ctx
        .db(move |conn| {
            let owner = ledger::get_or_create_user(conn, &actor)?;
            let id = submission::reserve_id(conn, SubmissionKind::Earning)?;
            Ok((owner, id))
        })
        .await?;
    let channel_id = open_channel(ctx, &format!("earning-{id}"), &owner).await?;

    let channel = channel_id.clone();
    let created = ctx
        .db(move |conn| submission::create_earning(conn, id, &channel, owner.id))
        .await;
    if let Err(e) = created {
        discard_channel(ctx, &channel_id, "Submission could not be created").await;
        return Err(e);
    }
    notify(ctx, &channel_id, &view::points_prompt(None)).await;
    Ok(Reply::private(view::channel_mention(&channel_id)))
}

async fn start_spending(ctx: &Context, actor: &str) -> BotResult<Reply> {
    let actor = actor.to_string();
    let cost = ctx.config.spending_cost;
    let (owner, id) = ctx
        .db(move |conn| {
            let owner = ledger::get_or_create_user(conn, &actor)?;
            submission::check_spending_balance(&owner, cost)?;
            let id = submission::reserve_id(conn, SubmissionKind::Spending)?;
            Ok((owner, id))
        })
        .await?;
    let channel_id = open_channel(ctx, &format!("spending-{id}"), &owner).await?;

    let channel = channel_id.clone();
    let created = ctx
        .db(move |conn| submission::create_spending(conn, id, &channel, owner.id, cost))
        .await;
    if let Err(e) = created {
        discard_channel(ctx, &channel_id, "Submission could not be created").await;
        return Err(e);
    }
    notify(ctx, &channel_id, &view::ability_prompt()).await;
    Ok(Reply::private(view::channel_mention(&channel_id)))
}

async fn balance(ctx: &Context, actor: &str, user: Option<String>) -> BotResult<Reply> {
    let actor = actor.to_string();
    let (target, is_self) = ctx
        .db(move |conn| match user {
            Some(other) if other != actor => Ok((ledger::get_or_create_user(conn, &other)?, false)),
            _ => Ok((ledger::get_or_create_user(conn, &actor)?, true)),
        })
        .await?;
    let content = if is_self {
        format!("Your Judgement Point balance is: `{}`", target.balance)
    } else {
        format!(
            "{}'s Judgement Point balance is: `{}`",
            view::mention(&target.discord_id),
            target.balance
        )
    };
    Ok(Reply::public(content))
}

async fn admin_transaction(
    ctx: &Context,
    actor: &str,
    user: String,
    action: AdjustOp,
    amount: i64,
    reason: String,
) -> BotResult<Reply> {
    let actor = actor.to_string();
    let (transaction, target) = ctx
        .db(move |conn| {
            let admin = ledger::require_admin(conn, &actor)?;
            let amount = to_amount(amount)?;
            let target = ledger::get_or_create_user(conn, &user)?;
            ledger::admin_adjust_balance(conn, &admin, target.id, action, amount, &reason)
        })
        .await?;
    Ok(Reply::private(format!(
        "Admin Transaction #{} Performed, user {}'s balance has been {action} {amount} points, \
         balance is now {} points.",
        transaction.id,
        view::mention(&target.discord_id),
        target.balance
    )))
}

/// Resolves the target of a user-management command by external identity or numeric id, then
/// applies `update` to it. The actor must be an admin.
async fn update_user<F>(
    ctx: &Context,
    actor: &str,
    user: Option<String>,
    user_id: Option<i32>,
    update: F,
) -> BotResult<User>
where
    F: FnOnce(&mut SqliteConnection, &User) -> BotResult<User> + Send + 'static,
{
    let actor = actor.to_string();
    ctx.db(move |conn| {
        ledger::require_admin(conn, &actor)?;
        let target = match (user, user_id) {
            (Some(discord_id), _) => ledger::get_or_create_user(conn, &discord_id)?,
            (None, Some(id)) => ledger::find_user(conn, id)?,
            (None, None) => {
                return Err(BotError::InvalidInput(
                    "Either `user` or `user_id` must be provided".to_string(),
                ))
            }
        };
        update(conn, &target)
    })
    .await
}

// Listings

fn render_listing(
    conn: &mut SqliteConnection,
    listing: PagedListing,
    page: i64,
) -> BotResult<Card> {
    match listing {
        PagedListing::Leaderboard => Ok(view::leaderboard_card(&query::leaderboard(conn, page)?)),
        PagedListing::TransactionLog { user_id } => {
            let owner = ledger::find_user(conn, user_id)?;
            let rows = query::transaction_log(conn, user_id, page)?;
            Ok(view::transaction_log_card(&owner, &rows))
        }
        PagedListing::AdminTransactionLog(filter) => {
            let target = filter
                .target
                .map(|id| ledger::find_user(conn, id))
                .transpose()?;
            let admin = filter
                .admin
                .map(|id| ledger::find_user(conn, id))
                .transpose()?;
            let rows = query::admin_transaction_log(conn, filter, page)?;
            Ok(view::admin_transaction_log_card(
                filter,
                target.as_ref(),
                admin.as_ref(),
                &rows,
            ))
        }
        PagedListing::Users(filter) => {
            Ok(view::users_card(filter, &query::list_users(conn, filter, page)?))
        }
    }
}

/// Renders the first requested page and opens a session for the pager buttons.
async fn open_listing(ctx: &Context, listing: PagedListing, page: i64) -> BotResult<Reply> {
    let card = ctx
        .db(move |conn| render_listing(conn, listing, page))
        .await?;
    let session = ctx.sessions.open(listing, page);
    Ok(Reply::from_card(card)
        .with_next(view::pager(session))
        .hidden())
}

async fn turn_page(
    ctx: &Context,
    actor: &str,
    session_id: uuid::Uuid,
    step: i64,
) -> BotResult<Reply> {
    let session = ctx.sessions.get(session_id).ok_or_else(|| {
        BotError::InvalidInput("This listing has expired, please run the command again".to_string())
    })?;
    let listing = session.listing;
    let page = session.page + step;
    let actor = actor.to_string();
    let card = ctx
        .db(move |conn| {
            if listing.requires_admin() {
                ledger::require_admin(conn, &actor)?;
            }
            render_listing(conn, listing, page)
        })
        .await?;
    ctx.sessions.set_page(session_id, page);
    let reply = Reply::from_card(card).with_next(view::pager(session_id));
    Ok(if listing.requires_admin() {
        reply.hidden()
    } else {
        reply
    })
}

// Components

async fn handle_component(
    ctx: &Context,
    actor: &str,
    channel_id: Option<&str>,
    component: ComponentId,
    values: Vec<String>,
) -> BotResult<Reply> {
    match component {
        ComponentId::PreviousPage(session) => turn_page(ctx, actor, session, -1).await,
        ComponentId::NextPage(session) => turn_page(ctx, actor, session, 1).await,
        ComponentId::Approve(kind, id) => approve(ctx, actor, kind, id).await,
        ComponentId::Deny(kind, id) => {
            let actor = actor.to_string();
            ctx.db(move |conn| {
                let admin = ledger::get_or_create_user(conn, &actor)?;
                match kind {
                    SubmissionKind::Earning => {
                        review::check_earning_reviewable(conn, id, &admin).map(|_| ())
                    }
                    SubmissionKind::Spending => {
                        review::check_spending_reviewable(conn, id, &admin).map(|_| ())
                    }
                }
            })
            .await?;
            Ok(Reply::default().with_next(NextStep::Modal(view::deny_modal(kind, id))))
        }
        ComponentId::MakeChanges(kind, id) => make_changes(ctx, actor, kind, id).await,
        routed => {
            let channel = require_channel(channel_id)?;
            routed_component(ctx, actor, channel, routed, values).await
        }
    }
}

/// Components that act on the submission bound to the channel they were used in.
async fn routed_component(
    ctx: &Context,
    actor: &str,
    channel: String,
    component: ComponentId,
    values: Vec<String>,
) -> BotResult<Reply> {
    let actor = actor.to_string();
    match component {
        ComponentId::PointsSelect => {
            let points: i32 = single_value(&values)?.parse().map_err(|_| {
                BotError::InvalidInput("Points lodged must be a whole number".to_string())
            })?;
            let at = channel.clone();
            let update = ctx
                .db(move |conn| {
                    let owner = ledger::get_or_create_user(conn, &actor)?;
                    submission::set_points_lodged(conn, &at, &owner, points)
                })
                .await?;
            if let Some(Stage::Drafting(EarningStep::ActSummary)) = update.advance() {
                notify(ctx, &channel, &view::act_summary_prompt()).await;
            }
            Ok(Reply::private(format!(
                "Set Lodged Points to {points} for Submission"
            )))
        }
        ComponentId::OpenActSummary | ComponentId::EditActSummary => {
            let current = ctx
                .db(move |conn| submission::earning_by_channel(conn, &channel))
                .await?;
            Ok(Reply::default().with_next(NextStep::Modal(view::act_summary_modal(
                current.act_summary.as_deref(),
            ))))
        }
        ComponentId::AlignmentSelect => {
            let alignment = LocationAlignment::from_choice(single_value(&values)?)
                .ok_or_else(|| BotError::InvalidInput("Unknown location alignment".to_string()))?;
            let at = channel.clone();
            let (update, owner) = ctx
                .db(move |conn| {
                    let owner = ledger::get_or_create_user(conn, &actor)?;
                    let update = submission::set_location_alignment(conn, &at, &owner, alignment)?;
                    Ok((update, owner))
                })
                .await?;
            if let Some(Stage::ReadyToSubmit) = update.advance() {
                let card = view::earning_card(&update.submission, "Ready to Submit!", &owner);
                let ready = Reply::from_card(card).with_next(view::earning_controls());
                notify(ctx, &channel, &ready).await;
            }
            Ok(Reply::private(format!(
                "Set Location Alignment to {} for Submission",
                alignment.label()
            )))
        }
        ComponentId::OpenAbilityForm => {
            ctx.db(move |conn| submission::spending_by_channel(conn, &channel))
                .await?;
            Ok(Reply::default().with_next(NextStep::Modal(view::ability_modal(None))))
        }
        ComponentId::EditAbility => {
            let current = ctx
                .db(move |conn| submission::spending_by_channel(conn, &channel))
                .await?;
            Ok(Reply::default().with_next(NextStep::Modal(view::ability_modal(Some(&current)))))
        }
        ComponentId::Compliance(compliant) => {
            let at = channel.clone();
            let (update, owner) = ctx
                .db(move |conn| {
                    let owner = ledger::get_or_create_user(conn, &actor)?;
                    let update = submission::set_lore_compliance(conn, &at, &owner, compliant)?;
                    Ok((update, owner))
                })
                .await?;
            let card = Card::default()
                .field("Set Lore/Rule Compliant to:", if compliant { "Yes" } else { "No" });
            if let Some(Stage::ReadyToSubmit) = update.advance() {
                let ready = Reply::public("Ready to Submit!")
                    .with_card(view::spending_card(&update.submission, "Ready to Submit!", &owner))
                    .with_next(view::spending_controls());
                notify(ctx, &channel, &ready).await;
            }
            Ok(Reply::from_card(card).hidden())
        }
        ComponentId::Review(kind) => {
            let inspection = ctx
                .db(move |conn| inspect_channel(conn, kind, &channel))
                .await?;
            Ok(Reply::from_card(inspection.card("Reviewing Submission"))
                .with_next(controls(kind))
                .hidden())
        }
        ComponentId::EditPoints => {
            let current = ctx
                .db(move |conn| submission::earning_by_channel(conn, &channel))
                .await?;
            Ok(view::points_prompt(current.points_lodged))
        }
        ComponentId::EditAlignment => {
            let current = ctx
                .db(move |conn| submission::earning_by_channel(conn, &channel))
                .await?;
            Ok(view::alignment_prompt(current.location_alignment))
        }
        ComponentId::EditCompliance => {
            ctx.db(move |conn| submission::spending_by_channel(conn, &channel))
                .await?;
            Ok(view::compliance_prompt())
        }
        ComponentId::Submit(kind) => submit(ctx, actor, kind, channel).await,
        other => Err(BotError::InvalidInput(format!(
            "Unknown component `{other}`"
        ))),
    }
}

fn inspect_channel(
    conn: &mut SqliteConnection,
    kind: SubmissionKind,
    channel_id: &str,
) -> BotResult<Inspection> {
    let id = match kind {
        SubmissionKind::Earning => submission::earning_by_channel(conn, channel_id)?.id,
        SubmissionKind::Spending => submission::spending_by_channel(conn, channel_id)?.id,
    };
    record::inspect(conn, kind.record_kind(), id)
}

async fn submit(
    ctx: &Context,
    actor: String,
    kind: SubmissionKind,
    channel: String,
) -> BotResult<Reply> {
    let at = channel.clone();
    let inspection = ctx
        .db(move |conn| {
            let owner = ledger::get_or_create_user(conn, &actor)?;
            let id = match kind {
                SubmissionKind::Earning => submission::submit_earning(conn, &at, &owner)?.id,
                SubmissionKind::Spending => submission::submit_spending(conn, &at, &owner)?.id,
            };
            record::inspect(conn, kind.record_kind(), id)
        })
        .await?;
    let id = inspection.record.id();

    let receipt = Reply::from_card(inspection.card(&format!("Submitted! {kind} ID:")));
    direct_message(ctx, &inspection.owner, &receipt).await;

    let for_review = Reply::from_card(inspection.card(&format!("New {kind} -")))
        .with_next(view::review_controls(kind, id));
    let mut content = "Submitted!".to_string();
    if !notify(ctx, review_channel(&ctx.config, kind), &for_review).await {
        content.push_str(&format!("\nError: Unable to find {kind}s Review Channel"));
    }
    discard_channel(ctx, &channel, "Submission Completed").await;
    Ok(Reply::private(content))
}

async fn approve(ctx: &Context, actor: &str, kind: SubmissionKind, id: i32) -> BotResult<Reply> {
    let actor = actor.to_string();
    let inspection = ctx
        .db(move |conn| {
            let admin = ledger::get_or_create_user(conn, &actor)?;
            match kind {
                SubmissionKind::Earning => {
                    review::approve_earning(conn, id, &admin)?;
                }
                SubmissionKind::Spending => {
                    review::approve_spending(conn, id, &admin)?;
                }
            }
            record::inspect(conn, kind.record_kind(), id)
        })
        .await?;

    let notice = Reply::from_card(inspection.card(&format!("Approved! {kind} ID:")));
    direct_message(ctx, &inspection.owner, &notice).await;
    if let Some(channel_id) = inspection.record.channel_id() {
        discard_channel(ctx, channel_id, "Submission Approved").await;
    }

    let mut content = format!("Approved {kind} #{id}");
    let canon = Reply::from_card(inspection.card(&format!("Canon {kind} - ID:")));
    if !notify(ctx, approved_channel(&ctx.config, kind), &canon).await {
        content.push_str(&format!("\nError: Unable to find {kind}s Approved Channel"));
    }
    Ok(Reply::private(content))
}

async fn make_changes(
    ctx: &Context,
    actor: &str,
    kind: SubmissionKind,
    id: i32,
) -> BotResult<Reply> {
    let actor = actor.to_string();
    let owner = ctx
        .db(move |conn| {
            let actor = ledger::get_or_create_user(conn, &actor)?;
            match kind {
                SubmissionKind::Earning => {
                    submission::ensure_revisable(&submission::earning_by_id(conn, id)?, &actor)?
                }
                SubmissionKind::Spending => {
                    submission::ensure_revisable(&submission::spending_by_id(conn, id)?, &actor)?
                }
            }
            Ok(actor)
        })
        .await?;

    let channel_id = open_channel(ctx, &format!("{}-{id}-edits", kind.prefix()), &owner).await?;
    let channel = channel_id.clone();
    let reopened = ctx
        .db(move |conn| {
            match kind {
                SubmissionKind::Earning => {
                    submission::make_earning_edits(conn, id, &owner, &channel)?;
                }
                SubmissionKind::Spending => {
                    submission::make_spending_edits(conn, id, &owner, &channel)?;
                }
            }
            record::inspect(conn, kind.record_kind(), id)
        })
        .await;
    let inspection = match reopened {
        Ok(inspection) => inspection,
        Err(e) => {
            discard_channel(ctx, &channel_id, "Submission could not be reopened").await;
            return Err(e);
        }
    };

    let editing = Reply::from_card(inspection.card(&format!("Making Changes to {kind}")))
        .with_next(controls(kind));
    notify(ctx, &channel_id, &editing).await;
    Ok(Reply::private(view::channel_mention(&channel_id)))
}

// Modals

async fn handle_modal(
    ctx: &Context,
    actor: &str,
    channel_id: Option<&str>,
    modal: ModalId,
    mut fields: HashMap<String, String>,
) -> BotResult<Reply> {
    let actor = actor.to_string();
    match modal {
        ModalId::ActSummary => {
            let channel = require_channel(channel_id)?;
            let summary = fields.remove(view::ACT_SUMMARY_KEY).unwrap_or_default();
            let at = channel.clone();
            let update = ctx
                .db(move |conn| {
                    let owner = ledger::get_or_create_user(conn, &actor)?;
                    submission::set_act_summary(conn, &at, &owner, &summary)
                })
                .await?;
            if let Some(Stage::Drafting(EarningStep::LocationAlignment)) = update.advance() {
                notify(ctx, &channel, &view::alignment_prompt(None)).await;
            }
            let card = Card::default().field(
                "Set Act Summary to:",
                update.submission.act_summary.unwrap_or_default(),
            );
            Ok(Reply::from_card(card).hidden())
        }
        ModalId::AbilityInfo => {
            let channel = require_channel(channel_id)?;
            let mut take = |field: AbilityField| fields.remove(field.key());
            let patch = AbilityInfo {
                ability_requested: take(AbilityField::Requested),
                ability_description: take(AbilityField::Description),
                ability_limitations: take(AbilityField::Limitations),
                cost_weakness: take(AbilityField::CostWeakness),
                cost_weakness_description: take(AbilityField::CostWeaknessDescription),
            }
            .normalized();
            let at = channel.clone();
            let applied = patch.clone();
            let (before, update) = ctx
                .db(move |conn| {
                    let owner = ledger::get_or_create_user(conn, &actor)?;
                    let before = submission::spending_by_channel(conn, &at)?;
                    let update = submission::set_ability_info(conn, &at, &owner, applied)?;
                    Ok((before, update))
                })
                .await?;
            if let Some(Stage::Drafting(SpendingStep::LoreCompliance)) = update.advance() {
                notify(ctx, &channel, &view::compliance_prompt()).await;
            }
            let card = view::ability_changes_card(&patch, &before, &update.submission);
            Ok(Reply::from_card(card).hidden())
        }
        ModalId::DenyReason(kind, id) => {
            let reason = fields.remove(view::DENY_REASON_KEY).unwrap_or_default();
            let stored_reason = reason.clone();
            let inspection = ctx
                .db(move |conn| {
                    let admin = ledger::get_or_create_user(conn, &actor)?;
                    match kind {
                        SubmissionKind::Earning => {
                            review::deny_earning(conn, id, &admin, &stored_reason)?;
                        }
                        SubmissionKind::Spending => {
                            review::deny_spending(conn, id, &admin, &stored_reason)?;
                        }
                    }
                    record::inspect(conn, kind.record_kind(), id)
                })
                .await?;
            let notice = Reply::from_card(inspection.card(&format!("Denied! {kind} ID:")))
                .with_next(view::make_changes_control(kind, id));
            direct_message(ctx, &inspection.owner, &notice).await;
            Ok(Reply::private(format!(
                "Denied {kind} #{id}\n**Reason:**\n{}",
                reason.trim()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::{Call, RecordingGateway};
    use crate::test_support;
    use serde_json::json;
    use tempfile::TempDir;

    struct Harness {
        ctx: Context,
        gateway: Arc<RecordingGateway>,
        _dir: TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().expect("temp dir");
        let url = dir.path().join("bot.db").to_string_lossy().into_owned();
        let pool = crate::build_pool(&url, 4).expect("pool builds");
        let gateway = Arc::new(RecordingGateway::default());
        let config = Config {
            database_url: url,
            bind_addr: "127.0.0.1:0".parse().expect("valid address"),
            gateway_url: "http://relay.test".to_string(),
            earning_review_channel_id: "review-earning".to_string(),
            spending_review_channel_id: "review-spending".to_string(),
            earning_approved_channel_id: "canon-earning".to_string(),
            spending_approved_channel_id: "canon-spending".to_string(),
            spending_cost: 200,
            submission_category: "submissions".to_string(),
        };
        Harness {
            ctx: Context::new(pool, gateway.clone(), config),
            gateway,
            _dir: dir,
        }
    }

    impl Harness {
        async fn command(&self, actor: &str, command: serde_json::Value) -> Reply {
            let interaction: Interaction = serde_json::from_value(json!({
                "actor": actor,
                "kind": { "command": command },
            }))
            .expect("valid command");
            dispatch(&self.ctx, interaction).await
        }

        async fn click(&self, actor: &str, channel: &str, custom_id: &str, values: &[&str]) -> Reply {
            let interaction = Interaction {
                actor: actor.to_string(),
                channel_id: Some(channel.to_string()),
                kind: InteractionKind::Component {
                    custom_id: custom_id.to_string(),
                    values: values.iter().map(|v| v.to_string()).collect(),
                },
            };
            dispatch(&self.ctx, interaction).await
        }

        async fn submit_form(
            &self,
            actor: &str,
            channel: &str,
            custom_id: &str,
            fields: &[(&str, &str)],
        ) -> Reply {
            let interaction = Interaction {
                actor: actor.to_string(),
                channel_id: Some(channel.to_string()),
                kind: InteractionKind::Modal {
                    custom_id: custom_id.to_string(),
                    fields: fields
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                },
            };
            dispatch(&self.ctx, interaction).await
        }

        async fn make_admin(&self, discord_id: &str) {
            let discord_id = discord_id.to_string();
            self.ctx
                .db(move |conn| Ok(test_support::admin(conn, &discord_id)))
                .await
                .expect("admin created");
        }

        async fn seed_balance(&self, discord_id: &str, balance: i32) {
            let discord_id = discord_id.to_string();
            self.ctx
                .db(move |conn| Ok(test_support::user_with_balance(conn, &discord_id, balance)))
                .await
                .expect("balance seeded");
        }

        /// Runs an earning submission for `actor` up to the point of submission. Returns the
        /// routing channel.
        async fn ready_earning(&self, actor: &str, points: &str, alignment: &str) -> String {
            let reply = self.command(actor, json!({ "name": "earning_submission" })).await;
            let channel = reply
                .content
                .expect("channel mention")
                .trim_start_matches("<#")
                .trim_end_matches('>')
                .to_string();
            self.click(actor, &channel, "earning:points", &[points]).await;
            self.submit_form(
                actor,
                &channel,
                "earning:act_summary_form",
                &[("act_summary", "Held the bridge")],
            )
            .await;
            self.click(actor, &channel, "earning:alignment", &[alignment]).await;
            channel
        }
    }

    fn content(reply: &Reply) -> &str {
        reply.content.as_deref().unwrap_or_default()
    }

    fn pager_session(reply: &Reply) -> String {
        match &reply.next {
            Some(NextStep::Buttons { buttons }) => buttons[1]
                .custom_id
                .trim_start_matches("page:next:")
                .to_string(),
            other => panic!("expected pager buttons, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_earning_submission_end_to_end() {
        let h = harness();
        let channel = h.ready_earning("u1", "20", "1").await;
        assert_eq!(channel, "1000");
        assert!(matches!(
            h.gateway.calls().first(),
            Some(Call::CreateChannel { name, category, owner, .. })
                if name == "earning-1" && category == "submissions" && owner == "u1"
        ));
        // points prompt, act summary prompt, alignment prompt, ready card
        let prompts = h.gateway.messages_to("1000");
        assert_eq!(prompts.len(), 4);
        assert_eq!(
            prompts[3].card.as_ref().map(|c| c.title.as_str()),
            Some("Ready to Submit! #1")
        );

        let reply = h.click("u1", "1000", "earning:submit", &[]).await;
        assert_eq!(content(&reply), "Submitted!");
        assert_eq!(h.gateway.deleted_channels(), vec!["1000"]);
        assert_eq!(h.gateway.direct_messages_to("u1").len(), 1);
        let review = h.gateway.messages_to("review-earning");
        assert_eq!(review.len(), 1);
        match &review[0].next {
            Some(NextStep::Buttons { buttons }) => {
                assert!(buttons.iter().any(|b| b.custom_id == "earning:approve:1"))
            }
            other => panic!("expected review buttons, got {other:?}"),
        }

        let reply = h.click("u1", "review-earning", "earning:approve:1", &[]).await;
        assert_eq!(content(&reply), "You are not authorized to perform this action");

        h.make_admin("boss").await;
        let reply = h.click("boss", "review-earning", "earning:approve:1", &[]).await;
        assert_eq!(content(&reply), "Approved Earning Submission #1");
        assert_eq!(h.gateway.messages_to("canon-earning").len(), 1);
        assert_eq!(h.gateway.direct_messages_to("u1").len(), 2);

        let reply = h.command("u1", json!({ "name": "balance" })).await;
        assert_eq!(content(&reply), "Your Judgement Point balance is: `40`");

        let reply = h.click("boss", "review-earning", "earning:approve:1", &[]).await;
        assert_eq!(
            content(&reply),
            "Earning Submission #1 has already been approved!"
        );
        let reply = h.command("u1", json!({ "name": "balance" })).await;
        assert_eq!(content(&reply), "Your Judgement Point balance is: `40`");
    }

    #[tokio::test]
    async fn test_editing_a_field_does_not_replay_the_wizard() {
        let h = harness();
        let channel = h.ready_earning("u1", "10", "2").await;
        let before = h.gateway.messages_to(&channel).len();

        let reply = h.click("u1", &channel, "earning:points", &["30"]).await;
        assert_eq!(content(&reply), "Set Lodged Points to 30 for Submission");
        h.submit_form(
            "u1",
            &channel,
            "earning:act_summary_form",
            &[("act_summary", "Held the bridge twice")],
        )
        .await;
        assert_eq!(h.gateway.messages_to(&channel).len(), before);

        let reply = h.click("u1", &channel, "earning:review", &[]).await;
        let card = reply.card.expect("review card");
        assert_eq!(card.field_value("Points Lodged"), Some("30 Points"));
        assert_eq!(card.field_value("Act Summary"), Some("Held the bridge twice"));
    }

    #[tokio::test]
    async fn test_only_the_owner_can_fill_the_form() {
        let h = harness();
        let reply = h.command("u1", json!({ "name": "earning_submission" })).await;
        assert_eq!(content(&reply), "<#1000>");
        let reply = h.click("intruder", "1000", "earning:points", &["10"]).await;
        assert_eq!(
            content(&reply),
            "Only the owner of Earning Submission #1 can change it"
        );
        assert_eq!(h.gateway.messages_to("1000").len(), 1);
    }

    #[tokio::test]
    async fn test_denial_and_make_changes() {
        let h = harness();
        h.make_admin("boss").await;
        let channel = h.ready_earning("u1", "10", "0").await;
        h.click("u1", &channel, "earning:submit", &[]).await;

        let reply = h.click("boss", "review-earning", "earning:deny:1", &[]).await;
        match reply.next {
            Some(NextStep::Modal(modal)) => assert_eq!(modal.custom_id, "earning:deny_reason:1"),
            other => panic!("expected the denial form, got {other:?}"),
        }
        let reply = h
            .submit_form(
                "boss",
                "review-earning",
                "earning:deny_reason:1",
                &[("reason", "Needs a witness")],
            )
            .await;
        assert_eq!(
            content(&reply),
            "Denied Earning Submission #1\n**Reason:**\nNeeds a witness"
        );
        let notices = h.gateway.direct_messages_to("u1");
        let denial = notices.last().expect("denial notice");
        assert_eq!(
            denial.card.as_ref().and_then(|c| c.field_value("Denial Reason")),
            Some("Needs a witness")
        );

        let reply = h.click("u1", "dm", "earning:make_changes:1", &[]).await;
        assert_eq!(content(&reply), "<#1001>");
        assert!(h.gateway.calls().iter().any(|call| matches!(
            call,
            Call::CreateChannel { name, .. } if name == "earning-1-edits"
        )));
        let editing = h.gateway.messages_to("1001");
        assert_eq!(editing.len(), 1);
        let card = editing[0].card.as_ref().expect("editing card");
        assert_eq!(card.field_value("Act Summary"), Some("Held the bridge"));
        assert_eq!(card.field_value("Denial Reason"), None);

        let reply = h.click("u1", "dm", "earning:make_changes:1", &[]).await;
        assert_eq!(content(&reply), "Already Making Changes: <#1001>");

        let reply = h.click("u1", "1001", "earning:submit", &[]).await;
        assert_eq!(content(&reply), "Submitted!");
        let reply = h.click("boss", "review-earning", "earning:approve:1", &[]).await;
        assert_eq!(content(&reply), "Approved Earning Submission #1");
        let reply = h.click("u1", "dm", "earning:make_changes:1", &[]).await;
        assert_eq!(
            content(&reply),
            "Earning Submission #1 has been approved, no changes are necessary!"
        );
    }

    #[tokio::test]
    async fn test_spending_requires_balance() {
        let h = harness();
        h.seed_balance("poor", 199).await;
        let reply = h.command("poor", json!({ "name": "spending_submission" })).await;
        assert!(content(&reply).starts_with("You don't have enough Judgement Points"));
        assert!(h.gateway.calls().is_empty());

        h.seed_balance("rich", 200).await;
        let reply = h.command("rich", json!({ "name": "spending_submission" })).await;
        assert_eq!(content(&reply), "<#1000>");
        let prompt = h.gateway.messages_to("1000");
        assert_eq!(
            content(&prompt[0]),
            "Click the button below to enter your Ability information"
        );

        let reply = h
            .submit_form(
                "rich",
                "1000",
                "spending:ability_form",
                &[
                    ("ability_requested", "Echo"),
                    ("ability_description", "Repeat the last spell"),
                    ("ability_limitations", "Once per day"),
                    ("cost_weakness", "Mute"),
                    ("cost_weakness_description", "Cannot speak for an hour"),
                ],
            )
            .await;
        let card = reply.card.expect("change summary");
        assert_eq!(card.field_value("Set Ability Requested to:"), Some("Echo"));
        let prompts = h.gateway.messages_to("1000");
        assert_eq!(content(&prompts[1]), "Is your Ability Lore/Rule Compliant?");

        h.click("rich", "1000", "spending:compliance:yes", &[]).await;
        let reply = h.click("rich", "1000", "spending:submit", &[]).await;
        assert_eq!(content(&reply), "Submitted!");

        h.make_admin("boss").await;
        let reply = h.click("boss", "review-spending", "spending:approve:1", &[]).await;
        assert_eq!(content(&reply), "Approved Spending Submission #1");
        let reply = h
            .command("boss", json!({ "name": "balance", "user": "rich" }))
            .await;
        assert_eq!(content(&reply), "<@rich>'s Judgement Point balance is: `0`");
    }

    #[tokio::test]
    async fn test_missing_approved_channel_is_reported() {
        let h = harness();
        h.make_admin("boss").await;
        let channel = h.ready_earning("u1", "10", "2").await;
        h.click("u1", &channel, "earning:submit", &[]).await;
        h.gateway.mark_missing("canon-earning");

        let reply = h.click("boss", "review-earning", "earning:approve:1", &[]).await;
        assert_eq!(
            content(&reply),
            "Approved Earning Submission #1\nError: Unable to find Earning Submissions Approved Channel"
        );
        let reply = h.command("u1", json!({ "name": "balance" })).await;
        assert_eq!(content(&reply), "Your Judgement Point balance is: `10`");
    }

    #[tokio::test]
    async fn test_leaderboard_pages() {
        let h = harness();
        for n in 0..12 {
            h.seed_balance(&format!("player-{n}"), n * 5).await;
        }
        let reply = h.command("anyone", json!({ "name": "leaderboard" })).await;
        assert!(!reply.ephemeral);
        let card = reply.card.as_ref().expect("leaderboard card");
        assert_eq!(card.title, "Leaderboard - Page 1");
        let session = pager_session(&reply);

        let next = format!("page:next:{session}");
        let reply = h.click("anyone", "lobby", &next, &[]).await;
        assert_eq!(
            reply.card.as_ref().map(|c| c.title.as_str()),
            Some("Leaderboard - Page 2")
        );
        let reply = h.click("anyone", "lobby", &next, &[]).await;
        assert_eq!(
            content(&reply),
            "Invalid Page: `3`. Pages range from `1` to `2`"
        );
        let previous = format!("page:previous:{session}");
        let reply = h.click("anyone", "lobby", &previous, &[]).await;
        assert_eq!(
            reply.card.as_ref().map(|c| c.title.as_str()),
            Some("Leaderboard - Page 1")
        );

        let reply = h
            .command("anyone", json!({ "name": "leaderboard", "page": 0 }))
            .await;
        assert_eq!(
            content(&reply),
            "Invalid Page: `0`. Pages range from `1` to `2`"
        );
    }

    #[tokio::test]
    async fn test_admin_commands_reject_non_admins() {
        let h = harness();
        let commands = [
            json!({ "name": "admin_transaction", "user": "x", "action": "+", "amount": 5, "reason": "r" }),
            json!({ "name": "admin_transaction_log" }),
            json!({ "name": "transaction_log", "user": "x" }),
            json!({ "name": "inspect", "record_type": "Admin Transaction", "record_id": 1 }),
            json!({ "name": "set_visibility", "visibility": "invisible", "user": "x" }),
            json!({ "name": "set_user_privs", "user_privs": "bot admin", "user": "pleb" }),
            json!({ "name": "users", "user_type": "all" }),
        ];
        for command in commands {
            let reply = h.command("pleb", command).await;
            assert_eq!(content(&reply), "You are not authorized to perform this action");
            assert!(reply.ephemeral);
        }
        let reply = h.command("pleb", json!({ "name": "balance" })).await;
        assert_eq!(content(&reply), "Your Judgement Point balance is: `0`");
    }

    #[tokio::test]
    async fn test_admin_management_commands() {
        let h = harness();
        h.make_admin("boss").await;
        let reply = h
            .command(
                "boss",
                json!({ "name": "admin_transaction", "user": "u1", "action": "=", "amount": 75, "reason": "opening" }),
            )
            .await;
        assert_eq!(
            content(&reply),
            "Admin Transaction #1 Performed, user <@u1>'s balance has been set to 75 points, balance is now 75 points."
        );

        let reply = h
            .command("boss", json!({ "name": "set_visibility", "visibility": "invisible", "user": "u1" }))
            .await;
        assert!(content(&reply).ends_with("has been set to invisible"));
        let reply = h
            .command("boss", json!({ "name": "set_role", "user_privs": "bot admin", "user_id": 404 }))
            .await;
        assert_eq!(content(&reply), "No user exists with User ID #404");
        let reply = h.command("boss", json!({ "name": "set_role", "user_privs": "user" })).await;
        assert_eq!(content(&reply), "Either `user` or `user_id` must be provided");

        let reply = h
            .command("boss", json!({ "name": "inspect", "record_type": "admin_transaction", "record_id": 1 }))
            .await;
        let card = reply.card.expect("inspection card");
        assert_eq!(card.title, "Inspecting Admin Transaction #1");
        assert_eq!(card.field_value("Balance Changes"), Some("+75"));

        let reply = h
            .command("boss", json!({ "name": "admin_transaction_log", "target_user": "u1" }))
            .await;
        let card = reply.card.expect("log card");
        assert_eq!(card.field_value("Target User"), Some("<@u1>"));

        let reply = h
            .command("boss", json!({ "name": "users", "user_type": "bot admin" }))
            .await;
        assert_eq!(
            reply.card.as_ref().and_then(|c| c.field_value("User Type")),
            Some("Bot Admins")
        );
    }

    #[tokio::test]
    async fn test_unknown_components_and_missing_channels() {
        let h = harness();
        let reply = h.click("u1", "1", "lottery:spin", &[]).await;
        assert_eq!(content(&reply), "Unknown component `lottery:spin`");
        let reply = h.click("u1", "nowhere", "earning:points", &["10"]).await;
        assert_eq!(
            content(&reply),
            "This channel is not attached to an open submission"
        );
    }
}
