//! Structured replies handed back to the chat gateway: text, an optional card, and the control
//! the user should interact with next.
//!
//! Controls carry a [`ComponentId`] or [`ModalId`] that encodes everything the handler needs to
//! act on them, such as the submission id or the pagination session. Nothing is ever recovered
//! from the text of a previously rendered card.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BotError;
use crate::model::{
    AdminTransaction, EarningSubmission, LocationAlignment, SpendingSubmission,
    TransactionLogEntry, User,
};
use crate::query::{AdminLogFilter, AdminLogRow, Listing, UserFilter};
use crate::record::SubmissionKind;
use crate::submission::{AbilityField, AbilityInfo};

pub const POINT_CHOICES: [i32; 3] = [10, 20, 30];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Only the actor can see an ephemeral reply.
    pub ephemeral: bool,
    pub content: Option<String>,
    pub card: Option<Card>,
    pub next: Option<NextStep>,
}

impl Reply {
    pub fn private(content: impl Into<String>) -> Self {
        Reply {
            ephemeral: true,
            content: Some(content.into()),
            ..Reply::default()
        }
    }

    pub fn public(content: impl Into<String>) -> Self {
        Reply {
            ephemeral: false,
            content: Some(content.into()),
            ..Reply::default()
        }
    }

    pub fn from_card(card: Card) -> Self {
        Reply {
            card: Some(card),
            ..Reply::default()
        }
    }

    pub fn with_card(mut self, card: Card) -> Self {
        self.card = Some(card);
        self
    }

    pub fn with_next(mut self, next: NextStep) -> Self {
        self.next = Some(next);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.ephemeral = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub title: String,
    pub author: Option<String>,
    pub fields: Vec<CardField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl Card {
    pub fn new(title: impl Into<String>) -> Self {
        Card {
            title: title.into(),
            ..Card::default()
        }
    }

    pub fn author(mut self, user: &User) -> Self {
        self.author = Some(mention(&user.discord_id));
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(CardField {
            name: name.into(),
            value: value.into(),
            inline: false,
        });
        self
    }

    pub fn inline_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(CardField {
            name: name.into(),
            value: value.into(),
            inline: true,
        });
        self
    }

    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NextStep {
    Select {
        custom_id: String,
        placeholder: String,
        options: Vec<SelectOption>,
    },
    Buttons {
        buttons: Vec<Button>,
    },
    Modal(Modal),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Secondary,
    Success,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub custom_id: String,
    pub label: String,
    pub style: ButtonStyle,
}

fn button(id: ComponentId, label: &str, style: ButtonStyle) -> Button {
    Button {
        custom_id: id.to_string(),
        label: label.to_string(),
        style,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modal {
    pub custom_id: String,
    pub title: String,
    pub inputs: Vec<TextInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextInput {
    pub key: String,
    pub label: String,
    pub multiline: bool,
    pub required: bool,
    pub value: Option<String>,
    pub placeholder: Option<String>,
}

/// Identifies a button or select menu and the state it acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentId {
    PointsSelect,
    OpenActSummary,
    AlignmentSelect,
    OpenAbilityForm,
    Compliance(bool),
    Review(SubmissionKind),
    EditPoints,
    EditActSummary,
    EditAlignment,
    EditAbility,
    EditCompliance,
    Submit(SubmissionKind),
    Approve(SubmissionKind, i32),
    Deny(SubmissionKind, i32),
    MakeChanges(SubmissionKind, i32),
    PreviousPage(Uuid),
    NextPage(Uuid),
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentId::PointsSelect => f.write_str("earning:points"),
            ComponentId::OpenActSummary => f.write_str("earning:act_summary"),
            ComponentId::AlignmentSelect => f.write_str("earning:alignment"),
            ComponentId::OpenAbilityForm => f.write_str("spending:ability_info"),
            ComponentId::Compliance(true) => f.write_str("spending:compliance:yes"),
            ComponentId::Compliance(false) => f.write_str("spending:compliance:no"),
            ComponentId::Review(kind) => write!(f, "{}:review", kind.prefix()),
            ComponentId::EditPoints => f.write_str("earning:edit_points"),
            ComponentId::EditActSummary => f.write_str("earning:edit_act_summary"),
            ComponentId::EditAlignment => f.write_str("earning:edit_alignment"),
            ComponentId::EditAbility => f.write_str("spending:edit"),
            ComponentId::EditCompliance => f.write_str("spending:edit_compliance"),
            ComponentId::Submit(kind) => write!(f, "{}:submit", kind.prefix()),
            ComponentId::Approve(kind, id) => write!(f, "{}:approve:{id}", kind.prefix()),
            ComponentId::Deny(kind, id) => write!(f, "{}:deny:{id}", kind.prefix()),
            ComponentId::MakeChanges(kind, id) => write!(f, "{}:make_changes:{id}", kind.prefix()),
            ComponentId::PreviousPage(session) => write!(f, "page:previous:{session}"),
            ComponentId::NextPage(session) => write!(f, "page:next:{session}"),
        }
    }
}

impl FromStr for ComponentId {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let parsed = match parts.as_slice() {
            ["earning", "points"] => Some(ComponentId::PointsSelect),
            ["earning", "act_summary"] => Some(ComponentId::OpenActSummary),
            ["earning", "alignment"] => Some(ComponentId::AlignmentSelect),
            ["earning", "edit_points"] => Some(ComponentId::EditPoints),
            ["earning", "edit_act_summary"] => Some(ComponentId::EditActSummary),
            ["earning", "edit_alignment"] => Some(ComponentId::EditAlignment),
            ["spending", "ability_info"] => Some(ComponentId::OpenAbilityForm),
            ["spending", "edit"] => Some(ComponentId::EditAbility),
            ["spending", "edit_compliance"] => Some(ComponentId::EditCompliance),
            ["spending", "compliance", "yes"] => Some(ComponentId::Compliance(true)),
            ["spending", "compliance", "no"] => Some(ComponentId::Compliance(false)),
            ["page", "previous", session] => {
                Uuid::parse_str(session).ok().map(ComponentId::PreviousPage)
            }
            ["page", "next", session] => Uuid::parse_str(session).ok().map(ComponentId::NextPage),
            [prefix, "review"] => SubmissionKind::from_prefix(prefix).map(ComponentId::Review),
            [prefix, "submit"] => SubmissionKind::from_prefix(prefix).map(ComponentId::Submit),
            [prefix, action, raw_id] => {
                match (SubmissionKind::from_prefix(prefix), raw_id.parse::<i32>()) {
                    (Some(kind), Ok(id)) => match *action {
                        "approve" => Some(ComponentId::Approve(kind, id)),
                        "deny" => Some(ComponentId::Deny(kind, id)),
                        "make_changes" => Some(ComponentId::MakeChanges(kind, id)),
                        _ => None,
                    },
                    _ => None,
                }
            }
            _ => None,
        };
        parsed.ok_or_else(|| BotError::InvalidInput(format!("Unknown component `{s}`")))
    }
}

/// Identifies a submitted modal form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalId {
    ActSummary,
    AbilityInfo,
    DenyReason(SubmissionKind, i32),
}

pub const ACT_SUMMARY_KEY: &str = "act_summary";
pub const DENY_REASON_KEY: &str = "reason";

impl fmt::Display for ModalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModalId::ActSummary => f.write_str("earning:act_summary_form"),
            ModalId::AbilityInfo => f.write_str("spending:ability_form"),
            ModalId::DenyReason(kind, id) => write!(f, "{}:deny_reason:{id}", kind.prefix()),
        }
    }
}

impl FromStr for ModalId {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let parsed = match parts.as_slice() {
            ["earning", "act_summary_form"] => Some(ModalId::ActSummary),
            ["spending", "ability_form"] => Some(ModalId::AbilityInfo),
            [prefix, "deny_reason", raw_id] => SubmissionKind::from_prefix(prefix)
                .zip(raw_id.parse::<i32>().ok())
                .map(|(kind, id)| ModalId::DenyReason(kind, id)),
            _ => None,
        };
        parsed.ok_or_else(|| BotError::InvalidInput(format!("Unknown form `{s}`")))
    }
}

pub fn mention(discord_id: &str) -> String {
    format!("<@{discord_id}>")
}

pub fn channel_mention(channel_id: &str) -> String {
    format!("<#{channel_id}>")
}

fn timestamp(at: &NaiveDateTime) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

fn signed(points: i32) -> String {
    if points > 0 {
        format!("+{points}")
    } else {
        points.to_string()
    }
}

fn or_unset(value: Option<&str>) -> String {
    value.unwrap_or("Not set").to_string()
}

// Earning form

pub fn points_prompt(current: Option<i32>) -> Reply {
    let content = match current {
        Some(points) => format!("Editing Points Lodged, current value: {points} Points"),
        None => "How many points would you like to lodge?".to_string(),
    };
    Reply::public(content).with_next(NextStep::Select {
        custom_id: ComponentId::PointsSelect.to_string(),
        placeholder: "Points Lodged".to_string(),
        options: POINT_CHOICES
            .iter()
            .map(|points| SelectOption {
                label: format!("{points} Points"),
                value: points.to_string(),
            })
            .collect(),
    })
}

pub fn act_summary_prompt() -> Reply {
    Reply::public("Click the button below to enter your Act Summary:").with_next(
        NextStep::Buttons {
            buttons: vec![button(
                ComponentId::OpenActSummary,
                "Enter Act Summary",
                ButtonStyle::Primary,
            )],
        },
    )
}

pub fn act_summary_modal(current: Option<&str>) -> Modal {
    Modal {
        custom_id: ModalId::ActSummary.to_string(),
        title: "Enter Act Summary".to_string(),
        inputs: vec![TextInput {
            key: ACT_SUMMARY_KEY.to_string(),
            label: "Summarize your act in one/two sentences".to_string(),
            multiline: true,
            required: true,
            value: current.map(str::to_string),
            placeholder: None,
        }],
    }
}

pub fn alignment_prompt(current: Option<LocationAlignment>) -> Reply {
    let content = match current {
        Some(alignment) => format!(
            "Editing Location Alignment, current value: {}",
            alignment.label()
        ),
        None => "Was your character acting...".to_string(),
    };
    Reply::public(content).with_next(NextStep::Select {
        custom_id: ComponentId::AlignmentSelect.to_string(),
        placeholder: "Location Alignment".to_string(),
        options: LocationAlignment::ALL
            .iter()
            .map(|alignment| SelectOption {
                label: alignment.description().to_string(),
                value: alignment.choice(),
            })
            .collect(),
    })
}

pub fn earning_controls() -> NextStep {
    NextStep::Buttons {
        buttons: vec![
            button(
                ComponentId::Review(SubmissionKind::Earning),
                "Review",
                ButtonStyle::Secondary,
            ),
            button(ComponentId::EditPoints, "Edit Points Lodged", ButtonStyle::Secondary),
            button(ComponentId::EditActSummary, "Edit Act Summary", ButtonStyle::Secondary),
            button(
                ComponentId::EditAlignment,
                "Edit Location Alignment",
                ButtonStyle::Secondary,
            ),
            button(
                ComponentId::Submit(SubmissionKind::Earning),
                "Submit",
                ButtonStyle::Success,
            ),
        ],
    }
}

pub fn earning_card(submission: &EarningSubmission, title: &str, owner: &User) -> Card {
    let mut card = Card::new(format!("{title} #{}", submission.id))
        .author(owner)
        .field(
            "Points Lodged",
            submission
                .points_lodged
                .map(|p| format!("{p} Points"))
                .unwrap_or_else(|| "Not set".to_string()),
        )
        .field("Act Summary", or_unset(submission.act_summary.as_deref()))
        .field(
            "Location Alignment",
            or_unset(submission.location_alignment.map(|a| a.label())),
        );
    if let Some(approved) = submission.approved {
        card = card.field("Approved", yes_no(approved));
    }
    if let Some(reason) = &submission.denied_reason {
        card = card.field("Denial Reason", reason.as_str());
    }
    card
}

// Spending form

pub fn ability_prompt() -> Reply {
    Reply::public("Click the button below to enter your Ability information").with_next(
        NextStep::Buttons {
            buttons: vec![button(
                ComponentId::OpenAbilityForm,
                "Enter Ability Information",
                ButtonStyle::Primary,
            )],
        },
    )
}

/// The ability form. Without an existing submission every input is optional and blank means
/// "leave unchanged"; with one, the inputs are pre-filled with the current values.
pub fn ability_modal(existing: Option<&SpendingSubmission>) -> Modal {
    let title = match existing {
        Some(_) => "Modify Ability Information",
        None => "Enter Ability Information",
    };
    let inputs = AbilityField::ALL
        .iter()
        .map(|field| TextInput {
            key: field.key().to_string(),
            label: field.label().to_string(),
            multiline: field.multiline(),
            required: false,
            value: existing.and_then(|s| field.value(s)).map(str::to_string),
            placeholder: match existing {
                Some(_) => None,
                None => Some("Leave blank to not change".to_string()),
            },
        })
        .collect();
    Modal {
        custom_id: ModalId::AbilityInfo.to_string(),
        title: title.to_string(),
        inputs,
    }
}

/// What an ability form submission changed, field by field.
pub fn ability_changes_card(
    patch: &AbilityInfo,
    before: &SpendingSubmission,
    after: &SpendingSubmission,
) -> Card {
    let changed = patch.changes(before);
    AbilityField::ALL
        .iter()
        .fold(Card::default(), |card, field| {
            let value = or_unset(field.value(after));
            if changed.contains(field) {
                card.field(format!("Set {} to:", field.label()), value)
            } else {
                card.field(format!("Left {} as:", field.label()), value)
            }
        })
}

pub fn compliance_prompt() -> Reply {
    Reply::public("Is your Ability Lore/Rule Compliant?").with_next(NextStep::Buttons {
        buttons: vec![
            button(ComponentId::Compliance(false), "No", ButtonStyle::Danger),
            button(ComponentId::Compliance(true), "Yes", ButtonStyle::Success),
        ],
    })
}

pub fn spending_controls() -> NextStep {
    NextStep::Buttons {
        buttons: vec![
            button(
                ComponentId::Review(SubmissionKind::Spending),
                "Review",
                ButtonStyle::Secondary,
            ),
            button(ComponentId::EditAbility, "Edit", ButtonStyle::Secondary),
            button(
                ComponentId::EditCompliance,
                "Edit Lore/Rule Compliance",
                ButtonStyle::Secondary,
            ),
            button(
                ComponentId::Submit(SubmissionKind::Spending),
                "Submit",
                ButtonStyle::Primary,
            ),
        ],
    }
}

pub fn spending_card(submission: &SpendingSubmission, title: &str, owner: &User) -> Card {
    let mut card = AbilityField::ALL.iter().fold(
        Card::new(format!("{title} #{}", submission.id)).author(owner),
        |card, field| card.field(field.label(), or_unset(field.value(submission))),
    );
    card = card
        .field(
            "Is the ability Lore/Rule Compliant?",
            or_unset(submission.lore_rule_compliant.map(yes_no)),
        )
        .inline_field("Cost", format!("{} Points", submission.cost));
    if let Some(approved) = submission.approved {
        card = card.field("Approved", yes_no(approved));
    }
    if let Some(reason) = &submission.denied_reason {
        card = card.field("Denial Reason", reason.as_str());
    }
    card
}

// Review

pub fn review_controls(kind: SubmissionKind, id: i32) -> NextStep {
    NextStep::Buttons {
        buttons: vec![
            button(ComponentId::Deny(kind, id), "Deny", ButtonStyle::Danger),
            button(ComponentId::Approve(kind, id), "Approve", ButtonStyle::Success),
        ],
    }
}

pub fn make_changes_control(kind: SubmissionKind, id: i32) -> NextStep {
    NextStep::Buttons {
        buttons: vec![button(
            ComponentId::MakeChanges(kind, id),
            "Make Changes",
            ButtonStyle::Primary,
        )],
    }
}

pub fn deny_modal(kind: SubmissionKind, id: i32) -> Modal {
    Modal {
        custom_id: ModalId::DenyReason(kind, id).to_string(),
        title: "Deny Submission".to_string(),
        inputs: vec![TextInput {
            key: DENY_REASON_KEY.to_string(),
            label: "Denial Reason".to_string(),
            multiline: true,
            required: true,
            value: None,
            placeholder: None,
        }],
    }
}

pub fn admin_transaction_card(
    transaction: &AdminTransaction,
    title: &str,
    target: &User,
    admin: &User,
) -> Card {
    let change = if transaction.net_points >= 0 {
        format!("+{}", transaction.net_points)
    } else {
        transaction.net_points.to_string()
    };
    Card::new(format!("{title} #{}", transaction.id))
        .field("Timestamp", timestamp(&transaction.created_at))
        .field("Target User", mention(&target.discord_id))
        .inline_field("Balance Changes", change)
        .field("Performed by Admin", mention(&admin.discord_id))
        .field("Reason", transaction.reason.as_str())
}

// Listings

/// Pads every column to its widest cell and joins the cells with ` | `.
fn aligned(rows: &[Vec<String>]) -> Vec<String> {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let widths: Vec<usize> = (0..columns)
        .map(|c| {
            rows.iter()
                .filter_map(|row| row.get(c))
                .map(|cell| cell.chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();
    rows.iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(c, cell)| {
                    let pad = widths[c].saturating_sub(cell.chars().count());
                    format!("{cell}{}", " ".repeat(pad))
                })
                .collect::<Vec<_>>()
                .join(" | ")
                .trim_end()
                .to_string()
        })
        .collect()
}

/// Aligned columns in inline code, followed by mentions that the client renders as names.
fn table_with_mentions(rows: Vec<(Vec<String>, Vec<String>)>) -> String {
    let (cells, mentions): (Vec<_>, Vec<_>) = rows.into_iter().unzip();
    aligned(&cells)
        .into_iter()
        .zip(mentions)
        .map(|(line, names)| {
            if names.is_empty() {
                format!("`{line}`")
            } else {
                format!("`{line}` {}", names.join(" | "))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn pager(session: Uuid) -> NextStep {
    NextStep::Buttons {
        buttons: vec![
            button(ComponentId::PreviousPage(session), "Previous", ButtonStyle::Secondary),
            button(ComponentId::NextPage(session), "Next", ButtonStyle::Secondary),
        ],
    }
}

pub fn leaderboard_card(listing: &Listing<User>) -> Card {
    let rows = listing
        .rows
        .iter()
        .enumerate()
        .map(|(index, user)| {
            (
                vec![
                    format!("#{}", listing.page.position(index)),
                    user.balance.to_string(),
                ],
                vec![mention(&user.discord_id)],
            )
        })
        .collect();
    Card::new(format!("Leaderboard - Page {}", listing.page.number))
        .inline_field("", table_with_mentions(rows))
}

pub fn transaction_log_card(user: &User, listing: &Listing<TransactionLogEntry>) -> Card {
    let mut rows = vec![vec![
        "ID".to_string(),
        "Timestamp".to_string(),
        "Amount".to_string(),
        "Reference".to_string(),
    ]];
    rows.extend(listing.rows.iter().map(|entry| {
        vec![
            entry.id.to_string(),
            timestamp(&entry.created_at),
            signed(entry.points),
            entry
                .provenance()
                .map(|p| p.to_string())
                .unwrap_or_default(),
        ]
    }));
    Card::new(format!("Transaction Log - Page {}", listing.page.number))
        .author(user)
        .inline_field("", format!("```\n{}\n```", aligned(&rows).join("\n")))
}

/// Columns depend on the filter: a fixed target or admin is shown once in the header instead
/// of on every row.
pub fn admin_transaction_log_card(
    filter: AdminLogFilter,
    target: Option<&User>,
    admin: Option<&User>,
    listing: &Listing<AdminLogRow>,
) -> Card {
    let mut card = Card::new(format!("Admin Transaction Log - Page {}", listing.page.number));
    if let Some(target) = target {
        card = card.field("Target User", mention(&target.discord_id));
    }
    if let Some(admin) = admin {
        card = card.field("Admin User", mention(&admin.discord_id));
    }

    let by_target = filter.target.is_some();
    let by_admin = filter.admin.is_some();
    let header_names: Vec<String> = match (by_target, by_admin) {
        (true, true) => vec![],
        (false, true) => vec!["On".to_string()],
        (true, false) => vec!["By".to_string()],
        (false, false) => vec!["On".to_string(), "By".to_string()],
    };
    let header_cells = if by_target || by_admin {
        vec!["ID".to_string(), "Timestamp".to_string(), "Amount".to_string()]
    } else {
        vec!["ID".to_string(), "Amount".to_string()]
    };
    let mut rows = vec![(header_cells, header_names)];
    rows.extend(listing.rows.iter().map(|row| {
        let txn = &row.transaction;
        let cells = if by_target || by_admin {
            vec![txn.id.to_string(), timestamp(&txn.created_at), signed(txn.net_points)]
        } else {
            vec![txn.id.to_string(), signed(txn.net_points)]
        };
        let on = mention(&row.target.discord_id);
        let by = mention(&row.admin.discord_id);
        let names = match (by_target, by_admin) {
            (true, true) => vec![],
            (false, true) => vec![on],
            (true, false) => vec![by],
            (false, false) => vec![on, by],
        };
        (cells, names)
    }));
    card.inline_field("", table_with_mentions(rows))
}

pub fn users_card(filter: UserFilter, listing: &Listing<User>) -> Card {
    let show_role = filter == UserFilter::All;
    let mut header = vec!["ID".to_string(), "Visible".to_string()];
    if show_role {
        header.push("Bot Role".to_string());
    }
    let mut rows = vec![(header, vec!["Name".to_string()])];
    rows.extend(listing.rows.iter().map(|user| {
        let mut cells = vec![user.id.to_string(), yes_no(user.visible).to_string()];
        if show_role {
            cells.push(if user.is_admin { "Admin" } else { "User" }.to_string());
        }
        (cells, vec![mention(&user.discord_id)])
    }));
    Card::new(format!("Users - Page {}", listing.page.number))
        .field("User Type", filter.label())
        .inline_field("", table_with_mentions(rows))
}
