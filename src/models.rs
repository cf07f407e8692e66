use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============ Pipeline Models ============

/// Sales pipeline stage of an opportunity.
///
/// Wire format matches the CRM backend (`SCREAMING_SNAKE_CASE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpportunityStage {
    NewLead,
    Qualification,
    NeedsAnalysis,
    Proposal,
    Negotiation,
    ClosedWon,
    ClosedLost,
    Renewal,
}

/// A sales opportunity as rendered on the pipeline board.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    /// Unique identifier.
    pub id: Uuid,
    /// Opportunity name.
    pub name: String,
    /// Current pipeline stage.
    pub stage: OpportunityStage,
    /// Expected monetary value in EUR.
    pub value: Option<BigDecimal>,
    /// Win probability (0-100). Reset to the stage default on every stage change.
    #[serde(default)]
    pub probability: i32,
    /// Display name of the customer / lead company.
    pub customer_name: Option<String>,
    /// Display name of the primary contact.
    pub contact_name: Option<String>,
    /// Display name of the assigned sales rep.
    ///
    /// Substring matching on this field is a placeholder until a proper
    /// assignee foreign key lands in the backend payload.
    pub assigned_to_name: Option<String>,
    /// Expected close date.
    pub expected_close_date: Option<NaiveDate>,
    /// Timestamp of creation.
    pub created_at: DateTime<Utc>,
    /// Timestamp of last update.
    pub updated_at: DateTime<Utc>,
}

/// Quick actions available on board cards, bypassing the drag transition check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuickActionKind {
    Won,
    Lost,
    Reactivate,
}

/// Request body for a drag-initiated stage change.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageChangeRequest {
    pub to_stage: OpportunityStage,
}

/// Request body for a board quick action.
#[derive(Debug, Deserialize)]
pub struct QuickActionRequest {
    pub action: QuickActionKind,
}

/// Stage subset selected by the board status filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    Active,
    Closed,
    All,
}

/// Client-side board filters. All filters are conjunctive.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoardFilters {
    /// Case-insensitive free-text match on opportunity name and customer name.
    pub search: Option<String>,
    /// Case-insensitive substring match on the assignee display name.
    pub assignee: Option<String>,
    /// Stage subset to render.
    #[serde(default)]
    pub status: StatusFilter,
    /// Per-column card limit (load-more pagination). Defaults to 15.
    pub limit: Option<usize>,
}

/// One rendered board column.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageColumn {
    pub stage: OpportunityStage,
    pub label: &'static str,
    pub color: &'static str,
    /// Total cards in this stage after filtering (may exceed `opportunities.len()`).
    pub total_count: usize,
    /// Sum of opportunity values in this stage.
    pub total_value: BigDecimal,
    /// Visible cards, truncated to the column limit.
    pub opportunities: Vec<Opportunity>,
}

/// Aggregated pipeline statistics shown in the board header.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStats {
    pub total_active: usize,
    pub total_won: usize,
    pub total_lost: usize,
    pub active_value: BigDecimal,
    pub won_value: BigDecimal,
    pub lost_value: BigDecimal,
    /// won / (won + lost), 0.0 when nothing is closed yet.
    pub conversion_rate: f64,
}

/// Full board response: filtered columns plus header statistics.
#[derive(Debug, Serialize)]
pub struct BoardResponse {
    pub columns: Vec<StageColumn>,
    pub stats: PipelineStats,
}

/// Response for a single-opportunity mutation (drag or quick action).
///
/// `animation_ms` tells the client how long to keep the card in its source
/// column before re-grouping, matching the 300ms CSS transition of the board.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityMutationResponse {
    pub opportunity: Opportunity,
    pub animation_ms: u64,
}

// ============ Contact Models ============

/// Decision-making level of a contact within the customer organisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionLevel {
    Entscheider,
    Mitentscheider,
    Beeinflusser,
    Nutzer,
    Gatekeeper,
}

/// Whether a contact is responsible for all customer locations or a subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponsibilityScope {
    All,
    Specific,
}

/// A customer contact person.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub salutation: Option<String>,
    pub title: Option<String>,
    pub position: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub mobile: Option<String>,
    /// At most one primary contact per customer; enforced by the backend.
    #[serde(default)]
    pub is_primary: bool,
    pub decision_level: Option<DecisionLevel>,
    pub birthday: Option<NaiveDate>,
    #[serde(default)]
    pub hobbies: Vec<String>,
    pub personal_notes: Option<String>,
    pub responsibility_scope: Option<ResponsibilityScope>,
    #[serde(default)]
    pub assigned_location_ids: Vec<Uuid>,
}

impl Contact {
    /// Full display name including salutation and academic title.
    pub fn full_name(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(ref s) = self.salutation {
            parts.push(s);
        }
        if let Some(ref t) = self.title {
            parts.push(t);
        }
        parts.push(&self.first_name);
        parts.push(&self.last_name);
        parts.join(" ")
    }

    /// Preferred dialable number: mobile first, landline second.
    pub fn any_phone(&self) -> Option<&str> {
        self.mobile.as_deref().or(self.phone.as_deref())
    }
}

/// Canonical contact list ordering: the primary contact first, then by last
/// and first name, case-insensitively.
pub fn sort_contacts(contacts: &mut [Contact]) {
    contacts.sort_by(|a, b| {
        b.is_primary
            .cmp(&a.is_primary)
            .then_with(|| a.last_name.to_lowercase().cmp(&b.last_name.to_lowercase()))
            .then_with(|| a.first_name.to_lowercase().cmp(&b.first_name.to_lowercase()))
    });
}

/// Data-freshness classification from the contact intelligence summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FreshnessLevel {
    Fresh,
    Aging,
    Stale,
    Critical,
}

/// Relationship trend from the contact intelligence summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Stable,
    Declining,
}

/// Lightweight per-contact intelligence summary driving action suggestions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactIntelligence {
    pub freshness_level: Option<FreshnessLevel>,
    pub trend_direction: Option<TrendDirection>,
    /// Channel the contact historically responds to best.
    pub preferred_channel: Option<ActionType>,
}

// ============ Action Models ============

/// Closed set of executable contact actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Call,
    Email,
    Whatsapp,
    Sms,
    Calendar,
    Note,
    Meeting,
}

/// Urgency tier of a suggested action. Ordering: High < Medium < Low < None,
/// so deriving `Ord` sorts the most urgent actions first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    High,
    Medium,
    Low,
    None,
}

/// An ephemeral, computed action suggestion. Never persisted as-is;
/// recomputed from `Contact` + `ContactIntelligence` on every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickAction {
    /// Stable suggestion identifier, e.g. `birthday-greeting`.
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub label: String,
    pub urgency: Urgency,
    /// Marks the primary outward action for this contact.
    #[serde(default)]
    pub primary: bool,
    pub enabled: bool,
}

/// Swipe gesture bindings. Either side may be `None` (swipe disabled).
#[derive(Debug, Clone, Serialize)]
pub struct SwipeActions {
    pub left: Option<QuickAction>,
    pub right: Option<QuickAction>,
}

/// Outcome of a single action execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub success: bool,
    pub action_id: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the action was queued for replay instead of failing hard.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub requires_retry: bool,
    /// Deep link the client should open, when the action produces one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deep_link: Option<String>,
    /// Generated VCALENDAR payload for calendar/meeting actions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ics: Option<String>,
}

/// Minimal contact snapshot persisted with a queued action so the replay
/// does not depend on the contact still being loadable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactSnapshot {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub mobile: Option<String>,
}

impl From<&Contact> for ContactSnapshot {
    fn from(c: &Contact) -> Self {
        Self {
            id: c.id,
            first_name: c.first_name.clone(),
            last_name: c.last_name.clone(),
            email: c.email.clone(),
            phone: c.phone.clone(),
            mobile: c.mobile.clone(),
        }
    }
}

/// A persisted offline-queue entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedAction {
    pub id: Uuid,
    pub action: QuickAction,
    pub contact: ContactSnapshot,
    pub queued_at: DateTime<Utc>,
    /// Monotonically non-decreasing until the item is removed.
    pub retry_count: u32,
    pub max_retries: u32,
}

/// Interaction outcome recorded after each execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionOutcome {
    Successful,
    Failed,
}

/// One entry of the local interaction log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRecord {
    pub contact_id: Uuid,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub outcome: InteractionOutcome,
    pub timestamp: DateTime<Utc>,
}

// ============ API Request Models ============

/// Request body for suggestion and swipe-action endpoints.
#[derive(Debug, Deserialize)]
pub struct SuggestionRequest {
    pub contact: Contact,
    #[serde(default)]
    pub intelligence: Option<ContactIntelligence>,
}

/// Request body for action execution.
#[derive(Debug, Deserialize)]
pub struct ExecuteActionRequest {
    pub action: QuickAction,
    pub contact: Contact,
}
