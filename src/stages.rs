use crate::models::OpportunityStage;

use OpportunityStage::*;

/// Static, compile-time configuration of a pipeline stage.
///
/// Exactly one entry exists per stage. The `allowed_next` whitelist is the
/// single source of truth for drag transitions, and `is_active` is the single
/// source of truth for the active/closed split (no separate stage lists that
/// could drift).
#[derive(Debug)]
pub struct StageConfig {
    pub stage: OpportunityStage,
    /// Column header label.
    pub label: &'static str,
    /// Column accent color.
    pub color: &'static str,
    /// Probability assigned when an opportunity enters this stage.
    pub default_probability: i32,
    /// Column display order.
    pub sort_order: u8,
    /// Whether the stage counts as part of the active pipeline.
    pub is_active: bool,
    /// Stages a board drag may move an opportunity to from here.
    pub allowed_next: &'static [OpportunityStage],
}

/// All stages in board display order.
pub const ALL_STAGES: [OpportunityStage; 8] = [
    NewLead,
    Qualification,
    NeedsAnalysis,
    Proposal,
    Negotiation,
    ClosedWon,
    ClosedLost,
    Renewal,
];

// Active stages move freely among themselves (forward progression and
// backward correction) and may close directly either way. Closed stages are
// terminal, except CLOSED_WON which may open a contract renewal.
const FROM_ACTIVE: &[OpportunityStage] = &[
    NewLead,
    Qualification,
    NeedsAnalysis,
    Proposal,
    Negotiation,
    ClosedWon,
    ClosedLost,
];

static STAGE_CONFIGS: [StageConfig; 8] = [
    StageConfig {
        stage: NewLead,
        label: "Neuer Lead",
        color: "#004F7B",
        default_probability: 10,
        sort_order: 1,
        is_active: true,
        allowed_next: FROM_ACTIVE,
    },
    StageConfig {
        stage: Qualification,
        label: "Qualifizierung",
        color: "#94C456",
        default_probability: 25,
        sort_order: 2,
        is_active: true,
        allowed_next: FROM_ACTIVE,
    },
    StageConfig {
        stage: NeedsAnalysis,
        label: "Bedarfsanalyse",
        color: "#FFB74D",
        default_probability: 40,
        sort_order: 3,
        is_active: true,
        allowed_next: FROM_ACTIVE,
    },
    StageConfig {
        stage: Proposal,
        label: "Angebot",
        color: "#FFA726",
        default_probability: 60,
        sort_order: 4,
        is_active: true,
        allowed_next: FROM_ACTIVE,
    },
    StageConfig {
        stage: Negotiation,
        label: "Verhandlung",
        color: "#FF7043",
        default_probability: 80,
        sort_order: 5,
        is_active: true,
        allowed_next: FROM_ACTIVE,
    },
    StageConfig {
        stage: ClosedWon,
        label: "Gewonnen",
        color: "#66BB6A",
        default_probability: 100,
        sort_order: 6,
        is_active: false,
        allowed_next: &[Renewal],
    },
    StageConfig {
        stage: ClosedLost,
        label: "Verloren",
        color: "#EF5350",
        default_probability: 0,
        sort_order: 7,
        is_active: false,
        allowed_next: &[],
    },
    StageConfig {
        stage: Renewal,
        label: "Verlängerung",
        color: "#FF9800",
        default_probability: 75,
        sort_order: 8,
        is_active: true,
        allowed_next: &[ClosedWon, ClosedLost],
    },
];

/// Looks up the static configuration for a stage.
pub fn stage_config(stage: OpportunityStage) -> &'static StageConfig {
    let idx = match stage {
        NewLead => 0,
        Qualification => 1,
        NeedsAnalysis => 2,
        Proposal => 3,
        Negotiation => 4,
        ClosedWon => 5,
        ClosedLost => 6,
        Renewal => 7,
    };
    &STAGE_CONFIGS[idx]
}

/// Default win probability when an opportunity enters `stage`.
pub fn default_probability(stage: OpportunityStage) -> i32 {
    stage_config(stage).default_probability
}

/// Whether a board drag from `from` to `to` is legal.
///
/// `from == to` is always allowed as a no-op; everything else must be
/// whitelisted in the source stage's `allowed_next`.
pub fn is_stage_transition_allowed(from: OpportunityStage, to: OpportunityStage) -> bool {
    from == to || stage_config(from).allowed_next.contains(&to)
}
