use std::time::Duration;

use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use moka::future::Cache;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::cache_validator::ValidatedCacheEntry;
use crate::errors::AppError;
use crate::gateway_client::CrmGatewayClient;
use crate::models::{
    BoardFilters, BoardResponse, Opportunity, OpportunityMutationResponse, OpportunityStage,
    PipelineStats, QuickActionKind, StageColumn, StatusFilter,
};
use crate::stages::{default_probability, is_stage_transition_allowed, stage_config, ALL_STAGES};

/// How long the client keeps a moved card in its source column before
/// re-grouping (matches the board's CSS transition).
pub const STAGE_CHANGE_ANIMATION_MS: u64 = 300;

/// Default per-column card limit.
pub const DEFAULT_COLUMN_LIMIT: usize = 15;

/// Board snapshot cache TTL.
const BOARD_CACHE_TTL: Duration = Duration::from_secs(30);

// ============ Pure board functions ============

/// Applies the free-text and assignee filters, preserving input order.
///
/// Free text matches case-insensitively against opportunity name and customer
/// name; assignee is a case-insensitive substring of the assignee display
/// name. The status filter is not applied here; it selects columns in
/// [`group_by_stage`].
pub fn filter_opportunities(items: &[Opportunity], filters: &BoardFilters) -> Vec<Opportunity> {
    let search = filters
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);
    let assignee = filters
        .assignee
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    items
        .iter()
        .filter(|opp| {
            let search_ok = search.as_deref().is_none_or(|needle| {
                opp.name.to_lowercase().contains(needle)
                    || opp
                        .customer_name
                        .as_deref()
                        .is_some_and(|c| c.to_lowercase().contains(needle))
            });
            let assignee_ok = assignee.as_deref().is_none_or(|needle| {
                opp.assigned_to_name
                    .as_deref()
                    .is_some_and(|a| a.to_lowercase().contains(needle))
            });
            search_ok && assignee_ok
        })
        .cloned()
        .collect()
}

/// Stages rendered as columns for a status filter, in display order.
pub fn selected_stages(status: StatusFilter) -> Vec<OpportunityStage> {
    ALL_STAGES
        .into_iter()
        .filter(|&stage| match status {
            StatusFilter::Active => stage_config(stage).is_active,
            StatusFilter::Closed => !stage_config(stage).is_active,
            StatusFilter::All => true,
        })
        .collect()
}

/// Partitions `items` into per-stage columns, truncating each column to
/// `limit` cards while reporting the untruncated count and value totals.
pub fn group_by_stage(
    items: &[Opportunity],
    status: StatusFilter,
    limit: usize,
) -> Vec<StageColumn> {
    selected_stages(status)
        .into_iter()
        .map(|stage| {
            let config = stage_config(stage);
            let in_stage: Vec<&Opportunity> = items.iter().filter(|o| o.stage == stage).collect();
            let total_value = in_stage
                .iter()
                .filter_map(|o| o.value.as_ref())
                .fold(BigDecimal::zero(), |acc, v| acc + v);
            StageColumn {
                stage,
                label: config.label,
                color: config.color,
                total_count: in_stage.len(),
                total_value,
                opportunities: in_stage.into_iter().take(limit).cloned().collect(),
            }
        })
        .collect()
}

/// Header statistics over the (search/assignee-filtered) opportunity set.
pub fn compute_stats(items: &[Opportunity]) -> PipelineStats {
    let mut stats = PipelineStats {
        total_active: 0,
        total_won: 0,
        total_lost: 0,
        active_value: BigDecimal::zero(),
        won_value: BigDecimal::zero(),
        lost_value: BigDecimal::zero(),
        conversion_rate: 0.0,
    };

    for opp in items {
        let value = opp.value.clone().unwrap_or_else(BigDecimal::zero);
        match opp.stage {
            OpportunityStage::ClosedWon => {
                stats.total_won += 1;
                stats.won_value += value;
            }
            OpportunityStage::ClosedLost => {
                stats.total_lost += 1;
                stats.lost_value += value;
            }
            _ => {
                stats.total_active += 1;
                stats.active_value += value;
            }
        }
    }

    let closed = stats.total_won + stats.total_lost;
    if closed > 0 {
        stats.conversion_rate = stats.total_won as f64 / closed as f64;
    }
    stats
}

/// Full board computation: filter, group, aggregate.
pub fn build_board(items: &[Opportunity], filters: &BoardFilters) -> BoardResponse {
    let filtered = filter_opportunities(items, filters);
    let limit = filters.limit.unwrap_or(DEFAULT_COLUMN_LIMIT);
    BoardResponse {
        columns: group_by_stage(&filtered, filters.status, limit),
        stats: compute_stats(&filtered),
    }
}

// ============ Board service ============

/// Server-side pipeline board.
///
/// Holds the opportunity set in memory, seeded from the CRM gateway, and
/// applies drag transitions and quick actions to it. Mutations are persisted
/// to the gateway first; a gateway failure leaves the board untouched, the
/// server-side analog of the client's optimistic-update rollback.
pub struct PipelineBoard {
    gateway: CrmGatewayClient,
    state: RwLock<Vec<Opportunity>>,
    /// Serialized board responses keyed by filter combination, integrity
    /// checked, invalidated on every mutation.
    response_cache: Cache<String, String>,
}

impl PipelineBoard {
    pub fn new(gateway: CrmGatewayClient) -> Self {
        Self {
            gateway,
            state: RwLock::new(Vec::new()),
            response_cache: Cache::builder()
                .max_capacity(64)
                .time_to_live(BOARD_CACHE_TTL)
                .build(),
        }
    }

    /// Fetches the opportunity set from the CRM and replaces local state.
    pub async fn seed(&self) -> Result<usize, AppError> {
        let opportunities = self.gateway.get_opportunities().await?;
        let count = opportunities.len();
        self.replace_state(opportunities).await;
        tracing::info!("Pipeline board seeded with {} opportunities", count);
        Ok(count)
    }

    /// Replaces the board state wholesale and drops cached responses.
    pub async fn replace_state(&self, opportunities: Vec<Opportunity>) {
        *self.state.write().await = opportunities;
        self.response_cache.invalidate_all();
    }

    /// Computes (or serves from cache) the filtered board as a JSON string.
    pub async fn board_json(&self, filters: &BoardFilters) -> Result<String, AppError> {
        let key = format!("{:?}", filters);

        if let Some(cached) = self.response_cache.get(&key).await {
            if let Some(json) = ValidatedCacheEntry::deserialize_and_validate(&cached) {
                tracing::debug!("Board cache hit for {}", key);
                return Ok(json);
            }
        }

        let state = self.state.read().await;
        let json = serde_json::to_string(&build_board(&state, filters))?;
        drop(state);

        let entry = ValidatedCacheEntry::new(json.clone());
        self.response_cache.insert(key, entry.serialize()).await;
        Ok(json)
    }

    /// Applies a drag-initiated stage change.
    ///
    /// Disallowed transitions are rejected without touching the board;
    /// `from == to` is a no-op that does not bump `updated_at`.
    pub async fn apply_stage_change(
        &self,
        id: Uuid,
        to_stage: OpportunityStage,
    ) -> Result<OpportunityMutationResponse, AppError> {
        let from = self.stage_of(id).await?;

        if from == to_stage {
            let state = self.state.read().await;
            let opportunity = find(&state, id)?.clone();
            return Ok(mutation_response(opportunity));
        }

        if !is_stage_transition_allowed(from, to_stage) {
            return Err(AppError::TransitionNotAllowed {
                from,
                to: to_stage,
            });
        }

        self.commit_stage(id, to_stage).await
    }

    /// Applies a card quick action. Won/lost bypass the drag whitelist;
    /// reactivation is only valid for lost opportunities.
    pub async fn apply_quick_action(
        &self,
        id: Uuid,
        action: QuickActionKind,
    ) -> Result<OpportunityMutationResponse, AppError> {
        let from = self.stage_of(id).await?;

        let target = match action {
            QuickActionKind::Won => OpportunityStage::ClosedWon,
            QuickActionKind::Lost => OpportunityStage::ClosedLost,
            QuickActionKind::Reactivate => {
                if from != OpportunityStage::ClosedLost {
                    return Err(AppError::BadRequest(
                        "Nur verlorene Verkaufschancen können reaktiviert werden".to_string(),
                    ));
                }
                OpportunityStage::Qualification
            }
        };

        if from == target {
            let state = self.state.read().await;
            let opportunity = find(&state, id)?.clone();
            return Ok(mutation_response(opportunity));
        }

        self.commit_stage(id, target).await
    }

    async fn stage_of(&self, id: Uuid) -> Result<OpportunityStage, AppError> {
        let state = self.state.read().await;
        Ok(find(&state, id)?.stage)
    }

    // Persist to the gateway first, then mutate. The read lock is released
    // before the gateway call so slow requests do not block board reads.
    async fn commit_stage(
        &self,
        id: Uuid,
        to_stage: OpportunityStage,
    ) -> Result<OpportunityMutationResponse, AppError> {
        let probability = default_probability(to_stage);
        self.gateway.change_stage(id, to_stage, probability).await?;

        let mut state = self.state.write().await;
        let opportunity = find_mut(&mut state, id)?;
        opportunity.stage = to_stage;
        opportunity.probability = probability;
        opportunity.updated_at = Utc::now();
        let snapshot = opportunity.clone();
        drop(state);

        self.response_cache.invalidate_all();
        tracing::info!("Opportunity {} moved to {:?}", id, to_stage);
        Ok(mutation_response(snapshot))
    }
}

fn mutation_response(opportunity: Opportunity) -> OpportunityMutationResponse {
    OpportunityMutationResponse {
        opportunity,
        animation_ms: STAGE_CHANGE_ANIMATION_MS,
    }
}

fn find(state: &[Opportunity], id: Uuid) -> Result<&Opportunity, AppError> {
    state
        .iter()
        .find(|o| o.id == id)
        .ok_or_else(|| AppError::NotFound(format!("Verkaufschance {} nicht gefunden", id)))
}

fn find_mut(state: &mut [Opportunity], id: Uuid) -> Result<&mut Opportunity, AppError> {
    state
        .iter_mut()
        .find(|o| o.id == id)
        .ok_or_else(|| AppError::NotFound(format!("Verkaufschance {} nicht gefunden", id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn opportunity(name: &str, stage: OpportunityStage, value: i64) -> Opportunity {
        Opportunity {
            id: Uuid::new_v4(),
            name: name.to_string(),
            stage,
            value: Some(BigDecimal::from(value)),
            probability: default_probability(stage),
            customer_name: Some("Schmidt Gastro GmbH".to_string()),
            contact_name: None,
            assigned_to_name: Some("Anna Weber".to_string()),
            expected_close_date: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn sample() -> Vec<Opportunity> {
        vec![
            opportunity("Catering Messe München", OpportunityStage::NewLead, 5_000),
            opportunity("Kantinenvertrag Nord", OpportunityStage::Proposal, 42_000),
            opportunity("Eventreihe Sommer", OpportunityStage::ClosedWon, 18_000),
            opportunity("Altvertrag Süd", OpportunityStage::ClosedLost, 7_000),
        ]
    }

    #[test]
    fn search_matches_name_and_customer_case_insensitively() {
        let items = sample();
        let filters = BoardFilters {
            search: Some("kantinen".to_string()),
            ..Default::default()
        };
        let hits = filter_opportunities(&items, &filters);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Kantinenvertrag Nord");

        let by_customer = BoardFilters {
            search: Some("SCHMIDT".to_string()),
            ..Default::default()
        };
        assert_eq!(filter_opportunities(&items, &by_customer).len(), 4);
    }

    #[test]
    fn assignee_filter_is_substring_match() {
        let items = sample();
        let filters = BoardFilters {
            assignee: Some("weber".to_string()),
            ..Default::default()
        };
        assert_eq!(filter_opportunities(&items, &filters).len(), 4);

        let nobody = BoardFilters {
            assignee: Some("meier".to_string()),
            ..Default::default()
        };
        assert!(filter_opportunities(&items, &nobody).is_empty());
    }

    #[test]
    fn filtering_is_idempotent_and_order_preserving() {
        let items = sample();
        let filters = BoardFilters {
            search: Some("e".to_string()),
            ..Default::default()
        };
        let once = filter_opportunities(&items, &filters);
        let twice = filter_opportunities(&once, &filters);
        let names: Vec<_> = once.iter().map(|o| &o.name).collect();
        let names_twice: Vec<_> = twice.iter().map(|o| &o.name).collect();
        assert_eq!(names, names_twice);
    }

    #[test]
    fn status_filter_selects_columns() {
        let active = selected_stages(StatusFilter::Active);
        assert!(active.contains(&OpportunityStage::Renewal));
        assert!(!active.contains(&OpportunityStage::ClosedWon));

        let closed = selected_stages(StatusFilter::Closed);
        assert_eq!(
            closed,
            vec![OpportunityStage::ClosedWon, OpportunityStage::ClosedLost]
        );

        assert_eq!(selected_stages(StatusFilter::All).len(), ALL_STAGES.len());
    }

    #[test]
    fn grouping_partitions_without_loss() {
        let items = sample();
        let columns = group_by_stage(&items, StatusFilter::All, DEFAULT_COLUMN_LIMIT);
        let total: usize = columns.iter().map(|c| c.total_count).sum();
        assert_eq!(total, items.len());
    }

    #[test]
    fn column_limit_truncates_cards_but_not_counts() {
        let items: Vec<Opportunity> = (0..20)
            .map(|i| opportunity(&format!("Lead {}", i), OpportunityStage::NewLead, 100))
            .collect();
        let columns = group_by_stage(&items, StatusFilter::Active, 15);
        let new_lead = columns
            .iter()
            .find(|c| c.stage == OpportunityStage::NewLead)
            .unwrap();
        assert_eq!(new_lead.opportunities.len(), 15);
        assert_eq!(new_lead.total_count, 20);
        assert_eq!(new_lead.total_value, BigDecimal::from(2_000));
    }

    #[test]
    fn stats_cover_counts_values_and_conversion() {
        let stats = compute_stats(&sample());
        assert_eq!(stats.total_active, 2);
        assert_eq!(stats.total_won, 1);
        assert_eq!(stats.total_lost, 1);
        assert_eq!(stats.active_value, BigDecimal::from(47_000));
        assert_eq!(stats.won_value, BigDecimal::from(18_000));
        assert_eq!(stats.lost_value, BigDecimal::from(7_000));
        assert!((stats.conversion_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn stats_conversion_rate_zero_when_nothing_closed() {
        let items = vec![opportunity("Lead", OpportunityStage::NewLead, 1)];
        assert_eq!(compute_stats(&items).conversion_rate, 0.0);
    }

    fn board() -> PipelineBoard {
        // Gateway is never reached by the paths under test.
        let gateway =
            CrmGatewayClient::new("http://127.0.0.1:9".to_string(), "test".to_string()).unwrap();
        PipelineBoard::new(gateway)
    }

    #[tokio::test]
    async fn disallowed_transition_rejected_without_mutation() {
        let b = board();
        let items = sample();
        let lost_id = items[3].id;
        b.replace_state(items).await;

        let err = b
            .apply_stage_change(lost_id, OpportunityStage::NewLead)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TransitionNotAllowed { .. }));

        let all = BoardFilters {
            status: StatusFilter::All,
            ..Default::default()
        };
        let json = b.board_json(&all).await.unwrap();
        assert!(json.contains("CLOSED_LOST"));
    }

    #[tokio::test]
    async fn same_stage_drop_is_a_noop() {
        let b = board();
        let items = sample();
        let id = items[0].id;
        let before = items[0].updated_at;
        b.replace_state(items).await;

        let response = b
            .apply_stage_change(id, OpportunityStage::NewLead)
            .await
            .unwrap();
        assert_eq!(response.opportunity.updated_at, before);
        assert_eq!(response.animation_ms, STAGE_CHANGE_ANIMATION_MS);
    }

    #[tokio::test]
    async fn unknown_opportunity_is_not_found() {
        let b = board();
        b.replace_state(sample()).await;

        let err = b
            .apply_stage_change(Uuid::new_v4(), OpportunityStage::Proposal)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn reactivate_requires_a_lost_opportunity() {
        let b = board();
        let items = sample();
        let active_id = items[0].id;
        b.replace_state(items).await;

        let err = b
            .apply_quick_action(active_id, QuickActionKind::Reactivate)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
