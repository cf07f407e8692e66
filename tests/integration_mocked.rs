/// Integration tests with a mocked CRM backend
/// Exercises the gateway client, the board mutations and the offline queue
/// replay without hitting a real CRM.
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rust_pipeline_api::connectivity::ConnectivityMonitor;
use rust_pipeline_api::errors::AppError;
use rust_pipeline_api::execution::ActionExecutionService;
use rust_pipeline_api::gateway_client::CrmGatewayClient;
use rust_pipeline_api::models::{
    ActionType, Contact, ContactSnapshot, OpportunityStage, QuickAction, QuickActionKind, Urgency,
};
use rust_pipeline_api::offline_queue::{GatewayReplayer, OfflineQueueService};
use rust_pipeline_api::pipeline::PipelineBoard;
use rust_pipeline_api::storage::MemoryStore;

fn gateway(server: &MockServer) -> CrmGatewayClient {
    CrmGatewayClient::new(server.uri(), "test_token".to_string()).unwrap()
}

fn opportunity_json(id: Uuid, name: &str, stage: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "stage": stage,
        "value": "12500.00",
        "probability": 10,
        "customerName": "Gastro Schmidt GmbH",
        "contactName": "Maria Schmidt",
        "assignedToName": "Anna Weber",
        "expectedCloseDate": "2025-09-30",
        "createdAt": "2025-01-01T08:00:00Z",
        "updatedAt": "2025-01-01T08:00:00Z"
    })
}

fn call_action() -> QuickAction {
    QuickAction {
        id: "call".to_string(),
        action_type: ActionType::Call,
        label: "Anrufen".to_string(),
        urgency: Urgency::Low,
        primary: false,
        enabled: true,
    }
}

fn contact() -> Contact {
    Contact {
        id: Uuid::new_v4(),
        first_name: "Maria".to_string(),
        last_name: "Schmidt".to_string(),
        salutation: None,
        title: None,
        position: None,
        email: Some("maria@gastro.de".to_string()),
        phone: Some("089 1234".to_string()),
        mobile: Some("0171 555666".to_string()),
        is_primary: true,
        decision_level: None,
        birthday: None,
        hobbies: vec![],
        personal_notes: None,
        responsibility_scope: None,
        assigned_location_ids: vec![],
    }
}

#[tokio::test]
async fn fetches_and_parses_opportunities() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/api/opportunities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            opportunity_json(id, "Catering Messe", "NEW_LEAD"),
            opportunity_json(Uuid::new_v4(), "Kantinenvertrag", "PROPOSAL"),
        ])))
        .mount(&server)
        .await;

    let opportunities = gateway(&server).get_opportunities().await.unwrap();
    assert_eq!(opportunities.len(), 2);
    assert_eq!(opportunities[0].id, id);
    assert_eq!(opportunities[0].stage, OpportunityStage::NewLead);
    assert_eq!(opportunities[1].stage, OpportunityStage::Proposal);
}

#[tokio::test]
async fn gateway_error_surfaces_as_external_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/opportunities"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = gateway(&server).get_opportunities().await.unwrap_err();
    assert!(matches!(err, AppError::ExternalApiError(_)));
}

#[tokio::test]
async fn drag_transition_persists_and_resets_probability() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/api/opportunities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            opportunity_json(id, "Catering Messe", "NEW_LEAD"),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/api/opportunities/{}/stage", id)))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let board = PipelineBoard::new(gateway(&server));
    board.seed().await.unwrap();

    let response = board
        .apply_stage_change(id, OpportunityStage::Qualification)
        .await
        .unwrap();
    assert_eq!(response.opportunity.stage, OpportunityStage::Qualification);
    assert_eq!(response.opportunity.probability, 25);
    assert_eq!(response.animation_ms, 300);

    let seeded_at: DateTime<Utc> = "2025-01-01T08:00:00Z".parse().unwrap();
    assert!(response.opportunity.updated_at > seeded_at);
}

#[tokio::test]
async fn rejected_transition_never_reaches_the_gateway() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/api/opportunities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            opportunity_json(id, "Altvertrag", "CLOSED_LOST"),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let board = PipelineBoard::new(gateway(&server));
    board.seed().await.unwrap();

    let err = board
        .apply_stage_change(id, OpportunityStage::NewLead)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::TransitionNotAllowed { .. }));
}

#[tokio::test]
async fn gateway_failure_rolls_back_the_stage_change() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/api/opportunities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            opportunity_json(id, "Catering Messe", "NEW_LEAD"),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/api/opportunities/{}/stage", id)))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let board = PipelineBoard::new(gateway(&server));
    board.seed().await.unwrap();

    let err = board
        .apply_stage_change(id, OpportunityStage::Proposal)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ExternalApiError(_)));

    // The board still shows the original stage.
    let json = board
        .board_json(&rust_pipeline_api::models::BoardFilters::default())
        .await
        .unwrap();
    assert!(json.contains("NEW_LEAD"));
}

#[tokio::test]
async fn reactivation_moves_lost_opportunities_to_qualification() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/api/opportunities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            opportunity_json(id, "Altvertrag Süd", "CLOSED_LOST"),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/api/opportunities/{}/stage", id)))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let board = PipelineBoard::new(gateway(&server));
    board.seed().await.unwrap();

    let response = board
        .apply_quick_action(id, QuickActionKind::Reactivate)
        .await
        .unwrap();
    assert_eq!(response.opportunity.stage, OpportunityStage::Qualification);
    assert_eq!(response.opportunity.probability, 25);

    // A committed reactivation bumps the audit timestamp.
    let seeded_at: DateTime<Utc> = "2025-01-01T08:00:00Z".parse().unwrap();
    assert!(response.opportunity.updated_at > seeded_at);
}

#[tokio::test]
async fn queue_drains_once_the_gateway_recovers() {
    let server = MockServer::start().await;

    // First replay attempt fails, everything after succeeds.
    Mock::given(method("POST"))
        .and(path("/api/contact-interactions"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/contact-interactions"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let queue = OfflineQueueService::new(
        Arc::new(MemoryStore::new()),
        GatewayReplayer::new(gateway(&server)),
        Arc::new(ConnectivityMonitor::new(true)),
        3,
        Duration::from_millis(10),
    );
    queue
        .enqueue(call_action(), ContactSnapshot::from(&contact()))
        .unwrap();

    let report = queue.process().await.unwrap();
    assert_eq!(report.replayed, 1);
    assert_eq!(report.dropped, 0);
    assert!(queue.queue().unwrap().is_empty());
}

#[tokio::test]
async fn failed_offline_execution_queues_instead_of_failing() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::new());
    let connectivity = Arc::new(ConnectivityMonitor::new(false));
    let queue = Arc::new(OfflineQueueService::new(
        store.clone(),
        GatewayReplayer::new(gateway(&server)),
        connectivity.clone(),
        3,
        Duration::from_millis(10),
    ));
    let execution = ActionExecutionService::new(
        store,
        gateway(&server),
        connectivity,
        queue.clone(),
        "49".to_string(),
    );

    // The call cannot be performed without a number, and offline that means
    // queue instead of hard failure.
    let mut c = contact();
    c.phone = None;
    c.mobile = None;

    let result = execution.execute(&call_action(), &c).await.unwrap();
    assert!(!result.success);
    assert!(result.requires_retry);
    assert_eq!(
        result.message,
        "Aktion wird ausgeführt, sobald Sie online sind"
    );
    assert_eq!(queue.queue().unwrap().len(), 1);
}

#[tokio::test]
async fn performable_action_succeeds_even_while_offline() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::new());
    let connectivity = Arc::new(ConnectivityMonitor::new(false));
    let queue = Arc::new(OfflineQueueService::new(
        store.clone(),
        GatewayReplayer::new(gateway(&server)),
        connectivity.clone(),
        3,
        Duration::from_millis(10),
    ));
    let execution = ActionExecutionService::new(
        store,
        gateway(&server),
        connectivity,
        queue.clone(),
        "49".to_string(),
    );

    // Deep links are built locally; a valid call needs no connectivity.
    let result = execution.execute(&call_action(), &contact()).await.unwrap();
    assert!(result.success);
    assert!(!result.requires_retry);
    assert_eq!(result.deep_link.as_deref(), Some("tel:0171555666"));
    assert!(queue.queue().unwrap().is_empty());
}

#[tokio::test]
async fn online_execution_builds_deep_link_and_records_interaction() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/contact-interactions"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let connectivity = Arc::new(ConnectivityMonitor::new(true));
    let queue = Arc::new(OfflineQueueService::new(
        store.clone(),
        GatewayReplayer::new(gateway(&server)),
        connectivity.clone(),
        3,
        Duration::from_millis(10),
    ));
    let execution = ActionExecutionService::new(
        store,
        gateway(&server),
        connectivity,
        queue,
        "49".to_string(),
    );

    let result = execution.execute(&call_action(), &contact()).await.unwrap();
    assert!(result.success);
    assert_eq!(result.deep_link.as_deref(), Some("tel:0171555666"));
    assert!(result.message.contains("erfolgreich"));

    let log = execution.interaction_log().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].action_type, ActionType::Call);
}

#[tokio::test]
async fn missing_channel_data_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/contact-interactions"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let connectivity = Arc::new(ConnectivityMonitor::new(true));
    let queue = Arc::new(OfflineQueueService::new(
        store.clone(),
        GatewayReplayer::new(gateway(&server)),
        connectivity.clone(),
        3,
        Duration::from_millis(10),
    ));
    let execution = ActionExecutionService::new(
        store,
        gateway(&server),
        connectivity,
        queue,
        "49".to_string(),
    );

    let mut c = contact();
    c.phone = None;
    c.mobile = None;

    let result = execution.execute(&call_action(), &c).await.unwrap();
    assert!(!result.success);
    assert!(!result.requires_retry);
    assert_eq!(result.error.as_deref(), Some("Keine Telefonnummer verfügbar"));
    assert_eq!(result.message, "Fehler: Keine Telefonnummer verfügbar");
}
