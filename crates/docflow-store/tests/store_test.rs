//! Integration tests run against both store implementations.

use chrono::{Duration, Utc};
use docflow_config::{AgentName, DocumentType, StepDefinition, WorkflowDefinition};
use docflow_store::{
  ActorType, DefinitionRegistry, ErrorType, EventType, Metadata, MemoryStore, SqliteStore,
  StepStatus, Store, StoreError, WorkflowEvent, WorkflowExecution, WorkflowState, WorkflowStep,
};
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::types::Json;

async fn sqlite_store() -> SqliteStore {
  // A single connection keeps every query on the same in-memory database.
  let pool = SqlitePoolOptions::new()
    .max_connections(1)
    .connect("sqlite::memory:")
    .await
    .expect("failed to open in-memory sqlite");
  let store = SqliteStore::new(pool);
  store.migrate().await.expect("migrations failed");
  store
}

fn new_id() -> String {
  uuid::Uuid::new_v4().to_string()
}

fn execution() -> WorkflowExecution {
  let now = Utc::now();
  WorkflowExecution {
    execution_id: new_id(),
    project_id: "project-1".to_string(),
    document_type: DocumentType::Ib,
    document_id: None,
    workflow_name: "ib-generation".to_string(),
    workflow_version: "1.0.0".to_string(),
    current_state: WorkflowState::Created,
    current_step: None,
    percent_complete: 0,
    started_at: now,
    completed_at: None,
    paused_at: None,
    resumed_at: None,
    error_code: None,
    error_message: None,
    retry_count: 0,
    max_retries: 3,
    checkpoint_data: None,
    triggered_by: Some("user-1".to_string()),
    metadata: Json(Metadata::new()),
    created_at: now,
    updated_at: now,
  }
}

fn step(execution_id: &str, name: &str, order: i32, agent: AgentName) -> WorkflowStep {
  let now = Utc::now();
  let mut metadata = Metadata::new();
  metadata.insert("retry_on_failure".to_string(), json!(true));
  WorkflowStep {
    step_id: new_id(),
    execution_id: execution_id.to_string(),
    step_name: name.to_string(),
    step_order: order,
    agent_name: agent,
    status: StepStatus::Pending,
    started_at: None,
    completed_at: None,
    duration_ms: None,
    input_data: None,
    output_data: None,
    error_type: None,
    error_message: None,
    error_stack: None,
    retry_attempt: 0,
    metadata: Json(metadata),
    created_at: now,
    updated_at: now,
  }
}

fn event(execution_id: &str, event_type: EventType, offset_ms: i64) -> WorkflowEvent {
  WorkflowEvent {
    event_id: new_id(),
    execution_id: execution_id.to_string(),
    event_type,
    event_data: None,
    actor_id: None,
    actor_type: ActorType::System,
    step_id: None,
    previous_state: None,
    new_state: Some(WorkflowState::Created),
    metadata: None,
    created_at: Utc::now() + Duration::milliseconds(offset_ms),
  }
}

fn definition(name: &str, version: &str, active: bool) -> WorkflowDefinition {
  WorkflowDefinition {
    name: name.to_string(),
    version: version.to_string(),
    description: None,
    document_type: DocumentType::Ib,
    steps: vec![
      StepDefinition::new("enrich", AgentName::Regdata),
      StepDefinition::new("compose", AgentName::Composer),
    ],
    is_active: active,
    is_default: false,
    created_by: None,
    metadata: Metadata::new(),
  }
}

async fn check_execution_round_trip(store: &dyn Store) {
  let mut exec = execution();
  let steps = vec![
    step(&exec.execution_id, "compose", 2, AgentName::Composer),
    step(&exec.execution_id, "enrich", 1, AgentName::Regdata),
  ];
  store.create_execution(&exec, &steps).await.unwrap();

  let loaded = store.get_execution(&exec.execution_id).await.unwrap();
  assert_eq!(loaded.execution_id, exec.execution_id);
  assert_eq!(loaded.document_type, DocumentType::Ib);
  assert_eq!(loaded.current_state, WorkflowState::Created);
  assert_eq!(loaded.triggered_by.as_deref(), Some("user-1"));

  let listed = store.list_steps(&exec.execution_id).await.unwrap();
  let order: Vec<_> = listed.iter().map(|s| s.step_name.as_str()).collect();
  assert_eq!(order, vec!["enrich", "compose"]);

  exec.current_state = WorkflowState::Failed;
  exec.completed_at = Some(Utc::now());
  exec.error_code = Some("E1".to_string());
  exec.checkpoint_data = Some(Json(json!({"section": 4})));
  store.update_execution(&exec).await.unwrap();

  let loaded = store.get_execution(&exec.execution_id).await.unwrap();
  assert_eq!(loaded.current_state, WorkflowState::Failed);
  assert!(loaded.completed_at.is_some());
  assert_eq!(loaded.error_code.as_deref(), Some("E1"));
  assert_eq!(loaded.checkpoint_data.unwrap().0["section"], 4);
}

async fn check_step_update(store: &dyn Store) {
  let exec = execution();
  let mut s = step(&exec.execution_id, "write", 1, AgentName::Writer);
  store.create_execution(&exec, std::slice::from_ref(&s)).await.unwrap();

  s.status = StepStatus::Failed;
  s.error_type = Some(ErrorType::Transient);
  s.error_message = Some("timeout".to_string());
  s.output_data = Some(Json(json!({"partial": true})));
  s.duration_ms = Some(1500);
  store.update_step(&s).await.unwrap();

  let loaded = store.get_step(&s.step_id).await.unwrap();
  assert_eq!(loaded.status, StepStatus::Failed);
  assert_eq!(loaded.error_type, Some(ErrorType::Transient));
  assert_eq!(loaded.duration_ms, Some(1500));
  assert!(loaded.retry_on_failure());
}

async fn check_not_found(store: &dyn Store) {
  assert!(matches!(
    store.get_execution("missing").await,
    Err(StoreError::NotFound { entity: "execution", .. })
  ));
  assert!(matches!(
    store.get_step("missing").await,
    Err(StoreError::NotFound { entity: "step", .. })
  ));

  let ghost = execution();
  assert!(matches!(
    store.update_execution(&ghost).await,
    Err(StoreError::NotFound { .. })
  ));
  assert!(store.list_steps("missing").await.unwrap().is_empty());
}

async fn check_refresh_progress(store: &dyn Store) {
  let exec = execution();
  let mut steps = vec![
    step(&exec.execution_id, "enrich", 1, AgentName::Regdata),
    step(&exec.execution_id, "compose", 2, AgentName::Composer),
    step(&exec.execution_id, "write", 3, AgentName::Writer),
  ];
  store.create_execution(&exec, &steps).await.unwrap();

  steps[0].status = StepStatus::Completed;
  steps[1].status = StepStatus::Skipped;
  for s in &steps[..2] {
    store.update_step(s).await.unwrap();
  }

  let later = Utc::now() + Duration::seconds(5);
  let percent = store
    .refresh_progress(&exec.execution_id, "compose", later)
    .await
    .unwrap();
  assert_eq!(percent, 33);

  let loaded = store.get_execution(&exec.execution_id).await.unwrap();
  assert_eq!(loaded.percent_complete, 33);
  assert_eq!(loaded.current_step.as_deref(), Some("compose"));
  assert_eq!(loaded.updated_at.timestamp_millis(), later.timestamp_millis());

  steps[1].status = StepStatus::Completed;
  store.update_step(&steps[1]).await.unwrap();
  let percent = store
    .refresh_progress(&exec.execution_id, "compose", later)
    .await
    .unwrap();
  assert_eq!(percent, 67);

  let empty = execution();
  store.create_execution(&empty, &[]).await.unwrap();
  assert_eq!(
    store
      .refresh_progress(&empty.execution_id, "none", later)
      .await
      .unwrap(),
    0
  );

  assert!(matches!(
    store.refresh_progress("missing", "enrich", later).await,
    Err(StoreError::NotFound { entity: "execution", .. })
  ));
}

async fn check_events_newest_first(store: &dyn Store) {
  let exec = execution();
  store.create_execution(&exec, &[]).await.unwrap();

  let first = event(&exec.execution_id, EventType::Started, 0);
  let second = event(&exec.execution_id, EventType::Paused, 10);
  let third = event(&exec.execution_id, EventType::Resumed, 20);
  for e in [&first, &second, &third] {
    store.insert_event(e).await.unwrap();
  }

  let events = store.list_events(&exec.execution_id).await.unwrap();
  let types: Vec<_> = events.iter().map(|e| e.event_type).collect();
  assert_eq!(
    types,
    vec![EventType::Resumed, EventType::Paused, EventType::Started]
  );
}

async fn check_definitions(registry: &dyn DefinitionRegistry) {
  registry
    .save_definition(&definition("ib-generation", "1.0.0", true))
    .await
    .unwrap();
  registry
    .save_definition(&definition("csr-generation", "1.0.0", false))
    .await
    .unwrap();

  let found = registry
    .find_active_definition("ib-generation")
    .await
    .unwrap()
    .unwrap();
  assert_eq!(found.version, "1.0.0");
  assert_eq!(found.steps.len(), 2);
  assert_eq!(found.steps[0].agent, AgentName::Regdata);

  assert!(
    registry
      .find_active_definition("csr-generation")
      .await
      .unwrap()
      .is_none()
  );
  assert!(
    registry
      .find_active_definition("unknown")
      .await
      .unwrap()
      .is_none()
  );

  let names: Vec<_> = registry
    .list_definitions()
    .await
    .unwrap()
    .into_iter()
    .map(|d| d.name)
    .collect();
  assert_eq!(names, vec!["csr-generation", "ib-generation"]);
}

async fn check_definition_upsert(registry: &dyn DefinitionRegistry) {
  let mut def = definition("icf-generation", "1.0.0", true);
  registry.save_definition(&def).await.unwrap();

  def.is_active = false;
  registry.save_definition(&def).await.unwrap();

  assert!(
    registry
      .find_active_definition("icf-generation")
      .await
      .unwrap()
      .is_none()
  );
  assert_eq!(registry.list_definitions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_sqlite_execution_round_trip() {
  check_execution_round_trip(&sqlite_store().await).await;
}

#[tokio::test]
async fn test_memory_execution_round_trip() {
  check_execution_round_trip(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_sqlite_step_update() {
  check_step_update(&sqlite_store().await).await;
}

#[tokio::test]
async fn test_memory_step_update() {
  check_step_update(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_sqlite_not_found() {
  check_not_found(&sqlite_store().await).await;
}

#[tokio::test]
async fn test_memory_not_found() {
  check_not_found(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_sqlite_refresh_progress() {
  check_refresh_progress(&sqlite_store().await).await;
}

#[tokio::test]
async fn test_memory_refresh_progress() {
  check_refresh_progress(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_sqlite_events_newest_first() {
  check_events_newest_first(&sqlite_store().await).await;
}

#[tokio::test]
async fn test_memory_events_newest_first() {
  check_events_newest_first(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_sqlite_definitions() {
  check_definitions(&sqlite_store().await).await;
}

#[tokio::test]
async fn test_memory_definitions() {
  check_definitions(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_sqlite_definition_upsert() {
  check_definition_upsert(&sqlite_store().await).await;
}

#[tokio::test]
async fn test_memory_definition_upsert() {
  check_definition_upsert(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_memory_with_definitions() {
  let store = MemoryStore::with_definitions([definition("sap-generation", "2", true)]);
  let found = store
    .find_active_definition("sap-generation")
    .await
    .unwrap()
    .unwrap();
  assert_eq!(found.version, "2");
}

#[tokio::test]
async fn test_sqlite_create_is_atomic() {
  let store = sqlite_store().await;
  let exec = execution();
  // Duplicate step_order violates the (execution_id, step_order) constraint.
  let steps = vec![
    step(&exec.execution_id, "enrich", 1, AgentName::Regdata),
    step(&exec.execution_id, "compose", 1, AgentName::Composer),
  ];

  let result = store.create_execution(&exec, &steps).await;
  assert!(matches!(result, Err(StoreError::Database(_))));

  assert!(matches!(
    store.get_execution(&exec.execution_id).await,
    Err(StoreError::NotFound { .. })
  ));
  assert!(store.list_steps(&exec.execution_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sqlite_events_are_append_only() {
  let store = sqlite_store().await;
  let exec = execution();
  store.create_execution(&exec, &[]).await.unwrap();
  let e = event(&exec.execution_id, EventType::Started, 0);
  store.insert_event(&e).await.unwrap();

  let update = sqlx::query("UPDATE workflow_events SET actor_type = 'user' WHERE event_id = ?")
    .bind(&e.event_id)
    .execute(store.pool())
    .await;
  assert!(update.is_err());

  let delete = sqlx::query("DELETE FROM workflow_events WHERE event_id = ?")
    .bind(&e.event_id)
    .execute(store.pool())
    .await;
  assert!(delete.is_err());

  assert_eq!(store.list_events(&exec.execution_id).await.unwrap().len(), 1);
}
