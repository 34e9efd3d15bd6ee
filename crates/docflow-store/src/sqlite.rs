use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docflow_config::{DocumentType, StepDefinition, WorkflowDefinition};
use sqlx::types::Json;
use sqlx::{FromRow, SqlitePool};

use crate::error::StoreError;
use crate::types::{Metadata, WorkflowEvent, WorkflowExecution, WorkflowStep};
use crate::{DefinitionRegistry, Store};

const EXECUTION_COLUMNS: &str = r#"
  execution_id, project_id, document_type, document_id, workflow_name, workflow_version,
  current_state, current_step, percent_complete, started_at, completed_at, paused_at,
  resumed_at, error_code, error_message, retry_count, max_retries, checkpoint_data,
  triggered_by, metadata, created_at, updated_at
"#;

const STEP_COLUMNS: &str = r#"
  step_id, execution_id, step_name, step_order, agent_name, status, started_at,
  completed_at, duration_ms, input_data, output_data, error_type, error_message,
  error_stack, retry_attempt, metadata, created_at, updated_at
"#;

const EVENT_COLUMNS: &str = r#"
  event_id, execution_id, event_type, event_data, actor_id, actor_type, step_id,
  previous_state, new_state, metadata, created_at
"#;

const DEFINITION_COLUMNS: &str = r#"
  name, version, description, document_type, steps, is_active, is_default, created_by, metadata
"#;

/// SQLite-based store implementation.
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), StoreError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await?;
    Ok(())
  }

  /// The underlying pool.
  pub fn pool(&self) -> &SqlitePool {
    &self.pool
  }
}

#[derive(FromRow)]
struct DefinitionRow {
  name: String,
  version: String,
  description: Option<String>,
  document_type: DocumentType,
  steps: Json<Vec<StepDefinition>>,
  is_active: bool,
  is_default: bool,
  created_by: Option<String>,
  metadata: Json<Metadata>,
}

impl From<DefinitionRow> for WorkflowDefinition {
  fn from(row: DefinitionRow) -> Self {
    WorkflowDefinition {
      name: row.name,
      version: row.version,
      description: row.description,
      document_type: row.document_type,
      steps: row.steps.0,
      is_active: row.is_active,
      is_default: row.is_default,
      created_by: row.created_by,
      metadata: row.metadata.0,
    }
  }
}

#[async_trait]
impl Store for SqliteStore {
  async fn create_execution(
    &self,
    execution: &WorkflowExecution,
    steps: &[WorkflowStep],
  ) -> Result<(), StoreError> {
    let mut tx = self.pool.begin().await?;

    sqlx::query(&format!(
      "INSERT INTO workflow_executions ({EXECUTION_COLUMNS})
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&execution.execution_id)
    .bind(&execution.project_id)
    .bind(execution.document_type)
    .bind(&execution.document_id)
    .bind(&execution.workflow_name)
    .bind(&execution.workflow_version)
    .bind(execution.current_state)
    .bind(&execution.current_step)
    .bind(execution.percent_complete)
    .bind(execution.started_at)
    .bind(execution.completed_at)
    .bind(execution.paused_at)
    .bind(execution.resumed_at)
    .bind(&execution.error_code)
    .bind(&execution.error_message)
    .bind(execution.retry_count)
    .bind(execution.max_retries)
    .bind(&execution.checkpoint_data)
    .bind(&execution.triggered_by)
    .bind(&execution.metadata)
    .bind(execution.created_at)
    .bind(execution.updated_at)
    .execute(&mut *tx)
    .await?;

    for step in steps {
      sqlx::query(&format!(
        "INSERT INTO workflow_steps ({STEP_COLUMNS})
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
      ))
      .bind(&step.step_id)
      .bind(&step.execution_id)
      .bind(&step.step_name)
      .bind(step.step_order)
      .bind(step.agent_name)
      .bind(step.status)
      .bind(step.started_at)
      .bind(step.completed_at)
      .bind(step.duration_ms)
      .bind(&step.input_data)
      .bind(&step.output_data)
      .bind(step.error_type)
      .bind(&step.error_message)
      .bind(&step.error_stack)
      .bind(step.retry_attempt)
      .bind(&step.metadata)
      .bind(step.created_at)
      .bind(step.updated_at)
      .execute(&mut *tx)
      .await?;
    }

    tx.commit().await?;
    Ok(())
  }

  async fn get_execution(&self, execution_id: &str) -> Result<WorkflowExecution, StoreError> {
    sqlx::query_as(&format!(
      "SELECT {EXECUTION_COLUMNS} FROM workflow_executions WHERE execution_id = ?"
    ))
    .bind(execution_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| StoreError::not_found("execution", execution_id))
  }

  async fn update_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError> {
    let result = sqlx::query(
      r#"
            UPDATE workflow_executions
            SET current_state = ?, current_step = ?, percent_complete = ?, completed_at = ?,
                paused_at = ?, resumed_at = ?, error_code = ?, error_message = ?,
                retry_count = ?, max_retries = ?, checkpoint_data = ?, metadata = ?,
                updated_at = ?
            WHERE execution_id = ?
            "#,
    )
    .bind(execution.current_state)
    .bind(&execution.current_step)
    .bind(execution.percent_complete)
    .bind(execution.completed_at)
    .bind(execution.paused_at)
    .bind(execution.resumed_at)
    .bind(&execution.error_code)
    .bind(&execution.error_message)
    .bind(execution.retry_count)
    .bind(execution.max_retries)
    .bind(&execution.checkpoint_data)
    .bind(&execution.metadata)
    .bind(execution.updated_at)
    .bind(&execution.execution_id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(StoreError::not_found("execution", &execution.execution_id));
    }
    Ok(())
  }

  async fn get_step(&self, step_id: &str) -> Result<WorkflowStep, StoreError> {
    sqlx::query_as(&format!(
      "SELECT {STEP_COLUMNS} FROM workflow_steps WHERE step_id = ?"
    ))
    .bind(step_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| StoreError::not_found("step", step_id))
  }

  async fn update_step(&self, step: &WorkflowStep) -> Result<(), StoreError> {
    let result = sqlx::query(
      r#"
            UPDATE workflow_steps
            SET status = ?, started_at = ?, completed_at = ?, duration_ms = ?, input_data = ?,
                output_data = ?, error_type = ?, error_message = ?, error_stack = ?,
                retry_attempt = ?, metadata = ?, updated_at = ?
            WHERE step_id = ?
            "#,
    )
    .bind(step.status)
    .bind(step.started_at)
    .bind(step.completed_at)
    .bind(step.duration_ms)
    .bind(&step.input_data)
    .bind(&step.output_data)
    .bind(step.error_type)
    .bind(&step.error_message)
    .bind(&step.error_stack)
    .bind(step.retry_attempt)
    .bind(&step.metadata)
    .bind(step.updated_at)
    .bind(&step.step_id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(StoreError::not_found("step", &step.step_id));
    }
    Ok(())
  }

  async fn refresh_progress(
    &self,
    execution_id: &str,
    current_step: &str,
    updated_at: DateTime<Utc>,
  ) -> Result<i32, StoreError> {
    // Single statement, so the count and the write see the same step rows.
    // Rounds halves up, like `percent_complete`.
    let percent: Option<i32> = sqlx::query_scalar(
      r#"
            UPDATE workflow_executions
            SET percent_complete = (
                  SELECT CASE WHEN COUNT(*) = 0 THEN 0
                    ELSE (200 * SUM(status = 'completed') + COUNT(*)) / (2 * COUNT(*))
                  END
                  FROM workflow_steps
                  WHERE execution_id = ?
                ),
                current_step = ?,
                updated_at = ?
            WHERE execution_id = ?
            RETURNING percent_complete
            "#,
    )
    .bind(execution_id)
    .bind(current_step)
    .bind(updated_at)
    .bind(execution_id)
    .fetch_optional(&self.pool)
    .await?;

    percent.ok_or_else(|| StoreError::not_found("execution", execution_id))
  }

  async fn list_steps(&self, execution_id: &str) -> Result<Vec<WorkflowStep>, StoreError> {
    let steps = sqlx::query_as(&format!(
      "SELECT {STEP_COLUMNS} FROM workflow_steps WHERE execution_id = ? ORDER BY step_order ASC"
    ))
    .bind(execution_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(steps)
  }

  async fn insert_event(&self, event: &WorkflowEvent) -> Result<(), StoreError> {
    sqlx::query(&format!(
      "INSERT INTO workflow_events ({EVENT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&event.event_id)
    .bind(&event.execution_id)
    .bind(event.event_type)
    .bind(&event.event_data)
    .bind(&event.actor_id)
    .bind(event.actor_type)
    .bind(&event.step_id)
    .bind(event.previous_state)
    .bind(event.new_state)
    .bind(&event.metadata)
    .bind(event.created_at)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn list_events(&self, execution_id: &str) -> Result<Vec<WorkflowEvent>, StoreError> {
    // rowid breaks ties between events stamped within the same instant.
    let events = sqlx::query_as(&format!(
      "SELECT {EVENT_COLUMNS} FROM workflow_events WHERE execution_id = ?
       ORDER BY created_at DESC, rowid DESC"
    ))
    .bind(execution_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(events)
  }
}

#[async_trait]
impl DefinitionRegistry for SqliteStore {
  async fn find_active_definition(
    &self,
    name: &str,
  ) -> Result<Option<WorkflowDefinition>, StoreError> {
    let row: Option<DefinitionRow> = sqlx::query_as(&format!(
      "SELECT {DEFINITION_COLUMNS} FROM workflow_definitions
       WHERE name = ? AND is_active = 1
       ORDER BY updated_at DESC, rowid DESC
       LIMIT 1"
    ))
    .bind(name)
    .fetch_optional(&self.pool)
    .await?;
    Ok(row.map(WorkflowDefinition::from))
  }

  async fn save_definition(&self, definition: &WorkflowDefinition) -> Result<(), StoreError> {
    let now = Utc::now();
    sqlx::query(
      r#"
            INSERT INTO workflow_definitions
              (name, version, description, document_type, steps, is_active, is_default,
               created_by, metadata, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (name, version) DO UPDATE SET
              description = excluded.description,
              document_type = excluded.document_type,
              steps = excluded.steps,
              is_active = excluded.is_active,
              is_default = excluded.is_default,
              created_by = excluded.created_by,
              metadata = excluded.metadata,
              updated_at = excluded.updated_at
            "#,
    )
    .bind(&definition.name)
    .bind(&definition.version)
    .bind(&definition.description)
    .bind(definition.document_type)
    .bind(Json(&definition.steps))
    .bind(definition.is_active)
    .bind(definition.is_default)
    .bind(&definition.created_by)
    .bind(Json(&definition.metadata))
    .bind(now)
    .bind(now)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn list_definitions(&self) -> Result<Vec<WorkflowDefinition>, StoreError> {
    let rows: Vec<DefinitionRow> = sqlx::query_as(&format!(
      "SELECT {DEFINITION_COLUMNS} FROM workflow_definitions ORDER BY name ASC, version ASC"
    ))
    .fetch_all(&self.pool)
    .await?;
    Ok(rows.into_iter().map(WorkflowDefinition::from).collect())
  }
}
