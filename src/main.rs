mod config;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use docflow_config::{DocumentType, load_definitions};
use docflow_engine::{
  ControlAction, ControlOutcome, CreateExecution, ExecutionStatus, Metadata, WorkflowEngine,
  format_duration,
};
use docflow_orchestrator::{DriveOutcome, WorkflowDriver};
use docflow_store::{DefinitionRegistry, SqliteStore};

use crate::config::CliConfig;

/// Docflow - durable workflow orchestration for document generation
#[derive(Parser)]
#[command(name = "docflow")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.docflow)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Database URL (default: sqlite://<data-dir>/docflow.db)
  #[arg(long, global = true)]
  database_url: Option<String>,

  /// Path to the config file (default: <data-dir>/config.json)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Manage workflow definitions
  Definitions {
    #[command(subcommand)]
    command: DefinitionsCommand,
  },

  /// Create an execution from the active definition
  Create {
    #[arg(long)]
    project_id: String,

    /// ib, protocol, icf, csr or sap
    #[arg(long)]
    document_type: DocumentType,

    /// Workflow to run (default: <document-type>-generation)
    #[arg(long)]
    workflow_name: Option<String>,

    #[arg(long)]
    document_id: Option<String>,

    /// Who asked for the execution
    #[arg(long)]
    triggered_by: Option<String>,

    /// Metadata as a JSON object
    #[arg(long)]
    metadata: Option<String>,
  },

  /// Show the status of an execution
  Status {
    execution_id: String,

    /// Leave out the step list
    #[arg(long)]
    no_steps: bool,

    /// Include the event timeline
    #[arg(long)]
    events: bool,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
  },

  /// Pause, resume, retry or fail an execution
  Control {
    execution_id: String,

    #[command(subcommand)]
    action: ControlCommand,
  },

  /// Drive an execution with the agents from the config file
  Run { execution_id: String },
}

#[derive(Subcommand)]
enum DefinitionsCommand {
  /// Load definitions from a JSON file (one definition or an array)
  Load { file: PathBuf },

  /// List stored definitions
  List,
}

#[derive(Subcommand)]
enum ControlCommand {
  Pause {
    #[arg(long)]
    actor_id: Option<String>,
  },
  Resume {
    #[arg(long)]
    actor_id: Option<String>,
  },
  Retry {
    #[arg(long)]
    step_id: String,
  },
  Fail {
    #[arg(long)]
    error_code: String,
    #[arg(long)]
    error_message: String,
  },
}

impl From<ControlCommand> for ControlAction {
  fn from(command: ControlCommand) -> Self {
    match command {
      ControlCommand::Pause { actor_id } => ControlAction::Pause { actor_id },
      ControlCommand::Resume { actor_id } => ControlAction::Resume { actor_id },
      ControlCommand::Retry { step_id } => ControlAction::Retry { step_id },
      ControlCommand::Fail {
        error_code,
        error_message,
      } => ControlAction::Fail {
        error_code,
        error_message,
      },
    }
  }
}

/// Everything a command needs.
struct App {
  store: Arc<SqliteStore>,
  engine: Arc<WorkflowEngine>,
  config: CliConfig,
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing();

  let Some(command) = cli.command else {
    println!("docflow - use --help to see available commands");
    return Ok(());
  };

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".docflow"),
  };
  let config_path = cli
    .config
    .unwrap_or_else(|| data_dir.join("config.json"));

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    let app = open(&data_dir, cli.database_url, &config_path).await?;
    dispatch(&app, command).await
  })
}

/// Logs go to stderr so JSON on stdout stays clean. `RUST_LOG` overrides the
/// default `info` level.
fn init_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .init();
}

async fn open(
  data_dir: &Path,
  database_url: Option<String>,
  config_path: &Path,
) -> Result<App> {
  tokio::fs::create_dir_all(data_dir)
    .await
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

  let database_url = database_url
    .unwrap_or_else(|| format!("sqlite://{}", data_dir.join("docflow.db").display()));
  let options = SqliteConnectOptions::from_str(&database_url)
    .with_context(|| format!("invalid database url: {database_url}"))?
    .create_if_missing(true);
  let pool = SqlitePoolOptions::new()
    .connect_with(options)
    .await
    .with_context(|| format!("failed to open database: {database_url}"))?;

  let store = Arc::new(SqliteStore::new(pool));
  store.migrate().await.context("failed to run migrations")?;
  debug!(database_url = %database_url, "store ready");

  let config = CliConfig::load(config_path)?;
  let engine = Arc::new(WorkflowEngine::new(
    store.clone(),
    store.clone(),
    config.engine.clone(),
  ));

  Ok(App {
    store,
    engine,
    config,
  })
}

async fn dispatch(app: &App, command: Commands) -> Result<()> {
  match command {
    Commands::Definitions { command } => match command {
      DefinitionsCommand::Load { file } => load_definitions_cmd(app, &file).await,
      DefinitionsCommand::List => list_definitions(app).await,
    },
    Commands::Create {
      project_id,
      document_type,
      workflow_name,
      document_id,
      triggered_by,
      metadata,
    } => {
      let mut input = CreateExecution::new(project_id, document_type);
      if let Some(name) = workflow_name {
        input = input.workflow_name(name);
      }
      input.document_id = document_id;
      input.triggered_by = triggered_by;
      if let Some(raw) = metadata {
        let metadata: Metadata =
          serde_json::from_str(&raw).context("--metadata must be a JSON object")?;
        input = input.metadata(metadata);
      }

      let execution = app
        .engine
        .create_execution(input)
        .await
        .context("failed to create execution")?;
      eprintln!(
        "Created execution for {} v{}",
        execution.workflow_name, execution.workflow_version
      );
      println!("{}", execution.execution_id);
      Ok(())
    }
    Commands::Status {
      execution_id,
      no_steps,
      events,
      json,
    } => {
      let status = app
        .engine
        .status(&execution_id, !no_steps, events)
        .await
        .context("failed to read execution status")?;
      if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
      } else {
        print_status(&status);
      }
      Ok(())
    }
    Commands::Control {
      execution_id,
      action,
    } => {
      let outcome = app
        .engine
        .control(&execution_id, action.into())
        .await
        .context("control action failed")?;
      match &outcome {
        ControlOutcome::Execution(execution) => eprintln!(
          "Execution {} is now {}",
          execution.execution_id,
          execution.current_state.display_name()
        ),
        ControlOutcome::Step(step) => eprintln!(
          "Step {} is {} (attempt {})",
          step.step_name,
          step.status.display_name(),
          step.retry_attempt
        ),
      }
      println!("{}", serde_json::to_string_pretty(&outcome)?);
      Ok(())
    }
    Commands::Run { execution_id } => run_execution(app, &execution_id).await,
  }
}

async fn load_definitions_cmd(app: &App, file: &Path) -> Result<()> {
  let definitions = load_definitions(file)
    .with_context(|| format!("failed to load definitions from {}", file.display()))?;
  for definition in &definitions {
    app
      .store
      .save_definition(definition)
      .await
      .with_context(|| format!("failed to save definition {}", definition.name))?;
    eprintln!(
      "Saved {} v{} ({} steps)",
      definition.name,
      definition.version,
      definition.steps.len()
    );
  }
  Ok(())
}

async fn list_definitions(app: &App) -> Result<()> {
  let definitions = app
    .store
    .list_definitions()
    .await
    .context("failed to list definitions")?;
  if definitions.is_empty() {
    eprintln!("No definitions stored; load some with `docflow definitions load <file>`");
  }
  for definition in definitions {
    println!(
      "{:<28} {:<10} {:<9} {:>2} steps{}",
      definition.name,
      definition.version,
      definition.document_type.as_str(),
      definition.steps.len(),
      if definition.is_active { "" } else { "  (inactive)" }
    );
  }
  Ok(())
}

async fn run_execution(app: &App, execution_id: &str) -> Result<()> {
  let agents = app.config.agent_registry();
  if agents.is_empty() {
    bail!("no agents configured; add an \"agents\" section to the config file");
  }
  let driver = WorkflowDriver::new(app.engine.clone(), agents, app.config.driver.clone());

  let cancel = CancellationToken::new();
  let ctrl_c = {
    let cancel = cancel.clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("Interrupted, pausing execution...");
        cancel.cancel();
      }
    })
  };

  let outcome = driver
    .run(execution_id, cancel)
    .await
    .context("driver failed")?;
  ctrl_c.abort();

  let execution = app.engine.execution(execution_id).await?;
  println!("{}", serde_json::to_string_pretty(&execution)?);
  match outcome {
    DriveOutcome::Completed => eprintln!("Execution completed"),
    DriveOutcome::Paused => {
      eprintln!("Execution paused; resume with `docflow control {execution_id} resume`")
    }
    DriveOutcome::Failed => bail!(
      "execution failed: {}",
      execution.error_message.as_deref().unwrap_or("unknown error")
    ),
  }
  Ok(())
}

fn print_status(status: &ExecutionStatus) {
  let execution = &status.execution;
  println!(
    "Execution {} ({} v{})",
    execution.execution_id, execution.workflow_name, execution.workflow_version
  );
  println!("State:    {}", execution.current_state.display_name());
  println!(
    "Progress: {}% ({}/{} steps)",
    execution.percent_complete, status.steps_completed, status.steps_total
  );
  if let Some(step) = &execution.current_step {
    println!("Current:  {step}");
  }
  if execution.retry_count > 0 {
    println!(
      "Retries:  {} (max {} per step)",
      execution.retry_count, execution.max_retries
    );
  }
  if let Some(message) = &execution.error_message {
    println!(
      "Error:    [{}] {}",
      execution.error_code.as_deref().unwrap_or("-"),
      message
    );
  }

  if let Some(steps) = &status.steps {
    println!();
    println!("Steps:");
    for step in steps {
      let duration = step.duration_ms.map(format_duration).unwrap_or_default();
      let retries = if step.retry_attempt > 0 {
        format!("  retry {}", step.retry_attempt)
      } else {
        String::new()
      };
      println!(
        "  {:>2}. {:<20} {:<18} {:<10} {:>8}{}",
        step.step_order,
        step.step_name,
        step.agent_name.as_str(),
        step.status.display_name(),
        duration,
        retries
      );
      if let Some(message) = &step.error_message {
        println!("      error: {message}");
      }
    }
  }

  if let Some(events) = &status.events {
    println!();
    println!("Events:");
    for event in events {
      let transition = match (event.previous_state, event.new_state) {
        (Some(from), Some(to)) => format!(" {} -> {}", from.display_name(), to.display_name()),
        (None, Some(to)) => format!(" -> {}", to.display_name()),
        _ => String::new(),
      };
      let status = event
        .metadata
        .as_ref()
        .and_then(|m| m.get("status"))
        .and_then(|s| s.as_str())
        .map(|s| format!(" [{s}]"))
        .unwrap_or_default();
      println!(
        "  {}  {:?}{}{}",
        event.created_at.format("%Y-%m-%d %H:%M:%S"),
        event.event_type,
        transition,
        status
      );
    }
  }
}
