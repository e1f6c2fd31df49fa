//! # Command Line Interface
//!
//! Drives a unit from the shell: deliver lifecycle events, run actions, and
//! simulate the host platform (relations, leadership, bindings). State lives
//! in a directory between invocations, see [`unit`].

pub mod output;
pub mod unit;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use crate::config::OperatorConfig;
use crate::events::{ActionRequest, Event, EventHandler, RelationEvent};
use crate::host::{Host, LocalHost, RelationId, UnitStatus};
use crate::influxdb::{HttpInfluxDbClient, SystemInstaller};
use crate::observability::{init_logging, log_config_info};
use crate::operator::{InfluxDbClientOperator, InfluxDbOperator};
use crate::scheduler::{BackoffPolicy, DispatchReport, EventScheduler};
use crate::secrets::{CachedSecretStore, GrantedSecretView, InMemorySecretStore, SecretInfo};
use output::{parse_param, print_output, OutputFormat};
use unit::{UnitFiles, UnitState};

#[derive(Parser)]
#[command(name = "influxdb-operator")]
#[command(about = "InfluxDB lifecycle operator")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// State directory override
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Which side of the relation this unit plays
    #[arg(long, value_enum, default_value_t = Role::Server, global = true)]
    pub role: Role,

    /// Read secrets from this file instead of the state directory
    #[arg(long, global = true)]
    pub secrets_file: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json, global = true)]
    pub output: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Role {
    /// Runs next to InfluxDB and provides credentials
    Server,
    /// Consumes credentials from a related InfluxDB application
    Client,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deliver a lifecycle event
    Dispatch {
        #[arg(value_enum)]
        event: EventKind,

        /// Relation id for relation events
        #[arg(long)]
        relation: Option<u64>,
    },

    /// Run an action
    Action {
        name: String,

        /// Action parameter as key=value; repeatable
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },

    /// Redeliver due deferred events and rotate due secrets
    Run,

    /// Show unit status and pending work
    Status,

    /// Show the effective configuration
    Config,

    /// Simulate the host platform
    Host {
        #[command(subcommand)]
        command: HostCommands,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EventKind {
    Install,
    Start,
    UpdateStatus,
    RelationJoined,
    RelationChanged,
    RelationBroken,
}

#[derive(Subcommand)]
pub enum HostCommands {
    /// Establish a relation and print its id
    Relate {
        /// Relation endpoint name
        name: String,
        /// Remote application name
        remote_app: String,
        /// Relation id assigned on the other side; generated when omitted
        #[arg(long)]
        id: Option<u64>,
    },

    /// Remove a relation
    Unrelate { relation: u64 },

    /// Grant or take leadership
    SetLeader {
        #[arg(action = clap::ArgAction::Set)]
        leader: bool,
    },

    /// Set the address of a network binding
    Bind { binding: String, address: String },

    /// Write a key on the remote application's side of a relation
    SetRemoteData { relation: u64, key: String, value: String },
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = OperatorConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if cli.verbose {
        config.observability.log_level = "debug".to_string();
    }
    init_logging(&config.observability)?;
    log_config_info(&config);

    let dir = cli.state_dir.clone().unwrap_or_else(|| config.unit.state_dir.clone());
    let files = UnitFiles::new(dir).with_secrets_file(cli.secrets_file.clone());
    files.ensure_dir().await?;

    let host = files.load_host(&config.unit.app_name).await?;
    let secrets = files.load_secrets().await?;
    let mut state = files.load_state().await?;

    match cli.command {
        Commands::Dispatch { event, relation } => {
            let event = build_event(&host, event, relation).await?;
            let report = dispatch(&cli.role, &config, &host, &secrets, &mut state, Some(event)).await?;
            print_output(&report, cli.output)?;
        }
        Commands::Action { name, params } => {
            let request =
                params.into_iter().fold(ActionRequest::new(name), |r, (k, v)| r.with_param(k, v));
            let result = run_action(&cli.role, &config, &host, &secrets, &state, &request).await?;
            print_output(&result, cli.output)?;
            if result.contains_key("error") {
                save(&files, &host, &secrets, &state, cli.role).await?;
                anyhow::bail!("action '{}' failed", request.name);
            }
        }
        Commands::Run => {
            let report = dispatch(&cli.role, &config, &host, &secrets, &mut state, None).await?;
            print_output(&report, cli.output)?;
        }
        Commands::Status => {
            let report = status_report(&cli.role, &host, &secrets, &state).await?;
            print_output(&report, cli.output)?;
        }
        Commands::Config => print_output(&config, cli.output)?,
        Commands::Host { command } => handle_host_command(command, &host, cli.output).await?,
    }

    save(&files, &host, &secrets, &state, cli.role).await
}

async fn save(
    files: &UnitFiles,
    host: &LocalHost,
    secrets: &InMemorySecretStore,
    state: &UnitState,
    role: Role,
) -> anyhow::Result<()> {
    host.save(&files.host_path()).await?;
    // A client never owns the store it reads from.
    if role == Role::Server {
        secrets.save(&files.secrets_path()).await?;
    }
    files.save_state(state).await?;
    Ok(())
}

async fn build_event(host: &LocalHost, kind: EventKind, relation: Option<u64>) -> anyhow::Result<Event> {
    let relation_event = || async {
        let id = RelationId::new(relation.context("--relation is required for relation events")?);
        let record = host.relation(id).await.with_context(|| format!("Unknown relation {}", id))?;
        anyhow::Ok(RelationEvent { relation: id, relation_name: record.name, remote_app: record.remote_app })
    };

    Ok(match kind {
        EventKind::Install => Event::Install,
        EventKind::Start => Event::Start,
        EventKind::UpdateStatus => Event::UpdateStatus,
        EventKind::RelationJoined => Event::RelationJoined(relation_event().await?),
        EventKind::RelationChanged => Event::RelationChanged(relation_event().await?),
        EventKind::RelationBroken => Event::RelationBroken(relation_event().await?),
    })
}

fn server_operator(
    config: &OperatorConfig,
    host: &LocalHost,
    secrets: &InMemorySecretStore,
    state: &UnitState,
) -> anyhow::Result<InfluxDbOperator> {
    let admin = HttpInfluxDbClient::new(
        &config.influxdb.host,
        config.influxdb.port,
        config.influxdb.request_timeout(),
    )?;
    Ok(InfluxDbOperator::new(
        config.clone(),
        Arc::new(host.clone()),
        Arc::new(secrets.clone()),
        Arc::new(admin),
        Arc::new(SystemInstaller::new(&config.influxdb)),
        state.server.clone(),
    ))
}

async fn client_operator(
    config: &OperatorConfig,
    host: &LocalHost,
    secrets: &InMemorySecretStore,
    state: &UnitState,
) -> InfluxDbClientOperator {
    let relations = host.relations().await.into_iter().map(|r| r.id);
    let view = GrantedSecretView::new(secrets.clone(), relations);
    InfluxDbClientOperator::new(
        config.clone(),
        Arc::new(host.clone()),
        Arc::new(CachedSecretStore::new(view)),
        state.client.clone(),
    )
}

/// Deliver `event` (if any) after due deferred events, then rotate due secrets.
async fn dispatch(
    role: &Role,
    config: &OperatorConfig,
    host: &LocalHost,
    secrets: &InMemorySecretStore,
    state: &mut UnitState,
    event: Option<Event>,
) -> anyhow::Result<DispatchReport> {
    let policy = BackoffPolicy::from(&config.scheduler);
    let mut scheduler = EventScheduler::from_pending(policy, std::mem::take(&mut state.pending));
    let now = Utc::now();

    let report = match role {
        Role::Server => {
            let mut operator = server_operator(config, host, secrets, state)?;
            let mut report = deliver(&mut scheduler, &mut operator, event, now).await;
            for (secret, label) in secrets.due_for_rotation(now).await {
                let rotate = Event::SecretRotate { secret, label };
                report.merge(scheduler.dispatch(&mut operator, rotate, now).await);
            }
            state.server = operator.into_state();
            report
        }
        Role::Client => {
            let mut operator = client_operator(config, host, secrets, state).await;
            let report = deliver(&mut scheduler, &mut operator, event, now).await;
            state.client = operator.into_state();
            report
        }
    };

    state.pending = scheduler.pending();
    Ok(report)
}

async fn deliver<H: EventHandler>(
    scheduler: &mut EventScheduler,
    handler: &mut H,
    event: Option<Event>,
    now: chrono::DateTime<Utc>,
) -> DispatchReport {
    match event {
        Some(event) => scheduler.dispatch(handler, event, now).await,
        None => scheduler.run_until_idle(handler, now).await,
    }
}

async fn run_action(
    role: &Role,
    config: &OperatorConfig,
    host: &LocalHost,
    secrets: &InMemorySecretStore,
    state: &UnitState,
    request: &ActionRequest,
) -> anyhow::Result<crate::events::ActionResult> {
    Ok(match role {
        Role::Server => server_operator(config, host, secrets, state)?.run_action(request).await,
        Role::Client => client_operator(config, host, secrets, state).await.run_action(request).await,
    })
}

#[derive(Debug, Serialize)]
struct StatusReport {
    app_name: String,
    leader: bool,
    status: UnitStatus,
    workload_version: Option<String>,
    installed: bool,
    pending_events: usize,
    relations: Vec<RelationSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    secrets: Vec<SecretInfo>,
}

#[derive(Debug, Serialize)]
struct RelationSummary {
    id: RelationId,
    name: String,
    remote_app: String,
}

async fn status_report(
    role: &Role,
    host: &LocalHost,
    secrets: &InMemorySecretStore,
    state: &UnitState,
) -> anyhow::Result<StatusReport> {
    let (installed, secrets) = match role {
        Role::Server => (state.server.installed, secrets.list().await),
        Role::Client => (state.client.install_complete, Vec::new()),
    };
    Ok(StatusReport {
        app_name: host.app_name().to_string(),
        leader: host.is_leader().await?,
        status: host.status().await?,
        workload_version: host.workload_version().await,
        installed,
        pending_events: state.pending.len(),
        relations: host
            .relations()
            .await
            .into_iter()
            .map(|r| RelationSummary { id: r.id, name: r.name, remote_app: r.remote_app })
            .collect(),
        secrets,
    })
}

async fn handle_host_command(
    command: HostCommands,
    host: &LocalHost,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match command {
        HostCommands::Relate { name, remote_app, id } => {
            let id = match id {
                Some(id) => host.add_relation_with_id(RelationId::new(id), &name, &remote_app).await?,
                None => host.add_relation(&name, &remote_app).await,
            };
            print_output(&serde_json::json!({ "relation": id }), format)?;
        }
        HostCommands::Unrelate { relation } => {
            let id = RelationId::new(relation);
            host.remove_relation(id).await.with_context(|| format!("Unknown relation {}", id))?;
        }
        HostCommands::SetLeader { leader } => host.set_leader(leader).await,
        HostCommands::Bind { binding, address } => host.set_binding(&binding, &address).await,
        HostCommands::SetRemoteData { relation, key, value } => {
            host.set_remote_data(RelationId::new(relation), &key, &value).await?;
        }
    }
    Ok(())
}
