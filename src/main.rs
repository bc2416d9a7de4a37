//! cycle-bridge binary: console commands and a health/metrics server.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use axum::Router;
use clap::{Parser, Subcommand};
use tower_http::timeout::TimeoutLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cycle_bridge::adapters::http::app_router;
use cycle_bridge::application::commands::{MakeEntityCommand, MigrateCommand, SchemaCommand};
use cycle_bridge::application::{
    services, CommandRegistry, CycleCommand, CycleServiceProvider, RuntimeContext,
};
use cycle_bridge::config::CycleConfig;
use cycle_bridge::domain::schema::EntityRegistry;

/// ORM integration console
#[derive(Parser, Debug)]
#[command(name = "cycle-bridge", version, about = "ORM services, migrations and health endpoints")]
struct Cli {
    /// Directory holding `config/` and the migrations directory
    #[arg(short, long, default_value = ".", env = "CYCLE_BASE_PATH")]
    base_path: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate an entity scaffold
    #[command(name = "make:entity")]
    MakeEntity {
        name: String,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show schema information or synchronize tables
    #[command(name = "cycle:schema")]
    Schema {
        #[arg(long)]
        sync: bool,
    },

    /// Run or roll back migrations
    #[command(name = "cycle:migrate")]
    Migrate {
        #[arg(long, conflicts_with = "status")]
        rollback: bool,
        #[arg(long)]
        status: bool,
    },

    /// Serve the health and metrics endpoints (default)
    Serve,
}

impl Command {
    fn into_cycle_command(self) -> Option<CycleCommand> {
        match self {
            Command::MakeEntity { name, force } => {
                Some(CycleCommand::MakeEntity(MakeEntityCommand { name, force }))
            }
            Command::Schema { sync } => Some(CycleCommand::Schema(SchemaCommand { sync })),
            Command::Migrate { rollback, status } => {
                Some(CycleCommand::Migrate(MigrateCommand { rollback, status }))
            }
            Command::Serve => None,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match CycleConfig::load_from(&cli.base_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config);

    let command = cli.command.and_then(Command::into_cycle_command);
    let context = if command.is_some() {
        RuntimeContext::Console
    } else {
        RuntimeContext::Http
    };

    let mut provider = CycleServiceProvider::new(config, EntityRegistry::new(), context)
        .with_base_path(&cli.base_path);
    if let Err(e) = provider.register() {
        tracing::error!("Failed to register ORM services: {}", e);
        return ExitCode::FAILURE;
    }
    if let Err(e) = provider.boot().await {
        tracing::error!("Failed to boot ORM services: {}", e);
        return ExitCode::FAILURE;
    }

    match command {
        Some(command) => run_command(&provider, command).await,
        None => serve(&provider).await,
    }
}

async fn run_command(provider: &CycleServiceProvider, command: CycleCommand) -> ExitCode {
    let commands = match provider.services().make::<CommandRegistry>(services::COMMANDS) {
        Ok(commands) => commands,
        Err(e) => {
            tracing::error!("Console commands unavailable: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let result = commands.execute(provider.services(), command).await;
    result.print();
    if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn serve(provider: &CycleServiceProvider) -> ExitCode {
    let addr = match provider.config().server.socket_addr() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("Invalid server address: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let timeout = Duration::from_secs(provider.config().server.request_timeout_secs);
    let app = app_router(provider.services().clone(), Router::new()).layer(TimeoutLayer::new(timeout));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(%addr, "listening");

    match axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
    }
}

/// `RUST_LOG` wins over `server.log_level`; production logs are JSON.
fn init_tracing(config: &CycleConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.server.log_level.as_str()));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.is_production() {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };
    if let Err(e) = result {
        eprintln!("Failed to initialize logging: {}", e);
    }
}
