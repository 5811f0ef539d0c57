//! Entry point: `api` serves the webhook ingestor + health check, `scheduler`
//! runs the Call Scheduler tick loop, `worker email` runs the Email Worker
//! long-poll loop. Bootstrap (tracing + dotenvy, `--once` single-cycle mode)
//! follows the teacher's native-mode `main.rs`, stripped of the Dioxus/wasm
//! frontend branching that has no counterpart here.

mod api;
mod bus;
mod config;
mod db;
mod dialogue;
mod email_worker;
mod llm;
mod models;
mod scheduler;
mod telephony;
mod webhook;

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use config::{DatabaseConfig, EmailConfig, EventBusConfig, LlmConfig, SchedulerConfig, TelephonyConfig};
use email_worker::{EmailWorker, EmailWorkerSettings, SmtpEmailSender};
use scheduler::{Scheduler, SchedulerSettings};
use telephony::HttpTelephonyProvider;
use webhook::WebhookState;

#[derive(Parser)]
#[command(name = "survey-dialer", about = "AI-driven outbound phone-survey platform")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serves the webhook ingestor and health check over HTTP.
    Api {
        #[arg(long, env = "PORT", default_value_t = 3000)]
        port: u16,
        #[command(flatten)]
        db: DatabaseConfig,
        #[command(flatten)]
        bus: EventBusConfig,
        #[command(flatten)]
        telephony: TelephonyConfig,
        #[command(flatten)]
        llm: LlmConfig,
    },
    /// Runs the Call Scheduler tick loop.
    Scheduler {
        #[command(flatten)]
        db: DatabaseConfig,
        #[command(flatten)]
        telephony: TelephonyConfig,
        #[command(flatten)]
        scheduler: SchedulerConfig,
        /// Runs a single tick instead of looping forever.
        #[arg(long)]
        once: bool,
    },
    /// Runs a background worker.
    Worker {
        #[command(subcommand)]
        worker: WorkerCommands,
    },
}

#[derive(Subcommand)]
enum WorkerCommands {
    /// Runs the Email Worker long-poll loop.
    Email {
        #[command(flatten)]
        db: DatabaseConfig,
        #[command(flatten)]
        bus: EventBusConfig,
        #[command(flatten)]
        email: EmailConfig,
        /// Runs a single poll batch instead of looping forever.
        #[arg(long)]
        once: bool,
    },
}

fn main() -> ExitCode {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("survey_dialer=info".parse().unwrap()),
        )
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(error = %err, "failed to start tokio runtime");
            return ExitCode::from(3);
        }
    };

    match runtime.block_on(run(cli.command)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(RunError::Config(msg)) => {
            tracing::error!(error = %msg, "configuration error");
            ExitCode::from(2)
        }
        Err(RunError::Runtime(msg)) => {
            tracing::error!(error = %msg, "unrecoverable runtime error");
            ExitCode::from(3)
        }
    }
}

enum RunError {
    Config(String),
    Runtime(String),
}

async fn run(command: Commands) -> Result<(), RunError> {
    match command {
        Commands::Api { port, db, bus, telephony, llm } => run_api(port, db, bus, telephony, llm).await,
        Commands::Scheduler { db, telephony, scheduler, once } => run_scheduler(db, telephony, scheduler, once).await,
        Commands::Worker { worker: WorkerCommands::Email { db, bus, email, once } } => {
            run_email_worker(db, bus, email, once).await
        }
    }
}

async fn run_api(
    port: u16,
    db: DatabaseConfig,
    bus: EventBusConfig,
    telephony: TelephonyConfig,
    llm: LlmConfig,
) -> Result<(), RunError> {
    let pool = db::init_pool(&db.database_url).await.map_err(|e| RunError::Config(e.to_string()))?;
    db::run_migrations(&pool).await.map_err(|e| RunError::Runtime(e.to_string()))?;

    let telephony_provider: Arc<dyn telephony::TelephonyProvider> = Arc::new(HttpTelephonyProvider::new(
        telephony.webhook_base_url.clone(),
        telephony.auth_token.clone(),
        telephony.webhook_signing_secret.clone(),
    ));
    let llm_client: Arc<dyn llm::LlmClient> = Arc::new(llm::AnthropicClient::new(llm.api_key, llm.model));
    let dialogue = Arc::new(dialogue::DialogueOrchestrator::new(llm_client));
    let event_bus: Arc<dyn bus::EventBus> = Arc::new(build_sqs_bus(&bus).await?);

    let state = Arc::new(WebhookState { pool, telephony: telephony_provider, dialogue, bus: event_bus });
    let router = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| RunError::Runtime(e.to_string()))?;
    tracing::info!(port, "listening");
    axum::serve(listener, router).await.map_err(|e| RunError::Runtime(e.to_string()))?;
    Ok(())
}

async fn run_scheduler(
    db: DatabaseConfig,
    telephony: TelephonyConfig,
    scheduler_config: SchedulerConfig,
    once: bool,
) -> Result<(), RunError> {
    let pool = db::init_pool(&db.database_url).await.map_err(|e| RunError::Config(e.to_string()))?;

    let telephony_provider: Arc<dyn telephony::TelephonyProvider> = Arc::new(HttpTelephonyProvider::new(
        telephony.webhook_base_url.clone(),
        telephony.auth_token.clone(),
        telephony.webhook_signing_secret.clone(),
    ));

    let settings = SchedulerSettings::new(
        telephony.from_number,
        telephony.webhook_base_url,
        telephony.max_concurrent_calls,
        scheduler_config.prefetch_factor,
        scheduler_config.lock_key,
        scheduler_config.interval_seconds,
    )
    .map_err(|e| RunError::Config(e.to_string()))?;

    let scheduler = Scheduler::new(pool, telephony_provider, settings);

    if once {
        scheduler.tick().await.map_err(|e| RunError::Runtime(e.to_string()))?;
    } else {
        scheduler.run_forever().await;
    }
    Ok(())
}

async fn run_email_worker(
    db: DatabaseConfig,
    bus: EventBusConfig,
    email: EmailConfig,
    once: bool,
) -> Result<(), RunError> {
    let pool = db::init_pool(&db.database_url).await.map_err(|e| RunError::Config(e.to_string()))?;
    let event_bus: Arc<dyn bus::EventBus> = Arc::new(build_sqs_bus(&bus).await?);

    let sender: Arc<dyn email_worker::EmailSender> = Arc::new(
        SmtpEmailSender::new(
            &email.smtp_host,
            email.smtp_port,
            &email.smtp_username,
            &email.smtp_password,
            &email.from_email,
            &email.from_name,
        )
        .map_err(|e| RunError::Config(e.to_string()))?,
    );

    let worker = EmailWorker::new(pool, event_bus, sender, EmailWorkerSettings { max_retries: email.max_retries });

    if once {
        worker.poll_once().await.map_err(|e| RunError::Runtime(e.to_string()))?;
    } else {
        worker.run_forever().await;
    }
    Ok(())
}

async fn build_sqs_bus(config: &EventBusConfig) -> Result<bus::SqsEventBus, RunError> {
    let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(config.event_bus_region.clone()))
        .load()
        .await;
    let client = aws_sdk_sqs::Client::new(&sdk_config);
    Ok(bus::SqsEventBus::new(client, config.event_bus_url.clone()))
}
