//! Companion router entry point

use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use companion_adapters::{
    AdapterSet, DispatchCaps, Dispatcher, HttpNotification, HttpSmartHome, HttpVoiceCall,
    NotificationAdapter, SimNotification, SimSmartHome, SimTts, SimVideo, SimVoiceCall,
    SmartHomeAdapter, VoiceCallAdapter,
};
use companion_audit::AuditSink;
use companion_config::{load_settings, Settings};
use companion_emergency::EmergencyDispatcher;
use companion_intent::IntentClient;
use companion_orchestrator::{Orchestrator, SessionManager};
use companion_policy::PolicyStore;
use companion_server::{create_router, init_metrics, AppState};

#[derive(Parser)]
#[command(name = "companion-router", about = "Elderly-companion guard and orchestration core")]
struct Cli {
    /// Environment name for config/{env}.yaml layering
    #[arg(long)]
    env: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the router (default)
    Run,
    /// Ask a running router to reload its policy file
    ReloadPolicy {
        #[arg(long, default_value = "http://127.0.0.1:7080")]
        url: String,
    },
    /// Print the currently-published policy snapshot summary
    DumpSnapshot {
        #[arg(long, default_value = "http://127.0.0.1:7080")]
        url: String,
    },
    /// Drive the emergency path against simulated adapters
    TestEmergency {
        #[arg(long)]
        category: String,
        #[arg(long, default_value_t = 4)]
        severity: u8,
        #[arg(long, default_value = "http://127.0.0.1:7080")]
        url: String,
    },
    /// Quiesce a running router
    Drain {
        #[arg(long, default_value = "http://127.0.0.1:7080")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(cli.env.as_deref()).await,
        Command::ReloadPolicy { url } => {
            control_post(&format!("{}/control/reload-policy", url)).await
        }
        Command::DumpSnapshot { url } => control_get(&format!("{}/control/snapshot", url)).await,
        Command::TestEmergency { category, severity, url } => {
            control_post_json(
                &format!("{}/control/test-emergency", url),
                serde_json::json!({"category": category, "severity": severity}),
            )
            .await
        }
        Command::Drain { url } => control_post(&format!("{}/control/drain", url)).await,
    }
}

async fn run(env: Option<&str>) -> ExitCode {
    let config = match load_settings(env) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Configuration invalid: {}", error);
            return ExitCode::from(2);
        }
    };

    init_tracing(&config);
    tracing::info!("Starting companion router v{}", env!("CARGO_PKG_VERSION"));

    let _metrics_handle = init_metrics();

    // Policy: a configured file must be valid; a missing default falls back
    // to the built-in demo policy
    let policy_path = Path::new(&config.policy_path);
    let policy = if policy_path.exists() {
        match PolicyStore::open(Some(policy_path)) {
            Ok(store) => store,
            Err(error) => {
                tracing::error!(%error, path = %policy_path.display(), "Policy invalid");
                eprintln!("Policy invalid: {}", error);
                return ExitCode::from(2);
            }
        }
    } else {
        tracing::warn!(
            path = %policy_path.display(),
            "Policy file not found; using built-in defaults"
        );
        match PolicyStore::open(None) {
            Ok(store) => store,
            Err(error) => {
                eprintln!("Built-in policy invalid: {}", error);
                return ExitCode::from(2);
            }
        }
    };
    let policy = Arc::new(policy);
    let snapshot = policy.snapshot();

    let (adapters, degraded) = build_adapters(&config).await;

    let audit = match AuditSink::open(&config.audit.dir, config.audit.segment_max_bytes) {
        Ok(sink) => sink,
        Err(error) => {
            eprintln!("Audit sink unavailable: {}", error);
            return ExitCode::from(2);
        }
    };

    let caps = DispatchCaps {
        smart_home: config.adapters.smart_home_concurrency,
        calling: config.adapters.calling_concurrency,
        notify: config.adapters.notification_concurrency,
        queue_bound: config.adapters.queue_bound,
        ..DispatchCaps::default()
    };
    let jobs = Arc::new(Dispatcher::new(adapters.clone(), snapshot.retry, caps));

    let accept_budget =
        std::time::Duration::from_millis(config.deadlines.emergency_accept_ms);
    let emergency =
        EmergencyDispatcher::new(adapters.clone(), jobs.clone(), audit.clone(), accept_budget);

    // test-emergency gets its own fully simulated fan-out
    let dry_adapters = AdapterSet {
        smart_home: Arc::new(SimSmartHome::new()),
        call: Arc::new(SimVoiceCall::new()),
        notify: Arc::new(SimNotification::new()),
        video: Arc::new(SimVideo::new()),
        tts: Arc::new(SimTts::new()),
    };
    let dry_jobs = Arc::new(Dispatcher::new(
        dry_adapters.clone(),
        snapshot.retry,
        DispatchCaps::default(),
    ));
    let dry_run_emergency =
        EmergencyDispatcher::new(dry_adapters, dry_jobs, audit.clone(), accept_budget);

    let sessions = Arc::new(SessionManager::new(
        config.server.max_sessions,
        std::time::Duration::from_secs(config.server.session_timeout_seconds),
    ));
    let _cleanup = sessions.start_cleanup_task(std::time::Duration::from_secs(300));

    let intent = Arc::new(IntentClient::new(config.llm.clone()));

    let orchestrator = Orchestrator::new(
        policy,
        intent,
        jobs,
        emergency,
        sessions,
        audit,
        config.deadlines.clone(),
    );

    let state = AppState::new(config.clone(), orchestrator, dry_run_emergency, degraded);
    let app = create_router(state);

    let addr: SocketAddr = match format!("{}:{}", config.server.host, config.server.port).parse() {
        Ok(addr) => addr,
        Err(error) => {
            eprintln!("Invalid bind address: {}", error);
            return ExitCode::from(2);
        }
    };

    tracing::info!(%addr, degraded, "Listening");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(error) => {
            eprintln!("Bind failed: {}", error);
            return ExitCode::FAILURE;
        }
    };

    if let Err(error) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        eprintln!("Server error: {}", error);
        return ExitCode::FAILURE;
    }

    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}

/// Wire real gateways where endpoints are configured and reachable;
/// anything unreachable at startup degrades to its simulated adapter.
async fn build_adapters(config: &Settings) -> (AdapterSet, bool) {
    let endpoints = &config.adapters.endpoints;
    let mut degraded = false;

    let smart_home: Arc<dyn SmartHomeAdapter> = if config.adapters.simulated
        || endpoints.smart_home_url.is_empty()
    {
        Arc::new(SimSmartHome::new())
    } else if probe(&endpoints.smart_home_url).await {
        Arc::new(HttpSmartHome::new(
            endpoints.smart_home_url.clone(),
            endpoints.smart_home_token.clone(),
        ))
    } else {
        tracing::warn!(url = %endpoints.smart_home_url, "Smart-home bridge unreachable; degraded mode");
        degraded = true;
        Arc::new(SimSmartHome::new())
    };

    let call: Arc<dyn VoiceCallAdapter> = if config.adapters.simulated
        || endpoints.sip_gateway_url.is_empty()
    {
        Arc::new(SimVoiceCall::new())
    } else if probe(&endpoints.sip_gateway_url).await {
        Arc::new(HttpVoiceCall::new(endpoints.sip_gateway_url.clone()))
    } else {
        tracing::warn!(url = %endpoints.sip_gateway_url, "SIP gateway unreachable; degraded mode");
        degraded = true;
        Arc::new(SimVoiceCall::new())
    };

    let notify: Arc<dyn NotificationAdapter> = if config.adapters.simulated
        || endpoints.notification_url.is_empty()
    {
        Arc::new(SimNotification::new())
    } else if probe(&endpoints.notification_url).await {
        Arc::new(HttpNotification::new(
            endpoints.notification_url.clone(),
            endpoints.notification_api_key.clone(),
        ))
    } else {
        tracing::warn!(url = %endpoints.notification_url, "Notification gateway unreachable; degraded mode");
        degraded = true;
        Arc::new(SimNotification::new())
    };

    // TTS and video are in-process collaborators fed from the bus; their
    // adapter seams stay simulated in this deployment
    let set = AdapterSet {
        smart_home,
        call,
        notify,
        video: Arc::new(SimVideo::new()),
        tts: Arc::new(SimTts::new()),
    };

    (set, degraded)
}

async fn probe(base_url: &str) -> bool {
    let client = reqwest::Client::new();
    match client
        .get(format!("{}/health", base_url))
        .timeout(std::time::Duration::from_secs(2))
        .send()
        .await
    {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("companion={}", config.observability.log_level).into());

    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

// Control-plane helpers shared by the non-run subcommands. Exit code 3
// means the router was unreachable.

async fn control_get(url: &str) -> ExitCode {
    match reqwest::get(url).await {
        Ok(response) => print_response(response).await,
        Err(error) => {
            eprintln!("Router unreachable: {}", error);
            ExitCode::from(3)
        }
    }
}

async fn control_post(url: &str) -> ExitCode {
    let client = reqwest::Client::new();
    match client.post(url).send().await {
        Ok(response) => print_response(response).await,
        Err(error) => {
            eprintln!("Router unreachable: {}", error);
            ExitCode::from(3)
        }
    }
}

async fn control_post_json(url: &str, body: serde_json::Value) -> ExitCode {
    let client = reqwest::Client::new();
    match client.post(url).json(&body).send().await {
        Ok(response) => print_response(response).await,
        Err(error) => {
            eprintln!("Router unreachable: {}", error);
            ExitCode::from(3)
        }
    }
}

async fn print_response(response: reqwest::Response) -> ExitCode {
    let status = response.status();
    match response.text().await {
        Ok(body) => {
            println!("{}", body);
            if status.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }
        Err(error) => {
            eprintln!("Bad response: {}", error);
            ExitCode::from(3)
        }
    }
}
