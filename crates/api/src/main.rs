//! API server entry point.

use std::sync::Arc;

use api::{AppState, Config, StartupError, StaticTokenVerifier, Stores, TokenVerifier};
use api::config::LogFormat;
use api::state::Bus;
use consumers::{LogMailer, Mailer, SmtpMailer};
use event_bus::{AmqpEventBus, InMemoryEventBus};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn stores(config: &Config) -> Result<Stores, StartupError> {
    let Some(url) = &config.database_url else {
        tracing::info!("DATABASE_URL not set, using in-memory stores");
        return Ok(Stores::in_memory());
    };

    let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
    domain::postgres::run_migrations(&pool).await?;
    Ok(Stores::postgres(pool))
}

async fn bus(config: &Config) -> Result<Bus, StartupError> {
    let Some(url) = &config.amqp_url else {
        tracing::warn!("AMQP_URL not set, using the in-process bus; queued events do not survive a restart");
        return Ok(Arc::new(InMemoryEventBus::with_standard_topology().await));
    };

    let bus = AmqpEventBus::connect(url).await?;
    bus.declare_standard_topology().await?;
    Ok(Arc::new(bus))
}

fn mailer(config: &Config) -> Result<Arc<dyn Mailer>, StartupError> {
    match &config.smtp {
        Some(settings) => {
            let mailer = SmtpMailer::new(settings, &config.mail_from)
                .map_err(|e| StartupError::Config(format!("SMTP: {e}")))?;
            Ok(Arc::new(mailer))
        }
        None => {
            tracing::warn!("SMTP_HOST not set, notifications are logged instead of sent");
            Ok(Arc::new(LogMailer::new(config.mail_from.clone())))
        }
    }
}

fn verifier(config: &Config) -> Result<Arc<dyn TokenVerifier>, StartupError> {
    let verifier: StaticTokenVerifier = match &config.auth_tokens {
        Some(tokens) => tokens.parse().map_err(StartupError::Config)?,
        None => StaticTokenVerifier::new(),
    };
    if verifier.is_empty() {
        tracing::warn!("AUTH_TOKENS not set, every authenticated route will answer 401");
    }
    Ok(Arc::new(verifier))
}

async fn run(config: Config) -> Result<(), StartupError> {
    // 1. Metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| StartupError::Config(format!("prometheus recorder: {e}")))?;

    // 2. Bus, stores and services
    let state = AppState::build(
        &config,
        bus(&config).await?,
        stores(&config).await?,
        verifier(&config)?,
    )?;

    // 3. Queue consumers
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = api::workers::spawn_workers(&state, &config, mailer(&config)?, &shutdown_rx);

    // 4. HTTP server
    let app = api::create_app(state, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 5. Let consumers settle what they hold
    let _ = shutdown_tx.send(true);
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "consumer task failed");
        }
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    init_tracing(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "server failed");
        std::process::exit(1);
    }
}
