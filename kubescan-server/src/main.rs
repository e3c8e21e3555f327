use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use kubescan_core::{ClusterClient, ServiceContainer, store::connect_store};
use kubescan_server::{
    create_router,
    infra::{
        app_state::AppState,
        config::Config,
        kube::{KubeApiClient, KubeApiConfig},
        trigger::{TriggerTiming, run_namespace_loop},
    },
};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "kubescan")]
#[command(about = "Schedules image vulnerability scans in a Kubernetes cluster and serves the results")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Server port
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Server host
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,

    /// Serve results only; do not watch the cluster or submit jobs
    #[arg(long, env = "KUBESCAN_NO_SCHEDULER", default_value_t = false)]
    no_scheduler: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::from_env().context("failed to load configuration")?;
    if let Some(port) = cli.serve.port {
        config.server_port = port;
    }
    if let Some(host) = cli.serve.host.clone() {
        config.server_host = host;
    }

    if let Some(Command::Migrate) = cli.command {
        return run_db_migrate(&config).await;
    }

    run_server(config, cli.serve).await
}

async fn run_db_migrate(config: &Config) -> anyhow::Result<()> {
    connect_store(config.database_type, &config.dsn)
        .await
        .context("database migration failed")?;
    info!(database = %config.database_type, "Database migrations applied successfully");
    Ok(())
}

async fn run_server(config: Config, args: ServeArgs) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let container = Arc::new(ServiceContainer::new(config.service_settings()));

    let mut triggers = JoinSet::new();
    if args.no_scheduler {
        warn!("Scheduler disabled; serving stored results only");
    } else {
        let kube_config =
            KubeApiConfig::from_env(&config.scan_label).context("failed to configure Kubernetes access")?;
        info!(api = %kube_config.base_url, "Using Kubernetes API");
        let cluster: Arc<dyn ClusterClient> = Arc::new(KubeApiClient::new(kube_config)?);
        let timing = TriggerTiming {
            idle_requeue: config.idle_requeue,
            poll_interval: config.poll_interval,
        };
        for namespace in &config.namespaces {
            triggers.spawn(run_namespace_loop(
                namespace.clone(),
                container.clone(),
                cluster.clone(),
                timing,
            ));
        }
    }

    // Handlers need the store and hub up front
    let services = container.get().await.map_err(|e| {
        error!("Failed to initialize services: {e}");
        anyhow::Error::new(e).context("failed to initialize services")
    })?;
    let state = AppState::new(services, config.clone());
    let router = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .context("invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Starting Kubescan server on {}", addr);

    let server = async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    };

    tokio::select! {
        result = server => {
            result.context("server error")?;
            info!("Server stopped");
        }
        Some(joined) = triggers.join_next(), if !triggers.is_empty() => {
            match joined {
                Ok(Err(e)) => {
                    error!("Scan trigger failed: {e:#}");
                    return Err(e);
                }
                Ok(Ok(())) => warn!("Scan trigger exited"),
                Err(e) => {
                    error!("Scan trigger panicked: {e}");
                    return Err(e.into());
                }
            }
        }
    }

    triggers.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
