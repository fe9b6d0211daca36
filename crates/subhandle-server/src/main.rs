#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use server::config::{CliArgs, ServerConfig};
use server::service::handler::{HandleService, router};
use server::telemetry::{TelemetryProviders, init_telemetry};
use subhandle::{HandleRegistry, HandleResolver, HandleStore};
use tokio::net::TcpListener;
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;
    let service = build_service(config).await?;

    if service.config().uds {
        #[cfg(unix)]
        {
            use tokio::net::UnixListener;
            let uds_path = service.config().server_addr.clone();
            let uds = UnixListener::bind(&uds_path)?;
            log_startup_info(&uds_path, service.config());
            let res = run_server(providers, uds, service).await;
            // A panic before this point leaves the socket file behind.
            let _ = std::fs::remove_file(&uds_path);
            res
        }
        #[cfg(not(unix))]
        {
            anyhow::bail!("Unix domain sockets are not supported on this platform");
        }
    } else {
        let tcp_path = service.config().server_addr.clone();
        let tcp = TcpListener::bind(&tcp_path).await?;
        log_startup_info(&tcp_path, service.config());
        run_server(providers, tcp, service).await
    }
}

async fn build_service(config: ServerConfig) -> anyhow::Result<HandleService> {
    let store = HandleStore::connect(&config.database_url, config.db_max_connections).await?;
    let resolver = HandleResolver::new(config.resolver_url.as_str(), config.resolver_timeout)?;
    let registry = HandleRegistry::new(
        store,
        resolver,
        config.denylist.clone(),
        config.vanity_domain.clone(),
    );
    Ok(HandleService::new(config, registry))
}

async fn run_server<L>(
    providers: TelemetryProviders,
    listener: L,
    service: HandleService,
) -> anyhow::Result<()>
where
    L: axum::serve::Listener,
    L::Addr: core::fmt::Debug,
{
    let app = router(service.clone());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.shutdown().await;
    tracing::info!("Service shut down successfully");
    providers.shutdown();
    Ok(())
}

fn log_startup_info(addr: &str, config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting handle service on {} with full config: {:#?}",
            addr,
            config
        );
    } else {
        tracing::info!(
            "Starting handle service on {} for *.{} ({} reserved names)",
            addr,
            config.vanity_domain,
            config.denylist.len()
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Shutdown signal received, draining connections...");
}
