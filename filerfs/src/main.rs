use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use filerfs::api::{self, AppState};
use filerfs::cadapter::{HttpMasterClient, HttpVolumeClient};
use filerfs::chunk::VolumeReader;
use filerfs::fuse::mount::mount_unprivileged;
use filerfs::meta::{HttpMetaDialer, MetaDialer};
use filerfs::utils::cli::{Args, Command, MountArgs, ServeArgs};
use filerfs::vfs::Wfs;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    match args.command {
        Command::Serve(serve_args) => serve(serve_args).await,
        Command::Mount(mount_args) => mount(mount_args).await,
    }
}

fn volume_reader(master: &str, timeout: std::time::Duration) -> anyhow::Result<VolumeReader> {
    let resolver = HttpMasterClient::new(master, reqwest::Client::builder().timeout(timeout).build()?);
    let transport = HttpVolumeClient::new(timeout)?;
    Ok(VolumeReader::new(Arc::new(resolver), Arc::new(transport)))
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let option = args.to_option()?;
    let reader = volume_reader(&option.master, option.chunk_fetch_timeout)?;
    let meta = HttpMetaDialer::new(option.chunk_fetch_timeout)
        .dial(&option.filer_meta_address)
        .await?;
    let app = api::create_router(AppState::new(option, meta, reader));

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", args.host, args.port)).await?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn mount(args: MountArgs) -> anyhow::Result<()> {
    let option = args.to_option()?;
    tokio::fs::create_dir_all(&option.mount_point).await?;
    let reader = volume_reader(&option.master, option.chunk_fetch_timeout)?;
    let dialer = Arc::new(HttpMetaDialer::new(option.chunk_fetch_timeout));
    let mount_point = option.mount_point.clone();
    let wfs = Wfs::new(option, dialer, reader);

    let handle = mount_unprivileged(wfs, &mount_point).await?;
    info!("mounted at {}, press Ctrl+C to unmount", mount_point.display());

    shutdown_signal().await;
    if let Err(e) = handle.unmount().await {
        warn!("unmount {}: {}", mount_point.display(), e);
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to install signal handler: {}", e);
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

    info!("Shutting down...");
}
