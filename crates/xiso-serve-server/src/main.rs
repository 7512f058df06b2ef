//! Entry point: parses CLI flags, wires up logging, builds the process-wide
//! pipeline cache, and serves `--dvd_path` over HTTP - launching `xemu`
//! against it first if `--xemu_path` was given (§6, ADDED; grounded on
//! `server.py`'s `main()`).

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use xiso_serve_server::cli::Cli;
use xiso_serve_server::http::{router, AppState};
use xiso_serve_server::launch::{build_dvd_url, launch_emulator};
use xiso_serve_server::pipeline::PipelineCache;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let patches = xiso_serve_patches::formats::parse_all(&cli.patches);

    let filename = cli
        .dvd_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("game.iso")
        .to_string();
    let dvd_root = cli
        .dvd_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| std::path::PathBuf::from("."));

    let state = AppState {
        cache: Arc::new(PipelineCache::new()),
        dvd_root,
        patches: Arc::new(patches),
        force_media_patch: cli.apply_media_patch,
    };

    let app = router(state);

    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], cli.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("server error: {}", e);
        }
    });

    if cli.wants_emulator_launch() {
        let xemu_path = cli.xemu_path.clone().unwrap();
        let dvd_url = build_dvd_url(cli.port, &filename);
        tokio::task::spawn_blocking(move || launch_emulator(&xemu_path, &dvd_url)).await??;
    } else {
        server.await?;
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
