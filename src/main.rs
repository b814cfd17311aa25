//! EMTiles - build and serve tile pyramids for large scientific images.
//!
//! This binary dispatches the `build` and `serve` subcommands.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use emtiles::{
    build,
    config::{BuildArgs, Cli, Command, ServeConfig},
    processor::RasterProcessor,
    server::create_router,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Build(args) => run_build(args).await,
        Command::Serve(config) => run_serve(config).await,
    }
}

// =============================================================================
// Build Command
// =============================================================================

async fn run_build(args: BuildArgs) -> ExitCode {
    init_logging(args.verbose);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let config = args.build_config();
    info!("Building {}", args.output.display());
    info!("  Source: {}", args.input.display());
    info!(
        "  Tiles: {}px {}, power spectrum blocks: {}px",
        config.tile_size,
        config.tile_format.name(),
        config.pspec_tile_size
    );

    let result = tokio::task::spawn_blocking(move || {
        let processor = RasterProcessor::new();
        build(&processor, &args.input, &args.output, &config)
    })
    .await;

    match result {
        Ok(Ok(report)) => {
            info!(
                "Wrote {} tiles and {} info records for {} slice(s)",
                report.tiles, report.infos, report.slices
            );
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            error!("Build failed: {}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Build task failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Invalid serve options: {}", e);
        return ExitCode::FAILURE;
    }

    info!(
        data_dir = %config.data_dir.display(),
        read_workers = config.read_workers,
        cache_mb = config.cache_tiles / (1024 * 1024),
        "Starting tile server"
    );

    let tile_service = config.tile_service();
    let pool = tile_service.pool().clone();
    let router = create_router(tile_service, config.router_config());

    let addr = config.bind_address();

    info!(
        "Listening on http://{addr} (GET /health, /<tileset>/tile/<level>/<column>/<row>)"
    );

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, "Cannot listen: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    pool.close();
    info!(discarded = pool.discarded(), "Server stopped");

    if let Err(e) = served {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "emtiles=debug,tower_http=debug"
    } else {
        "emtiles=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
