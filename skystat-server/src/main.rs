use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use skystat_server::config::Config;
use skystat_server::handler::{AppState, router};
use skystat_server::render::{ProcessRenderer, start_scratch_sweeper};
use skystat_server::service::StatusService;
use skystat_server::store::SnapshotStore;

const CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = if Path::new(CONFIG_PATH).exists() {
        Config::load(CONFIG_PATH)?
    } else {
        Config::default()
    };

    // Initialize logging
    let _logging_guard = skystat_server::logging::init_logging("logs", "skystat", &config.log_level);

    tracing::info!("SkyStat server starting...");

    // Open the snapshot store (single writer, separate reader)
    let store = SnapshotStore::open(&config.database_path)?;

    // External renderer plus the sweeper for crash leftovers
    let renderer = Arc::new(ProcessRenderer::new(&config.renderer));
    start_scratch_sweeper(PathBuf::from(&config.renderer.scratch_dir));

    let service = StatusService::new(store, renderer, &config.renderer);
    let app = router(
        AppState {
            service: Arc::new(service),
        },
        config.enable_cors,
    );

    let addr = config.server_address();
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
