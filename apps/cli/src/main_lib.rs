use std::sync::Arc;

use snapledger_core::import::ImportSessionService;
use snapledger_core::movements::CsvStatementReader;
use snapledger_core::portfolio::engine::SnapshotCoordinator;
use snapledger_storage_sqlite::db;
use snapledger_storage_sqlite::{
    ImportSessionRepository, MovementRepository, PriceRepository, SnapshotRepository,
};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

/// Repositories and services wired against one SQLite file.
pub struct AppState {
    pub movements: Arc<MovementRepository>,
    pub snapshots: Arc<SnapshotRepository>,
    pub prices: Arc<PriceRepository>,
    pub coordinator: Arc<SnapshotCoordinator>,
    pub imports: ImportSessionService,
}

pub fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false).with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

pub fn build_state(config: &Config) -> anyhow::Result<AppState> {
    db::init(&config.db_path)?;
    tracing::info!("Database path in use: {}", config.db_path);
    let pool = db::create_pool(&config.db_path)?;
    db::run_migrations(&pool)?;
    let writer = db::spawn_writer((*pool).clone())?;

    let movements = Arc::new(MovementRepository::new(pool.clone(), writer.clone()));
    let snapshots = Arc::new(SnapshotRepository::new(pool.clone(), writer.clone()));
    let prices = Arc::new(PriceRepository::new(pool.clone(), writer.clone()));
    let sessions = Arc::new(ImportSessionRepository::new(pool, writer));

    let coordinator = Arc::new(SnapshotCoordinator::new(
        movements.clone(),
        snapshots.clone(),
        prices.clone(),
        &config.engine,
    ));
    let imports = ImportSessionService::new(
        sessions,
        Arc::new(CsvStatementReader),
        coordinator.clone(),
        config.engine.clone(),
    );

    Ok(AppState {
        movements,
        snapshots,
        prices,
        coordinator,
        imports,
    })
}
