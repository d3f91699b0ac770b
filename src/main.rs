use local_llm_server::{
    api::{self, AppState, session::{self, SessionStore}},
    cache::VersionCache,
    config::{AppConfig, database},
    core::users::{self, PasswordHasher},
    errors::Result,
    update::{GitCli, RestartStrategy, RestartTrigger, SourceControl, UpdateScheduler, UpdateService},
};
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; variables may also come from the environment
    dotenv().ok();

    // 3. Load and validate configuration
    let config = AppConfig::from_env()
        .inspect_err(|e| error!("CRITICAL: {}", e))?;

    // 4. Connect to the database and create tables
    let db = database::connect_with_retry(&config.database_url)
        .await
        .inspect_err(|e| error!("CRITICAL: Could not connect to the database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))?;

    // 5. Warm the version and changelog cache
    let repository = config.repository.clone();
    let cache = VersionCache::new(
        config.app_dir.join(&repository.version_file),
        config.app_dir.join(&repository.changelog_file),
    );
    cache.refresh_all(&db).await;

    // 6. Seed the admin account
    let hasher = Arc::new(PasswordHasher::new(config.session_secret.clone())?);
    if let Err(e) = users::seed_admin(
        &db,
        &hasher,
        config.admin_username.as_deref(),
        config.admin_password.as_deref(),
    )
    .await
    {
        error!("Error seeding admin account: {}", e);
    }

    // 7. Wire the update subsystem
    let git: Arc<dyn SourceControl> = Arc::new(GitCli::new(config.app_dir.clone(), &repository));
    let restart = RestartTrigger::new(
        config.app_dir.clone(),
        <dyn RestartStrategy>::for_current_platform(),
    );
    let updates = Arc::new(UpdateService::new(
        config.update.clone(),
        repository,
        db.clone(),
        git,
        cache,
        restart,
    ));

    // 8. Serve
    let config = Arc::new(config);
    let sessions = SessionStore::new(session::SESSION_TTL, config.production);
    sessions.spawn_pruner(session::PRUNE_INTERVAL);

    let app = api::router(AppState {
        db,
        config: Arc::clone(&config),
        sessions,
        hasher,
        updates: Arc::clone(&updates),
    })?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server running at http://localhost:{}", config.port);

    UpdateScheduler::new(updates).spawn();

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
