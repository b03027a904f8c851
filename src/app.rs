//! Process lifecycle: open the database, migrate, serve, shut down.

use anyhow::Context;
use axum::Router;
use bookshelf_db::Database;
use bookshelf_kernel::{settings::Settings, InitCtx, ModuleRegistry};

use crate::modules;

/// Open the database named by the settings.
pub fn open_database(settings: &Settings) -> anyhow::Result<Database> {
    Database::open(&settings.database.url, settings.database.busy_timeout())
        .with_context(|| format!("failed to open database '{}'", settings.database.url))
}

/// Registry with every application module bound to `db`.
pub fn build_registry(db: &Database) -> anyhow::Result<ModuleRegistry> {
    let mut registry = ModuleRegistry::new();
    modules::register_all(&mut registry, db)?;
    Ok(registry)
}

/// Apply pending migrations of every module. Returns how many ran.
pub async fn migrate(registry: &ModuleRegistry, db: &Database) -> anyhow::Result<usize> {
    let migrations = registry.collect_migrations();
    tracing::info!(total = migrations.len(), "applying migrations");

    let applied = db
        .apply_migrations(migrations)
        .await
        .context("failed to apply migrations")?;

    tracing::info!(applied, "migrations complete");
    Ok(applied)
}

/// Initialize every module and build the router, without binding a socket.
pub async fn build_app(
    registry: &ModuleRegistry,
    settings: &Settings,
    db: &Database,
) -> anyhow::Result<Router> {
    let ctx = InitCtx { settings, db };
    registry.init_all(&ctx).await?;
    registry.start_all(&ctx).await?;
    Ok(bookshelf_http::build_router(registry, settings))
}

/// Run the service until a shutdown signal, then stop modules and close the
/// database.
pub async fn serve(settings: Settings) -> anyhow::Result<()> {
    tracing::info!(
        env = ?settings.environment,
        db = %settings.database.url,
        "bookshelf bootstrap starting"
    );

    let db = open_database(&settings)?;
    let registry = build_registry(&db)?;

    if settings.database.auto_migrate {
        migrate(&registry, &db).await?;
    }

    let ctx = InitCtx {
        settings: &settings,
        db: &db,
    };
    registry.init_all(&ctx).await?;
    registry.start_all(&ctx).await?;

    let served = bookshelf_http::start_server(&registry, &settings).await;

    let stopped = registry.stop_all().await;
    drop(registry);
    db.close().context("failed to close database")?;

    served?;
    stopped?;
    tracing::info!("bookshelf shut down");
    Ok(())
}
