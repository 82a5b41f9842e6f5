use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use stockroom_api::app::{build_app, AppState};
use stockroom_infra::{
    seed_admin, InMemoryStore, InventoryStore, PostgresStore, Services, Settings, StoreBackend,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the environment may already be set.
    let _ = dotenvy::dotenv();

    let settings = Settings::load().context("failed to load configuration")?;
    stockroom_observability::init(&settings.log);

    let store: Arc<dyn InventoryStore> = match settings.store.backend {
        StoreBackend::Memory => {
            info!("using the in-memory store; data is lost on exit");
            Arc::new(InMemoryStore::new())
        }
        StoreBackend::Postgres => {
            let url = settings
                .store
                .database_url
                .as_deref()
                .context("store.database_url is required for the postgres backend")?;
            let store = PostgresStore::connect(url, settings.store.max_connections)
                .await
                .context("failed to connect to postgres")?;
            store.migrate().await.context("failed to apply migrations")?;
            Arc::new(store)
        }
    };

    if let Some(admin) = settings.auth.bootstrap_admin() {
        seed_admin(store.as_ref(), admin)
            .await
            .context("failed to seed the bootstrap admin")?;
    }

    let services = Services::from_settings(store, &settings);
    let app = build_app(AppState::from_settings(services, &settings));

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(address = %listener.local_addr()?, environment = %settings.environment, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
