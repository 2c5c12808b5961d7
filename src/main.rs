use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use adboard::config::Config;
use adboard::openapi::ApiDoc;
use adboard::storage::build_file_store;
use adboard::{config, AdService, AppState};

#[cfg(not(any(feature = "inmem-store", feature = "postgres-store")))]
compile_error!("enable a store backend: feature `inmem-store` or `postgres-store`");

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds; production sets the environment externally.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = Config::from_env().context("invalid configuration")?;
    info!("Bootstrapping adboard server");
    info!("Frontend URL: {}", cfg.frontend_url.as_deref().unwrap_or("http://localhost:5173"));

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo = {
        use adboard::repo::inmem::InMemRepo;
        match &cfg.snapshot_path {
            Some(path) => {
                info!("Using in-memory repository backend (snapshot {})", path.display());
                InMemRepo::with_snapshot(path.clone())
            }
            None => {
                info!("Using in-memory repository backend");
                InMemRepo::new()
            }
        }
    };

    #[cfg(feature = "postgres-store")]
    let repo = {
        use sqlx::postgres::PgPoolOptions;
        let db_url = cfg
            .database_url
            .as_deref()
            .context("DATABASE_URL must be set for postgres-store")?;
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .context("failed to connect to Postgres")?;
        let repo = adboard::repo::pg::PgRepo::new(pool);
        repo.migrate().await.context("failed to apply migrations")?;
        info!("Using Postgres repository backend");
        repo
    };

    let blobs = build_file_store(&cfg).await?;
    let service = AdService::new(Arc::new(repo), blobs).with_concurrency(cfg.concurrency);
    let state = AppState { service, max_upload_bytes: cfg.max_upload_bytes };
    info!("Concurrency mode: {:?}", cfg.concurrency);

    let openapi = ApiDoc::openapi();
    let frontend_url = cfg.frontend_url.clone();

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                // during local dev allow React/Vite default ports
                .allowed_origin("http://localhost:5173")
                .allowed_origin("http://127.0.0.1:5173")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "PUT", "DELETE", "OPTIONS"])
                .supports_credentials()
                .max_age(3600);
            if let Some(front) = &frontend_url {
                c = c.allowed_origin(front);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind((cfg.host.as_str(), cfg.port))?;

    info!("Listening on http://{}:{}", cfg.host, cfg.port);

    server.run().await?;
    Ok(())
}
