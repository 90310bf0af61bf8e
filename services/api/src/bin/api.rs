//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        anthropic_llm::AnthropicGenerationAdapter, db::PgReportStore, gmail::GmailSource,
        openai_llm::OpenAiGenerationAdapter,
    },
    config::{Config, ProviderKind},
    error::ApiError,
    web::{
        delete_report_handler, generate_report_handler, get_report_by_date_handler,
        get_report_by_id_handler, list_reports_handler, rest::ApiDoc, state::AppState,
    },
};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{get, post},
    Router,
};
use async_openai::{config::OpenAIConfig, Client};
use mail_report_core::pipeline::{PipelineConfig, ReportPipeline};
use mail_report_core::ports::TextGeneration;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let store = Arc::new(PgReportStore::new(db_pool.clone()));
    info!("Running database migrations...");
    store.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let http = reqwest::Client::new();

    // The generation backend is chosen exactly once, here. Everything
    // downstream works against the trait.
    let provider: Arc<dyn TextGeneration> = match config.provider {
        ProviderKind::OpenAi => {
            let api_key = config.openai_api_key.as_ref().ok_or_else(|| {
                ApiError::Internal("OPENAI_API_KEY is required for AI_PROVIDER=openai".to_string())
            })?;
            let openai_config = OpenAIConfig::new().with_api_key(api_key);
            Arc::new(OpenAiGenerationAdapter::new(
                Client::with_config(openai_config),
                config.openai_model.clone(),
            ))
        }
        ProviderKind::Anthropic => {
            let api_key = config.anthropic_api_key.as_ref().ok_or_else(|| {
                ApiError::Internal(
                    "ANTHROPIC_API_KEY is required for AI_PROVIDER=anthropic".to_string(),
                )
            })?;
            Arc::new(AnthropicGenerationAdapter::new(
                http.clone(),
                api_key.clone(),
                config.anthropic_model.clone(),
            ))
        }
    };

    let mail = Arc::new(GmailSource::new(
        http.clone(),
        config.gmail_access_token.clone(),
    ));

    let pipeline_config = PipelineConfig {
        max_threads_per_batch: config.max_threads_per_batch,
        max_reference_threads: config.max_reference_threads,
        max_fetch_results: config.max_fetch_results,
        provider_timeout: config.provider_timeout,
        ..PipelineConfig::default()
    };
    let pipeline = Arc::new(ReportPipeline::new(
        mail,
        provider,
        store.clone(),
        pipeline_config,
    ));

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState { pipeline, store });

    let cors = CorsLayer::new()
        .allow_origin("http://localhost:3000".parse::<HeaderValue>().map_err(|e| {
            ApiError::Internal(format!("invalid CORS origin: {}", e))
        })?)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    let api_router = Router::new()
        .route("/reports/generate", post(generate_report_handler))
        .route("/reports", get(list_reports_handler))
        .route("/reports/by-date/{date}", get(get_report_by_date_handler))
        .route(
            "/reports/{id}",
            get(get_report_by_id_handler).delete(delete_report_handler),
        )
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
