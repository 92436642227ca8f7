pub mod api;
pub mod config;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::orchestrator::ScanOrchestrator;
use crate::services::scanner::ScanClient;
use crate::services::staging::StagingStore;
use crate::services::upload_service::UploadService;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::index::upload_form,
        api::handlers::upload::upload_file,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::upload::UploadForm,
            api::handlers::upload::UploadResponse,
            api::handlers::upload::UploadStatus,
            api::handlers::upload::MessageLevel,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "upload", description = "Scan-before-store uploads"),
        (name = "system", description = "Service health")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub staging: Arc<StagingStore>,
    pub scanner: Arc<dyn ScanClient>,
    pub upload_service: Arc<UploadService>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(config: AppConfig, staging: Arc<StagingStore>, scanner: Arc<dyn ScanClient>) -> Self {
        let orchestrator = ScanOrchestrator::new(scanner.clone(), staging.clone());
        let upload_service = Arc::new(UploadService::new(staging.clone(), orchestrator));
        Self {
            staging,
            scanner,
            upload_service,
            config,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(api::handlers::index::upload_form))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/upload",
            post(api::handlers::upload::upload_file)
                .layer(DefaultBodyLimit::max(state.config.max_upload_bytes)),
        )
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .with_state(state)
}
