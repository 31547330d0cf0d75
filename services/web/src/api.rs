use crate::classes::{ClassColors, SkinClass};
use crate::config::ApiConfig;
use crate::i18n::{Bundle, Catalog, PerformanceRow};
use crate::model_info::ModelInfo;
use crate::presenter::PredictionView;
use crate::upload::{IncomingUpload, RejectReason, UploadError, UploadService};
use anyhow::{Context, Result};
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

/// Cookie holding the session language
pub const LANG_COOKIE: &str = "lang";

/// Multipart field carrying the image
const FILE_FIELD: &str = "file";

/// Room for multipart boundaries and headers on top of the file limit
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub uploads: Arc<UploadService>,
    pub catalog: Arc<Catalog>,
    pub model_info: Arc<ModelInfo>,
    pub static_dir: PathBuf,
    pub service_name: String,
}

impl AppState {
    /// Active bundle for the request, with model details filled in
    fn bundle_for(&self, jar: &CookieJar) -> (String, Bundle) {
        let resolved = self.catalog.resolve(jar.get(LANG_COOKIE).map(|c| c.value()));
        (
            resolved.code.to_string(),
            resolved.bundle.with_model_info(&self.model_info),
        )
    }
}

/// Sample image shown in the gallery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExampleImage {
    pub class: SkinClass,
    pub url: String,
}

/// Collect the `<static_dir>/examples/<class>.jpg` files present right now,
/// in label order
pub async fn scan_examples(static_dir: &Path) -> Vec<ExampleImage> {
    let dir = static_dir.join("examples");
    let mut examples = Vec::new();

    for class in SkinClass::ALL {
        let file_name = format!("{}.jpg", class.as_str());
        match tokio::fs::metadata(dir.join(&file_name)).await {
            Ok(metadata) if metadata.is_file() => examples.push(ExampleImage {
                class,
                url: format!("/static/examples/{}", file_name),
            }),
            _ => {}
        }
    }

    examples
}

/// Landing page content
#[derive(Debug, Serialize)]
pub struct LandingResponse {
    pub lang: String,
    pub translations: Bundle,
    pub model_performance: Vec<PerformanceRow>,
    pub class_colors: ClassColors,
}

/// Language switch request
#[derive(Debug, Deserialize)]
pub struct SetLanguageRequest {
    #[serde(default)]
    pub lang: Option<String>,
}

/// Language switch response
#[derive(Debug, Serialize)]
pub struct SetLanguageResponse {
    pub success: bool,
    pub lang: String,
    pub translations: Bundle,
}

/// Successful prediction response
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub success: bool,
    pub result: PredictionView,
}

/// Example gallery response
#[derive(Debug, Serialize)]
pub struct ExamplesResponse {
    pub examples: Vec<ExampleImage>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Errors returned by handlers
#[derive(Debug)]
pub enum ApiError {
    /// Bad input, message already localized
    BadRequest { message: String, code: &'static str },
    /// Upload over the size limit, message already localized
    PayloadTooLarge(String),
    /// Storage or inference failure
    Internal { message: String, code: &'static str },
}

impl ApiError {
    /// Map an upload failure using the request's language bundle
    fn from_upload(err: UploadError, bundle: &Bundle) -> Self {
        match err {
            UploadError::Rejected(RejectReason::NoImage) => ApiError::BadRequest {
                message: bundle.error_no_image.clone(),
                code: "NO_IMAGE",
            },
            UploadError::Rejected(RejectReason::InvalidType) => ApiError::BadRequest {
                message: bundle.error_invalid_type.clone(),
                code: "INVALID_TYPE",
            },
            UploadError::Rejected(RejectReason::TooLarge) => {
                ApiError::PayloadTooLarge(bundle.error_too_large.clone())
            }
            UploadError::Storage(e) => ApiError::Internal {
                message: format!("Error: {}", e),
                code: "STORAGE_ERROR",
            },
            UploadError::Inference(e) => ApiError::Internal {
                message: format!("Error: {}", e),
                code: "INFERENCE_ERROR",
            },
        }
    }

    fn from_multipart(err: MultipartError, bundle: &Bundle) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::PayloadTooLarge(bundle.error_too_large.clone());
        }
        warn!(error = %err, "Malformed multipart body");
        ApiError::BadRequest {
            message: bundle.error_no_image.clone(),
            code: "NO_IMAGE",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, code) = match self {
            ApiError::BadRequest { message, code } => (StatusCode::BAD_REQUEST, message, code),
            ApiError::PayloadTooLarge(message) => (StatusCode::PAYLOAD_TOO_LARGE, message, "TOO_LARGE"),
            ApiError::Internal { message, code } => (StatusCode::INTERNAL_SERVER_ERROR, message, code),
        };

        (
            status,
            Json(ErrorResponse {
                error,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    let static_files = ServeDir::new(&state.static_dir);

    Router::new()
        .route("/", get(index))
        .route("/set_language", post(set_language))
        .route(
            "/predict",
            post(predict).layer(DefaultBodyLimit::max(
                config.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD),
            )),
        )
        .route("/examples", get(examples))
        .route("/health", get(health_check))
        .nest_service("/static", static_files)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Landing content in the session language
async fn index(State(state): State<AppState>, jar: CookieJar) -> Json<LandingResponse> {
    let (lang, translations) = state.bundle_for(&jar);

    Json(LandingResponse {
        lang,
        translations,
        model_performance: state.catalog.model_performance().to_vec(),
        class_colors: ClassColors,
    })
}

/// Switch the session language
#[instrument(skip(state, jar))]
async fn set_language(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<SetLanguageRequest>,
) -> (CookieJar, Json<SetLanguageResponse>) {
    let resolved = state.catalog.resolve(request.lang.as_deref());
    let lang = resolved.code.to_string();
    let translations = resolved.bundle.with_model_info(&state.model_info);

    let cookie = Cookie::build((LANG_COOKIE, lang.clone()))
        .path("/")
        .http_only(true);

    info!(lang = %lang, fell_back = resolved.fell_back, "Session language set");

    (
        jar.add(cookie),
        Json(SetLanguageResponse {
            success: true,
            lang,
            translations,
        }),
    )
}

/// Accept an uploaded image and classify it
#[instrument(skip_all)]
async fn predict(
    State(state): State<AppState>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Result<Json<PredictResponse>, ApiError> {
    let (_, bundle) = state.bundle_for(&jar);

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::from_multipart(e, &bundle))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::from_multipart(e, &bundle))?;
        upload = Some(IncomingUpload { filename, bytes });
        break;
    }

    let result = state.uploads.handle(upload, &bundle).await.map_err(|e| {
        if !matches!(e, UploadError::Rejected(_)) {
            error!(error = %e, "Prediction failed");
        }
        ApiError::from_upload(e, &bundle)
    })?;

    Ok(Json(PredictResponse {
        success: true,
        result,
    }))
}

/// Example gallery
async fn examples(State(state): State<AppState>) -> Json<ExamplesResponse> {
    Json(ExamplesResponse {
        examples: scan_examples(&state.static_dir).await,
    })
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": state.service_name,
    }))
}

/// Start the API server and run until `shutdown` resolves
pub async fn start_api_server<F>(state: AppState, config: &ApiConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
