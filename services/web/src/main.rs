use anyhow::{Context, Result};
use dermascan_web::api::{scan_examples, start_api_server, AppState};
use dermascan_web::classifier::{InferenceAdapter, OnnxClassifier};
use dermascan_web::config::Config;
use dermascan_web::i18n::Catalog;
use dermascan_web::model_info::ModelInfo;
use dermascan_web::storage::UploadStore;
use dermascan_web::sweeper::{RetentionPolicy, RetentionSweeper};
use dermascan_web::upload::UploadService;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level, &config.service.log_format);

    info!(
        service = %config.service.name,
        "Starting Dermascan web service"
    );

    // Initialize metrics
    if config.service.metrics_enabled {
        init_metrics(config.service.metrics_port)?;
    }

    // Load text catalog and model
    let catalog = Catalog::builtin(Some(config.i18n.default_language.as_str()))
        .context("Failed to load text catalog")?;

    let classifier = OnnxClassifier::load(&config.model).context("Failed to load classifier model")?;
    let model_info = ModelInfo::detect(&config.model.path, &config.model.models_dir);
    info!(
        model = %model_info.file_name,
        size = %model_info.size,
        "Model metadata detected"
    );

    // Storage and retention
    let store = UploadStore::from_config(&config.storage, config.api.max_upload_bytes);
    tokio::fs::create_dir_all(store.root())
        .await
        .with_context(|| format!("Failed to create upload directory {}", store.root().display()))?;

    let sweeper = Arc::new(RetentionSweeper::new(
        store.root(),
        RetentionPolicy::new(config.retention_window()),
    ));

    // Clear out anything left from a previous run
    drop(sweeper.spawn());

    let adapter = InferenceAdapter::new(Arc::new(classifier), config.inference_timeout());
    let uploads = UploadService::new(store, sweeper, adapter, config.retention.sweep_on_upload);

    if scan_examples(&config.storage.static_dir).await.is_empty() {
        warn!(static_dir = %config.storage.static_dir.display(), "No example images found");
    }

    // Create API state
    let api_state = AppState {
        uploads: Arc::new(uploads),
        catalog: Arc::new(catalog),
        model_info: Arc::new(model_info),
        static_dir: config.storage.static_dir.clone(),
        service_name: config.service.name.clone(),
    };

    info!("Dermascan web service started successfully");

    start_api_server(api_state, &config.api, shutdown_signal()).await?;

    info!("Dermascan web service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str, log_format: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    if log_format == "pretty" {
        registry.with(fmt::layer().pretty()).init();
    } else {
        registry.with(fmt::layer().json()).init();
    }
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
