use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use report_relay::{
    config::{Config, StorageBackend},
    notify::{FileRelay, WebhookNotifier},
    object_store as obj,
    pipeline::{Expectation, Pipeline},
    storage::Database,
    upload::BlobUploader,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "report-relay starting");

    // Load configuration
    let config = Config::load()?;
    let spec = config.report.spec();
    info!(
        report = spec.name,
        template = %spec.template,
        dir = %config.download_dir.display(),
        "Loaded configuration"
    );

    let db = Database::open(&config.data_dir)?;
    info!("Database opened at: {}", config.data_dir.display());

    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()?;

    // Initialize object store backend
    let object_store: Arc<dyn obj::ObjectStore> = match config.storage.backend {
        StorageBackend::Local => {
            let store = obj::LocalStore::new(&config.storage.local_storage_path)?;
            info!(
                "Using local storage backend at: {}",
                config.storage.local_storage_path.display()
            );
            Arc::new(store)
        }
        StorageBackend::Gcs => {
            let bucket = config
                .storage
                .gcs_bucket
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("GCS_BUCKET is required when STORAGE_BACKEND=gcs"))?;
            let store = obj::GcsStore::new(
                bucket,
                config.storage.gcs_credentials_file.as_deref(),
                http.clone(),
            )
            .await?;
            info!("Using GCS storage backend, bucket: {}", bucket);
            Arc::new(store)
        }
    };

    let notifier = match (&config.webhook, spec.notification_type) {
        (Some(webhook), Some(report_type)) => Some(WebhookNotifier::new(
            http.clone(),
            &webhook.url,
            &webhook.flow,
            report_type,
        )),
        (Some(_), None) => {
            info!(report = spec.name, "Report type sends no webhook; WEBHOOK_URL ignored");
            None
        }
        (None, _) => None,
    };

    let uploader = BlobUploader::new(object_store, spec.container, spec.placement);
    let mut pipeline =
        Pipeline::new(spec, uploader, db, notifier)?.with_disposal(config.disposal.clone());
    if let Some(ref relay) = config.relay {
        info!(url = %relay.url, mode = ?relay.mode, "Relaying downloads");
        pipeline = pipeline.with_relay(
            FileRelay::new(http.clone(), &relay.url, relay.mode).with_ids(
                relay.folder_id.as_deref().unwrap_or_default(),
                relay.execution_id.as_deref().unwrap_or_default(),
            ),
        );
    }
    if let Some(period) = config.period {
        pipeline = pipeline.with_expectation(Expectation {
            period,
            divisions: config.divisions.clone(),
        });
    }

    let summary = pipeline.run(&config.download_dir).await?;

    info!(
        run_id = %summary.run_id,
        uploaded = summary.uploaded.len(),
        skipped = summary.skipped.len(),
        failed = summary.failed.len(),
        relayed = summary.relayed.sent,
        disposed = summary.disposed.len(),
        "Done"
    );
    if !summary.failed.is_empty() {
        anyhow::bail!("{} file(s) failed to relay", summary.failed.len());
    }
    Ok(())
}
