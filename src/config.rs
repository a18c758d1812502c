use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;

use crate::naming::ReportPeriod;
use crate::notify::RelayMode;
use crate::pipeline::Disposal;
use crate::report::ReportKind;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub report: ReportKind,
    /// Directory the browser automation saved its downloads into
    pub download_dir: PathBuf,
    /// Directory holding the metadata database
    pub data_dir: PathBuf,
    pub storage: StorageConfig,
    pub webhook: Option<WebhookConfig>,
    /// Where the downloads themselves are forwarded, if anywhere
    pub relay: Option<RelayConfig>,
    /// What to do with downloads once stored
    pub disposal: Disposal,
    pub http_timeout: Duration,
    /// Date window from `INPUT_JSON`, if provided
    pub period: Option<ReportPeriod>,
    /// Divisions expected in this run, for the missing-file check
    pub divisions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Gcs,
    Local,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory for local storage backend
    pub local_storage_path: PathBuf,
    /// GCS bucket name (required when backend is gcs)
    pub gcs_bucket: Option<String>,
    /// Path to GCS service account JSON (optional, defaults to the metadata server)
    pub gcs_credentials_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub url: String,
    pub flow: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub url: String,
    pub mode: RelayMode,
    /// `folderId` from `INPUT_JSON`
    pub folder_id: Option<String>,
    /// `executionId` from `INPUT_JSON`
    pub execution_id: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            local_storage_path: PathBuf::from("./blobs"),
            gcs_bucket: None,
            gcs_credentials_file: None,
        }
    }
}

/// Shape of `INPUT_JSON`, as posted by the workflow trigger.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InputJson {
    from_date: Option<String>,
    to_date: Option<String>,
    folder_id: Option<String>,
    execution_id: Option<String>,
}

/// What `INPUT_JSON` contributes to the config.
#[derive(Debug, Default)]
struct RunInput {
    period: Option<ReportPeriod>,
    folder_id: Option<String>,
    execution_id: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let report = var("REPORT_TYPE")
            .ok_or(ConfigError::Missing("REPORT_TYPE"))?
            .parse::<ReportKind>()
            .map_err(|e| ConfigError::Invalid {
                name: "REPORT_TYPE",
                reason: e.to_string(),
            })?;

        let download_dir = var("DOWNLOAD_DIR")
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("DOWNLOAD_DIR"))?;

        let data_dir = PathBuf::from(var("DATA_DIR").unwrap_or_else(|| "./data".to_string()));

        let backend = match var("STORAGE_BACKEND")
            .unwrap_or_else(|| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "gcs" => StorageBackend::Gcs,
            "local" => StorageBackend::Local,
            other => {
                return Err(ConfigError::Invalid {
                    name: "STORAGE_BACKEND",
                    reason: format!("expected \"local\" or \"gcs\", got {other:?}"),
                })
            }
        };

        let storage = StorageConfig {
            backend,
            local_storage_path: var("LOCAL_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| StorageConfig::default().local_storage_path),
            gcs_bucket: var("GCS_BUCKET"),
            gcs_credentials_file: var("GCS_CREDENTIALS_FILE"),
        };

        let webhook = var("WEBHOOK_URL").map(|url| WebhookConfig {
            url,
            flow: var("WEBHOOK_FLOW").unwrap_or_else(|| "crm".to_string()),
        });

        let http_timeout = match var("HTTP_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|_| ConfigError::Invalid {
                    name: "HTTP_TIMEOUT_SECS",
                    reason: format!("not a whole number of seconds: {raw:?}"),
                })?;
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(30),
        };

        let input = var("INPUT_JSON")
            .map(|raw| parse_input_json(&raw))
            .transpose()?
            .unwrap_or_default();

        let relay = match var("RELAY_WEBHOOK_URL") {
            Some(url) => Some(RelayConfig {
                url,
                mode: var("RELAY_MODE")
                    .map(|m| m.parse::<RelayMode>())
                    .transpose()
                    .map_err(|reason| ConfigError::Invalid {
                        name: "RELAY_MODE",
                        reason,
                    })?
                    .unwrap_or(RelayMode::Batch),
                folder_id: input.folder_id,
                execution_id: input.execution_id,
            }),
            None => None,
        };

        let disposal = match var("PROCESSED_FILES")
            .unwrap_or_else(|| "keep".to_string())
            .to_lowercase()
            .as_str()
        {
            "keep" => Disposal::Keep,
            "delete" => Disposal::Delete,
            "archive" => Disposal::Archive(
                var("ARCHIVE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| download_dir.join("processed")),
            ),
            other => {
                return Err(ConfigError::Invalid {
                    name: "PROCESSED_FILES",
                    reason: format!("expected \"keep\", \"delete\" or \"archive\", got {other:?}"),
                })
            }
        };

        let divisions = var("DIVISIONS")
            .map(|d| {
                d.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let config = Config {
            report,
            download_dir,
            data_dir,
            storage,
            webhook,
            relay,
            disposal,
            http_timeout,
            period: input.period,
            divisions,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if matches!(self.storage.backend, StorageBackend::Gcs) && self.storage.gcs_bucket.is_none()
        {
            return Err(ConfigError::ValidationError(
                "GCS_BUCKET is required when STORAGE_BACKEND=gcs".to_string(),
            ));
        }

        if let Some(ref webhook) = self.webhook {
            if !(webhook.url.starts_with("http://") || webhook.url.starts_with("https://")) {
                return Err(ConfigError::Invalid {
                    name: "WEBHOOK_URL",
                    reason: "must be an http(s) URL".to_string(),
                });
            }
        }

        if let Some(ref relay) = self.relay {
            if !(relay.url.starts_with("http://") || relay.url.starts_with("https://")) {
                return Err(ConfigError::Invalid {
                    name: "RELAY_WEBHOOK_URL",
                    reason: "must be an http(s) URL".to_string(),
                });
            }
        }

        if self.http_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                name: "HTTP_TIMEOUT_SECS",
                reason: "must be greater than zero".to_string(),
            });
        }

        if !self.divisions.is_empty() && self.period.is_none() {
            tracing::warn!("DIVISIONS is set without INPUT_JSON; the missing-file check is skipped");
        }

        Ok(())
    }
}

fn parse_input_json(raw: &str) -> Result<RunInput, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        name: "INPUT_JSON",
        reason,
    };

    let input: InputJson =
        serde_json::from_str(raw).map_err(|e| invalid(format!("not valid JSON: {e}")))?;
    let non_blank = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

    let period = match (input.from_date, input.to_date) {
        (Some(from), Some(to)) => Some(parse_period(&from, &to)?),
        (None, None) => None,
        _ => {
            return Err(invalid(
                "must contain both \"fromDate\" and \"toDate\", or neither".to_string(),
            ))
        }
    };

    Ok(RunInput {
        period,
        folder_id: non_blank(input.folder_id),
        execution_id: non_blank(input.execution_id),
    })
}

fn parse_period(from: &str, to: &str) -> Result<ReportPeriod, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        name: "INPUT_JSON",
        reason,
    };

    let parse = |label: &str, s: &str| {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map_err(|e| invalid(format!("{label} {s:?} is not YYYY-MM-DD: {e}")))
    };
    let from = parse("fromDate", from)?;
    let to = parse("toDate", to)?;

    if from > to {
        return Err(invalid(format!("fromDate {from} is after toDate {to}")));
    }
    Ok(ReportPeriod { from, to })
}
