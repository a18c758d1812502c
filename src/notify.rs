//! Fire-and-forget calls to the workflow webhooks: "drop" notifications per
//! period, and the file relay that forwards the downloads themselves.

use std::collections::BTreeSet;
use std::str::FromStr;

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::naming::ReportFile;
use crate::partition::PartitionKey;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Webhook returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Body posted once per period: `{"Date": "2025-jul", "Drop": "true", "flow": "crm", "Type": ["employeevisit"]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropNotification {
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Drop")]
    pub drop: String,
    pub flow: String,
    #[serde(rename = "Type")]
    pub report_types: Vec<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchSummary {
    pub sent: usize,
    pub failed: usize,
}

pub struct WebhookNotifier {
    client: Client,
    url: String,
    flow: String,
    report_type: String,
}

impl WebhookNotifier {
    pub fn new(client: Client, url: &str, flow: &str, report_type: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
            flow: flow.to_string(),
            report_type: report_type.to_string(),
        }
    }

    pub fn payload(&self, period: &str) -> DropNotification {
        DropNotification {
            date: period.to_string(),
            drop: "true".to_string(),
            flow: self.flow.clone(),
            report_types: vec![self.report_type.clone()],
        }
    }

    /// Single attempt. Returns the response body on 2xx.
    pub async fn notify(&self, period: &str) -> Result<String, NotifyError> {
        let payload = self.payload(period);
        tracing::debug!(url = %self.url, date = %payload.date, "Posting webhook");

        let resp = self.client.post(&self.url).json(&payload).send().await?;
        check_status(resp).await
    }

    /// One POST per distinct `{year}-{mon}` period among `partitions`.
    /// Failures are logged and counted; nothing is retried.
    pub async fn notify_all(&self, partitions: &BTreeSet<PartitionKey>) -> DispatchSummary {
        let periods: BTreeSet<&str> = partitions.iter().map(|p| p.period()).collect();
        let mut summary = DispatchSummary::default();

        for period in periods {
            match self.notify(period).await {
                Ok(body) => {
                    tracing::info!(period, response = %body, "Webhook triggered");
                    summary.sent += 1;
                }
                Err(e) => {
                    tracing::error!(period, error = %e, "Webhook failed");
                    summary.failed += 1;
                }
            }
        }

        summary
    }
}

/// How [`FileRelay`] forwards downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    /// One multipart POST per run with every file under `files` and its name under `file_names`.
    Batch,
    /// One raw POST per file, described by `division`, `month` and `year` query parameters.
    PerFile,
}

impl FromStr for RelayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "batch" => Ok(RelayMode::Batch),
            "per-file" | "per_file" => Ok(RelayMode::PerFile),
            other => Err(format!("expected \"batch\" or \"per-file\", got {other:?}")),
        }
    }
}

/// A download held in memory for a batch relay.
#[derive(Debug, Clone)]
pub struct RelayFile {
    pub name: String,
    pub data: Bytes,
}

/// Forwards the downloaded files to a workflow webhook. Single attempt, like [`WebhookNotifier`].
pub struct FileRelay {
    client: Client,
    url: String,
    mode: RelayMode,
    folder_id: String,
    execution_id: String,
}

impl FileRelay {
    pub fn new(client: Client, url: &str, mode: RelayMode) -> Self {
        Self {
            client,
            url: url.to_string(),
            mode,
            folder_id: String::new(),
            execution_id: String::new(),
        }
    }

    /// Ids of the workflow run, echoed back as `folderId` and `executionId` on batch uploads.
    pub fn with_ids(mut self, folder_id: &str, execution_id: &str) -> Self {
        self.folder_id = folder_id.to_string();
        self.execution_id = execution_id.to_string();
        self
    }

    pub fn mode(&self) -> RelayMode {
        self.mode
    }

    /// Post every file in one multipart request.
    pub async fn send_batch(&self, files: &[RelayFile]) -> Result<String, NotifyError> {
        let mut form = Form::new();
        for file in files {
            let part = Part::bytes(file.data.to_vec())
                .file_name(file.name.clone())
                .mime_str(content_type(&file.name).as_ref())?;
            form = form.part("files", part);
        }
        for file in files {
            form = form.text("file_names", file.name.clone());
        }

        tracing::debug!(url = %self.url, count = files.len(), "Relaying files");
        let resp = self
            .client
            .post(&self.url)
            .query(&[
                ("folderId", self.folder_id.as_str()),
                ("executionId", self.execution_id.as_str()),
            ])
            .multipart(form)
            .send()
            .await?;
        check_status(resp).await
    }

    /// Post a single file as the raw request body.
    pub async fn send_file(&self, file: &ReportFile, data: Bytes) -> Result<String, NotifyError> {
        let mut query = vec![("division", file.division.clone())];
        if let Some(date) = file.date {
            query.push(("month", date.month.lower()));
            query.push(("year", date.year.to_string()));
        }

        tracing::debug!(url = %self.url, file = %file.file_name, "Relaying file");
        let resp = self
            .client
            .post(&self.url)
            .query(&query)
            .header(reqwest::header::CONTENT_TYPE, content_type(&file.file_name).as_ref())
            .header(
                reqwest::header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.file_name.replace('"', "")),
            )
            .body(data)
            .send()
            .await?;
        check_status(resp).await
    }
}

fn content_type(name: &str) -> mime_guess::Mime {
    mime_guess::from_path(name).first_or_octet_stream()
}

async fn check_status(resp: reqwest::Response) -> Result<String, NotifyError> {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(NotifyError::Status { status, body });
    }
    Ok(body)
}
