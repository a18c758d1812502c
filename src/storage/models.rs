use serde::{Deserialize, Serialize};

/// Pointer to the latest blob for one logical report, stored per (partition, row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub partition_key: String,
    /// `{division}` or `{division}-{state}`
    pub row_key: String,
    pub file_url: String,
    /// Name of the download as found on disk
    pub file_name: String,
    pub division: String,
    #[serde(default)]
    pub state: Option<String>,
    /// Lowercase three-letter month, absent for undated reports
    #[serde(default)]
    pub month: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
}
