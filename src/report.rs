//! Built-in report types. Each one is a descriptor for the generic pipeline.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::naming::{FilenameTemplate, ReportFile, TemplateShape};
use crate::partition::PartitionKey;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown report type: {0:?}")]
pub struct UnknownReportKind(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    EmployeeVisit,
    Pob,
    StockistWise,
    Secondary,
    MslDetailed,
    SupportItem,
    VisitActivity,
    DrService,
    WorkSummary,
    MslSummary,
}

/// Where a report's blobs land and which partition its rows go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// `{year}/{mon}` folders and partitions taken from the filename date.
    Dated,
    /// One folder and one partition for every file of the report.
    Fixed {
        folder: &'static str,
        partition: &'static str,
    },
}

impl Placement {
    /// Blob folder below the container, `None` for an undated file under [`Placement::Dated`].
    pub fn folder(&self, file: &ReportFile) -> Option<String> {
        match self {
            Placement::Dated => file
                .date
                .map(|date| format!("{}/{}", date.year, date.month.lower())),
            Placement::Fixed { folder, .. } => Some(folder.to_string()),
        }
    }

    pub fn partition_key(&self, file: &ReportFile, shape: TemplateShape) -> Option<PartitionKey> {
        match self {
            Placement::Dated => file.partition_key(shape),
            Placement::Fixed { partition, .. } => Some(PartitionKey::fixed(partition)),
        }
    }
}

/// Everything the pipeline needs to know about one report type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSpec {
    pub name: &'static str,
    pub template: FilenameTemplate,
    /// Leading path segment for blobs.
    pub container: &'static str,
    pub table: &'static str,
    pub placement: Placement,
    /// `Type` sent with the drop webhook; `None` disables notification.
    pub notification_type: Option<&'static str>,
}

impl ReportKind {
    pub const ALL: [ReportKind; 10] = [
        ReportKind::EmployeeVisit,
        ReportKind::Pob,
        ReportKind::StockistWise,
        ReportKind::Secondary,
        ReportKind::MslDetailed,
        ReportKind::SupportItem,
        ReportKind::VisitActivity,
        ReportKind::DrService,
        ReportKind::WorkSummary,
        ReportKind::MslSummary,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ReportKind::EmployeeVisit => "employee-visit",
            ReportKind::Pob => "pob",
            ReportKind::StockistWise => "stockist-wise",
            ReportKind::Secondary => "secondary",
            ReportKind::MslDetailed => "msl-detailed",
            ReportKind::SupportItem => "support-item",
            ReportKind::VisitActivity => "visit-activity",
            ReportKind::DrService => "dr-service",
            ReportKind::WorkSummary => "work-summary",
            ReportKind::MslSummary => "msl-summary",
        }
    }

    pub fn spec(self) -> ReportSpec {
        use TemplateShape::*;

        let (prefix, shape, ext, store, notification_type) = match self {
            ReportKind::EmployeeVisit => {
                ("Daily_Visit", MonthYear, "xlsx", "employeevisit", Some("employeevisit"))
            }
            ReportKind::Pob => ("POB_Daily", IsoDate, "xlsx", "pob", Some("pob")),
            ReportKind::StockistWise => {
                ("StockistWise", StateMonthRange, "xlsx", "secondaryreports", None)
            }
            ReportKind::Secondary => ("Secondary", StateMonthYear, "xlsx", "secondary", None),
            ReportKind::MslDetailed => ("MSL_Detailed", MonthYear, "xlsx", "support", None),
            ReportKind::SupportItem => {
                ("MSL_Detailed", MonthYear, "xlsx", "supportitem", Some("supportitem"))
            }
            ReportKind::VisitActivity => {
                ("Visit_Activity", MonthYear, "csv", "visit", Some("visit"))
            }
            ReportKind::DrService => ("All_Dr_Service", MonthYear, "xlsx", "service", None),
            ReportKind::WorkSummary => {
                ("work_summary", DayMonthYear, "xlsx", "worksummary", None)
            }
            ReportKind::MslSummary => ("MSL", Undated, "xlsx", "master", None),
        };
        let placement = match self {
            ReportKind::MslSummary => Placement::Fixed {
                folder: "msl_summary",
                partition: "doctor",
            },
            _ => Placement::Dated,
        };

        ReportSpec {
            name: self.name(),
            template: FilenameTemplate::new(prefix, shape, ext),
            container: store,
            table: store,
            placement,
            notification_type,
        }
    }
}

impl FromStr for ReportKind {
    type Err = UnknownReportKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        ReportKind::ALL
            .into_iter()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| UnknownReportKind(s.to_string()))
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
