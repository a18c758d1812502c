//! Report filename codec.
//!
//! Most report types name their downloads with a fixed prefix, one or two free-text
//! segments (division, optionally state) and an anchored date suffix. Undated
//! summaries lead with the division instead: `{division}_{marker}_{label}`.
//! Decoding is a single regex match against that shape; anything that does not
//! match is foreign to the report type and gets skipped by the caller.

use chrono::{Datelike, NaiveDate};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::partition::{Month, PartitionKey};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NamingError {
    #[error("Template {template} requires field: {field}")]
    MissingField {
        template: String,
        field: &'static str,
    },
    #[error("Invalid template: {0}")]
    InvalidTemplate(String),
}

/// Layout of a report filename around its free-text segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateShape {
    /// `{prefix}_{division}_{Mon}-{YYYY}.{ext}`
    MonthYear,
    /// `{prefix}_{division}_{YYYY-MM-DD}.{ext}`
    IsoDate,
    /// `{prefix}_{division}_{state}_{Mon}-{Mon}-{YYYY}.{ext}`
    StateMonthRange,
    /// `{prefix}_{division}_{state}_{Mon}_{YYYY}.{ext}`
    StateMonthYear,
    /// `{prefix}_{division}_{DD}-{Mon}-{YYYY}.{ext}`
    DayMonthYear,
    /// `{division}_{prefix}_{label}.{ext}`, no date at all
    Undated,
}

impl TemplateShape {
    pub fn has_state(self) -> bool {
        matches!(
            self,
            TemplateShape::StateMonthRange | TemplateShape::StateMonthYear
        )
    }

    pub fn is_daily(self) -> bool {
        matches!(self, TemplateShape::DayMonthYear)
    }

    pub fn is_undated(self) -> bool {
        matches!(self, TemplateShape::Undated)
    }

    /// Full anchored pattern for `prefix` and `extension`.
    ///
    /// Free-text groups are lazy. With a single free-text group the anchored date
    /// suffix makes that unambiguous, so `AP_ELBRIT` decodes whole. With two groups
    /// the division stops at the first underscore and the state absorbs the rest:
    /// `Secondary_AP_ELBRIT_Tamil_Nadu_Jul_2025` is division `AP`, state
    /// `ELBRIT Tamil Nadu`. Undated names split at the first `_{prefix}_`.
    fn pattern(self, prefix: &str, extension: &str) -> String {
        let prefix = regex::escape(prefix);
        let extension = regex::escape(extension);
        let body = match self {
            TemplateShape::MonthYear => r"(?P<division>.+?)_(?P<month>[A-Za-z]{3})-(?P<year>\d{4})",
            TemplateShape::IsoDate => {
                r"(?P<division>.+?)_(?P<year>\d{4})-(?P<month_num>\d{2})-(?P<day>\d{2})"
            }
            TemplateShape::StateMonthRange => {
                r"(?P<division>.+?)_(?P<state>.+?)_(?P<month>[A-Za-z]{3})-(?P<through>[A-Za-z]{3})-(?P<year>\d{4})"
            }
            TemplateShape::StateMonthYear => {
                r"(?P<division>.+?)_(?P<state>.+?)_(?P<month>[A-Za-z]{3})_(?P<year>\d{4})"
            }
            TemplateShape::DayMonthYear => {
                r"(?P<division>.+?)_(?P<day>\d{2})-(?P<month>[A-Za-z]{3})-(?P<year>\d{4})"
            }
            TemplateShape::Undated => {
                return format!(r"^(?P<division>.+?)_{prefix}_(?P<label>.+)\.{extension}$");
            }
        };
        format!(r"^{prefix}_{body}\.{extension}$")
    }
}

/// Filename template for one report type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilenameTemplate {
    pub prefix: String,
    pub shape: TemplateShape,
    pub extension: String,
}

impl FilenameTemplate {
    pub fn new(prefix: &str, shape: TemplateShape, extension: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            shape,
            extension: extension.to_string(),
        }
    }
}

impl std::fmt::Display for FilenameTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let suffix = match self.shape {
            TemplateShape::MonthYear => "{division}_{Mon}-{YYYY}",
            TemplateShape::IsoDate => "{division}_{YYYY-MM-DD}",
            TemplateShape::StateMonthRange => "{division}_{state}_{Mon}-{Mon}-{YYYY}",
            TemplateShape::StateMonthYear => "{division}_{state}_{Mon}_{YYYY}",
            TemplateShape::DayMonthYear => "{division}_{DD}-{Mon}-{YYYY}",
            TemplateShape::Undated => {
                return write!(f, "{{division}}_{}_{{label}}.{}", self.prefix, self.extension);
            }
        };
        write!(f, "{}_{}.{}", self.prefix, suffix, self.extension)
    }
}

/// Date carried by a dated report filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDate {
    pub year: i32,
    pub month: Month,
    /// Closing month of a month-range report.
    pub through_month: Option<Month>,
    pub day: Option<u32>,
}

impl ReportDate {
    pub fn monthly(year: i32, month: Month) -> Self {
        Self {
            year,
            month,
            through_month: None,
            day: None,
        }
    }
}

/// A downloaded report, decoded from its filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFile {
    /// Name as found on disk.
    pub file_name: String,
    /// Division with underscores turned back into spaces.
    pub division: String,
    pub state: Option<String>,
    /// `None` for undated summaries.
    pub date: Option<ReportDate>,
    /// Trailing free text of an undated name, kept verbatim.
    pub label: Option<String>,
    pub extension: String,
}

impl ReportFile {
    /// `{division}` or `{division}-{state}`.
    pub fn row_key(&self) -> String {
        match &self.state {
            Some(state) => format!("{}-{}", self.division, state),
            None => self.division.clone(),
        }
    }

    /// Daily partition when the filename carries a day-of-month segment, monthly
    /// otherwise. Undated files have no date partition.
    pub fn partition_key(&self, shape: TemplateShape) -> Option<PartitionKey> {
        let date = self.date?;
        Some(match (shape.is_daily(), date.day) {
            (true, Some(day)) => PartitionKey::daily(date.year, date.month, day),
            _ => PartitionKey::monthly(date.year, date.month),
        })
    }
}

/// Date window a report was downloaded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPeriod {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// Compiled codec for a single [`FilenameTemplate`].
#[derive(Debug, Clone)]
pub struct FilenameCodec {
    template: FilenameTemplate,
    pattern: Regex,
}

impl FilenameCodec {
    pub fn new(template: FilenameTemplate) -> Result<Self, NamingError> {
        if template.prefix.is_empty() || template.extension.is_empty() {
            return Err(NamingError::InvalidTemplate(template.to_string()));
        }
        let source = template
            .shape
            .pattern(&template.prefix, &template.extension);
        let pattern =
            Regex::new(&source).map_err(|e| NamingError::InvalidTemplate(e.to_string()))?;
        Ok(Self { template, pattern })
    }

    /// Decode a filename, or `None` when it does not belong to this template.
    pub fn decode(&self, file_name: &str) -> Option<ReportFile> {
        let caps = self.pattern.captures(file_name)?;
        let division = free_text(caps.name("division")?.as_str())?;
        let state = match caps.name("state") {
            Some(m) => Some(free_text(m.as_str())?),
            None => None,
        };

        let (date, label) = match self.template.shape {
            TemplateShape::Undated => {
                let label = caps.name("label")?.as_str();
                if label.trim_matches(|c: char| c == '_' || c.is_whitespace()).is_empty() {
                    return None;
                }
                (None, Some(label.to_string()))
            }
            _ => (Some(self.decode_date(&caps)?), None),
        };

        Some(ReportFile {
            file_name: file_name.to_string(),
            division,
            state,
            date,
            label,
            extension: self.template.extension.clone(),
        })
    }

    /// Every date is checked against the calendar, so `31-Feb` never decodes.
    fn decode_date(&self, caps: &Captures<'_>) -> Option<ReportDate> {
        let year: i32 = caps.name("year")?.as_str().parse().ok()?;

        let (month, day) = match self.template.shape {
            TemplateShape::IsoDate => {
                let month_num: u32 = caps.name("month_num")?.as_str().parse().ok()?;
                let day: u32 = caps.name("day")?.as_str().parse().ok()?;
                (Month::from_number(month_num).ok()?, Some(day))
            }
            _ => {
                let month = parse_month(caps, "month")?;
                let day = match caps.name("day") {
                    Some(d) => Some(d.as_str().parse::<u32>().ok()?),
                    None => None,
                };
                (month, day)
            }
        };
        if let Some(day) = day {
            NaiveDate::from_ymd_opt(year, month.number(), day)?;
        }

        let through_month = match caps.name("through") {
            Some(_) => Some(parse_month(caps, "through")?),
            None => None,
        };

        Some(ReportDate {
            year,
            month,
            through_month,
            day,
        })
    }

    /// Build the filename for a decoded or freshly described report.
    pub fn encode(&self, report: &ReportFile) -> Result<String, NamingError> {
        let division = collapse_whitespace(&report.division);
        let date = || self.require(report.date, "date");
        let suffix = match self.template.shape {
            TemplateShape::MonthYear => {
                let date = date()?;
                format!("{}-{}", date.month, date.year)
            }
            TemplateShape::IsoDate => {
                let date = date()?;
                let day = self.require(date.day, "day")?;
                format!("{}-{:02}-{:02}", date.year, date.month.number(), day)
            }
            TemplateShape::StateMonthRange => {
                let state = self.require(report.state.as_deref(), "state")?;
                let date = date()?;
                let through = self.require(date.through_month, "through_month")?;
                format!(
                    "{}_{}-{}-{}",
                    collapse_whitespace(state),
                    date.month,
                    through,
                    date.year
                )
            }
            TemplateShape::StateMonthYear => {
                let state = self.require(report.state.as_deref(), "state")?;
                let date = date()?;
                format!(
                    "{}_{}_{}",
                    collapse_whitespace(state),
                    date.month,
                    date.year
                )
            }
            TemplateShape::DayMonthYear => {
                let date = date()?;
                let day = self.require(date.day, "day")?;
                format!("{:02}-{}-{}", day, date.month, date.year)
            }
            TemplateShape::Undated => {
                let label = self.require(report.label.as_deref(), "label")?;
                return Ok(format!(
                    "{}_{}_{}.{}",
                    division, self.template.prefix, label, self.template.extension
                ));
            }
        };
        Ok(format!(
            "{}_{}_{}.{}",
            self.template.prefix, division, suffix, self.template.extension
        ))
    }

    /// Filename a download for `division` over `period` is saved under.
    pub fn file_name_for(
        &self,
        division: &str,
        state: Option<&str>,
        period: &ReportPeriod,
    ) -> Result<String, NamingError> {
        let month = Month::from_number(period.from.month())
            .map_err(|e| NamingError::InvalidTemplate(e.to_string()))?;
        let through = Month::from_number(period.to.month())
            .map_err(|e| NamingError::InvalidTemplate(e.to_string()))?;
        let year = match self.template.shape {
            TemplateShape::StateMonthRange => period.to.year(),
            _ => period.from.year(),
        };
        let report = ReportFile {
            file_name: String::new(),
            division: division.to_string(),
            state: state.map(|s| s.to_string()),
            date: Some(ReportDate {
                year,
                month,
                through_month: Some(through),
                day: Some(period.from.day()),
            }),
            label: None,
            extension: self.template.extension.clone(),
        };
        self.encode(&report)
    }

    fn require<T>(&self, value: Option<T>, field: &'static str) -> Result<T, NamingError> {
        value.ok_or_else(|| NamingError::MissingField {
            template: self.template.to_string(),
            field,
        })
    }
}

fn parse_month(caps: &Captures<'_>, group: &str) -> Option<Month> {
    caps.name(group)?.as_str().parse().ok()
}

/// Underscores back to spaces, trimmed. Blank text is not a division or state.
fn free_text(s: &str) -> Option<String> {
    let text = s.replace('_', " ");
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(prefix: &str, shape: TemplateShape, ext: &str) -> FilenameCodec {
        FilenameCodec::new(FilenameTemplate::new(prefix, shape, ext)).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_decode_month_year_multi_word_division() {
        let codec = codec("Daily_Visit", TemplateShape::MonthYear, "xlsx");
        let file = codec.decode("Daily_Visit_AP_ELBRIT_Jul-2025.xlsx").unwrap();
        assert_eq!(file.division, "AP ELBRIT");
        assert_eq!(file.state, None);
        assert_eq!(file.date, Some(ReportDate::monthly(2025, Month::Jul)));
        assert_eq!(file.label, None);
        assert_eq!(file.row_key(), "AP ELBRIT");
        assert_eq!(
            file.partition_key(TemplateShape::MonthYear).unwrap().as_str(),
            "2025-jul"
        );
    }

    #[test]
    fn test_decode_accepts_literal_spaces() {
        let codec = codec("Daily_Visit", TemplateShape::MonthYear, "xlsx");
        let file = codec.decode("Daily_Visit_Delhi Elbrit_Mar-2025.xlsx").unwrap();
        assert_eq!(file.division, "Delhi Elbrit");
    }

    #[test]
    fn test_decode_rejects_foreign_files() {
        let codec = codec("Daily_Visit", TemplateShape::MonthYear, "xlsx");
        assert!(codec.decode("randomfile.txt").is_none());
        assert!(codec.decode("Daily_Visit_Elbrit_Jul-2025.csv").is_none());
        assert!(codec.decode("Daily_Visit_Elbrit_Jly-2025.xlsx").is_none());
        assert!(codec.decode("Daily_Visit_Elbrit_Jul-25.xlsx").is_none());
        assert!(codec.decode("MSL_Detailed_Elbrit_Jul-2025.xlsx").is_none());
        assert!(codec.decode("xDaily_Visit_Elbrit_Jul-2025.xlsx").is_none());
        // Blank division
        assert!(codec.decode("Daily_Visit___Jul-2025.xlsx").is_none());
        assert!(codec.decode("Daily_Visit_ _Jul-2025.xlsx").is_none());

        let secondary = FilenameCodec::new(FilenameTemplate::new(
            "Secondary",
            TemplateShape::StateMonthYear,
            "xlsx",
        ))
        .unwrap();
        assert!(secondary.decode("Secondary_Elbrit___Jul_2025.xlsx").is_none());
    }

    #[test]
    fn test_decode_trims_free_text() {
        let codec = codec("Daily_Visit", TemplateShape::MonthYear, "xlsx");
        let file = codec.decode("Daily_Visit__AP_Jul-2025.xlsx").unwrap();
        assert_eq!(file.division, "AP");

        let renamed = codec.encode(&file).unwrap();
        assert_eq!(renamed, "Daily_Visit_AP_Jul-2025.xlsx");
        assert_eq!(codec.decode(&renamed).unwrap().division, "AP");
    }

    #[test]
    fn test_decode_iso_date() {
        let codec = codec("POB_Daily", TemplateShape::IsoDate, "xlsx");
        let file = codec.decode("POB_Daily_Elbrit_CND_2025-06-30.xlsx").unwrap();
        assert_eq!(file.division, "Elbrit CND");
        let date = file.date.unwrap();
        assert_eq!(date.month, Month::Jun);
        assert_eq!(date.year, 2025);
        assert_eq!(date.day, Some(30));
        assert_eq!(
            file.partition_key(TemplateShape::IsoDate).unwrap().as_str(),
            "2025-jun"
        );

        assert!(codec.decode("POB_Daily_Elbrit_2025-02-30.xlsx").is_none());
        assert!(codec.decode("POB_Daily_Elbrit_2025-13-01.xlsx").is_none());
    }

    #[test]
    fn test_decode_state_month_range() {
        let codec = codec("StockistWise", TemplateShape::StateMonthRange, "xlsx");
        let file = codec
            .decode("StockistWise_Elbrit_Tamil_Nadu_Apr-Jun-2025.xlsx")
            .unwrap();
        assert_eq!(file.division, "Elbrit");
        assert_eq!(file.state.as_deref(), Some("Tamil Nadu"));
        let date = file.date.unwrap();
        assert_eq!(date.month, Month::Apr);
        assert_eq!(date.through_month, Some(Month::Jun));
        assert_eq!(file.row_key(), "Elbrit-Tamil Nadu");
    }

    #[test]
    fn test_two_free_text_groups_split_at_first_underscore() {
        let codec = codec("Secondary", TemplateShape::StateMonthYear, "xlsx");
        let file = codec
            .decode("Secondary_AP_ELBRIT_Tamil_Nadu_Jul_2025.xlsx")
            .unwrap();
        assert_eq!(file.division, "AP");
        assert_eq!(file.state.as_deref(), Some("ELBRIT Tamil Nadu"));
    }

    #[test]
    fn test_decode_day_month_year() {
        let codec = codec("work_summary", TemplateShape::DayMonthYear, "xlsx");
        let file = codec.decode("work_summary_VASCO_04-Mar-2025.xlsx").unwrap();
        assert_eq!(file.division, "VASCO");
        assert_eq!(file.date.unwrap().day, Some(4));
        assert_eq!(
            file.partition_key(TemplateShape::DayMonthYear).unwrap().as_str(),
            "2025-mar-04"
        );
        assert!(codec.decode("work_summary_VASCO_00-Mar-2025.xlsx").is_none());
        assert!(codec.decode("work_summary_VASCO_31-Feb-2025.xlsx").is_none());
        assert!(codec.decode("work_summary_VASCO_29-Feb-2025.xlsx").is_none());
        assert!(codec.decode("work_summary_VASCO_29-Feb-2024.xlsx").is_some());
        assert!(codec.decode("work_summary_VASCO_31-Apr-2025.xlsx").is_none());
    }

    #[test]
    fn test_decode_undated_summary() {
        let codec = codec("MSL", TemplateShape::Undated, "xlsx");
        let file = codec.decode("AP_ELBRIT_MSL_Summary_Report.xlsx").unwrap();
        assert_eq!(file.division, "AP ELBRIT");
        assert_eq!(file.date, None);
        assert_eq!(file.label.as_deref(), Some("Summary_Report"));
        assert_eq!(file.row_key(), "AP ELBRIT");
        assert_eq!(file.partition_key(TemplateShape::Undated), None);

        assert!(codec.decode("AP_ELBRIT_MSL.xlsx").is_none());
        assert!(codec.decode("AP_ELBRIT_MSL_Summary.csv").is_none());
        assert!(codec.decode("_MSL_Summary.xlsx").is_none());
        assert!(codec.decode("Elbrit_MSL___.xlsx").is_none());
    }

    #[test]
    fn test_decode_then_encode_round_trips() {
        let cases = [
            ("Daily_Visit", TemplateShape::MonthYear, "xlsx", "Daily_Visit_AP_ELBRIT_Jul-2025.xlsx"),
            ("Visit_Activity", TemplateShape::MonthYear, "csv", "Visit_Activity_Kerala_Elbrit_Jan-2024.csv"),
            ("POB_Daily", TemplateShape::IsoDate, "xlsx", "POB_Daily_KA_Elbrit_2025-07-01.xlsx"),
            ("StockistWise", TemplateShape::StateMonthRange, "xlsx", "StockistWise_Elbrit_Kerala_Apr-Jun-2025.xlsx"),
            ("Secondary", TemplateShape::StateMonthYear, "xlsx", "Secondary_Elbrit_Karnataka_Dec_2024.xlsx"),
            ("work_summary", TemplateShape::DayMonthYear, "xlsx", "work_summary_Elbrit_Mysore_09-Aug-2025.xlsx"),
            ("MSL", TemplateShape::Undated, "xlsx", "Elbrit_CND_MSL_Summary_2025.xlsx"),
        ];
        for (prefix, shape, ext, name) in cases {
            let codec = codec(prefix, shape, ext);
            let file = codec.decode(name).unwrap_or_else(|| panic!("{name} should decode"));
            assert_eq!(codec.encode(&file).unwrap(), name);
        }
    }

    #[test]
    fn test_encode_normalizes_whitespace() {
        let codec = codec("Daily_Visit", TemplateShape::MonthYear, "xlsx");
        let file = codec.decode("Daily_Visit_KE Aura  N Proxima_May-2025.xlsx").unwrap();
        assert_eq!(
            codec.encode(&file).unwrap(),
            "Daily_Visit_KE_Aura_N_Proxima_May-2025.xlsx"
        );
    }

    #[test]
    fn test_encode_reports_missing_fields() {
        let codec = codec("Secondary", TemplateShape::StateMonthYear, "xlsx");
        let mut file = ReportFile {
            file_name: String::new(),
            division: "Elbrit".to_string(),
            state: None,
            date: Some(ReportDate::monthly(2025, Month::Jul)),
            label: None,
            extension: "xlsx".to_string(),
        };
        assert!(matches!(
            codec.encode(&file),
            Err(NamingError::MissingField { field: "state", .. })
        ));

        file.state = Some("Kerala".to_string());
        file.date = None;
        assert!(matches!(
            codec.encode(&file),
            Err(NamingError::MissingField { field: "date", .. })
        ));
    }

    #[test]
    fn test_file_name_for_period() {
        let period = ReportPeriod {
            from: date(2025, 4, 1),
            to: date(2025, 6, 30),
        };
        let range = codec("StockistWise", TemplateShape::StateMonthRange, "xlsx");
        assert_eq!(
            range
                .file_name_for("Elbrit CND", Some("Tamil Nadu"), &period)
                .unwrap(),
            "StockistWise_Elbrit_CND_Tamil_Nadu_Apr-Jun-2025.xlsx"
        );

        let pob = codec("POB_Daily", TemplateShape::IsoDate, "xlsx");
        assert_eq!(
            pob.file_name_for("AP ELBRIT", None, &period).unwrap(),
            "POB_Daily_AP_ELBRIT_2025-04-01.xlsx"
        );
    }

    #[test]
    fn test_regex_metacharacters_in_prefix_are_literal() {
        let codec = codec("Report.v2", TemplateShape::MonthYear, "xlsx");
        assert!(codec.decode("Report.v2_Elbrit_Jul-2025.xlsx").is_some());
        assert!(codec.decode("Reportxv2_Elbrit_Jul-2025.xlsx").is_none());
    }
}
