//! Report assembly and spreadsheet serialization.
//!
//! A [`Report`] is laid out as plain [`Sheet`]s first, then written with
//! `rust_xlsxwriter`, so the layout can be checked without opening a workbook.

use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Workbook};
use std::path::Path;
use tracing::{info, warn};

use crate::classify::VisitSummary;
use crate::survey::{SurveyTable, survey_id_for};

pub const VISITS_SHEET: &str = "VISIT DETAIL";
pub const SURVEY_SHEET: &str = "SURVEY";

pub const VISIT_COLUMNS: [&str; 16] = [
    "USER_ID",
    "DATE",
    "TIME",
    "DURATION",
    "LOGIN",
    "#ACTIONS",
    "RATING",
    "EXIT",
    "SMS",
    "CHANNEL CHANGE",
    "FROM BEGINNING",
    "TV INFO",
    "RECOMMENDATION",
    "SEARCH",
    "WIFI",
    "SURVEY_ID",
];

/// Longest text Excel accepts in one cell, in characters.
pub const MAX_CELL_CHARS: usize = 32_767;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<u32> for Cell {
    fn from(n: u32) -> Self {
        Cell::Number(f64::from(n))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub bold_header: bool,
    pub rows: Vec<Vec<Cell>>,
}

/// Everything one run writes: the visit summaries and, when supplied, the survey.
#[derive(Debug, Default)]
pub struct Report {
    pub summaries: Vec<VisitSummary>,
    pub survey: Option<SurveyTable>,
}

impl Report {
    pub fn new(summaries: Vec<VisitSummary>, survey: Option<SurveyTable>) -> Self {
        Self { summaries, survey }
    }

    /// The visit sheet, followed by the raw survey sheet when a survey was loaded.
    pub fn sheets(&self) -> Vec<Sheet> {
        let mut rows: Vec<Vec<Cell>> = Vec::with_capacity(self.summaries.len() + 1);
        rows.push(VISIT_COLUMNS.iter().map(|c| Cell::from(*c)).collect());
        rows.extend(
            self.summaries
                .iter()
                .map(|s| visit_row(s, survey_id_for(self.survey.as_ref(), s.timestamp))),
        );

        let mut sheets = vec![Sheet {
            name: VISITS_SHEET.to_string(),
            bold_header: true,
            rows,
        }];

        if let Some(survey) = &self.survey {
            sheets.push(Sheet {
                name: SURVEY_SHEET.to_string(),
                bold_header: false,
                rows: survey
                    .rows
                    .iter()
                    .map(|row| row.iter().map(|f| Cell::from(f.as_str())).collect())
                    .collect(),
            });
        }

        sheets
    }
}

fn visit_row(s: &VisitSummary, survey_id: &str) -> Vec<Cell> {
    vec![
        Cell::from(s.user_id.as_str()),
        Cell::from(s.formatted_date()),
        Cell::from(s.time.as_str()),
        Cell::from(s.formatted_duration()),
        Cell::from(s.login.to_string()),
        Cell::from(s.actions),
        Cell::from(s.rating_text()),
        Cell::from(s.outcome.to_string()),
        Cell::from(s.sms.to_string()),
        Cell::from(s.channel_change),
        Cell::from(s.from_beginning),
        Cell::from(s.tv_info),
        Cell::from(s.recommendation),
        Cell::from(s.search),
        Cell::from(s.wifi),
        Cell::from(survey_id),
    ]
}

/// Cuts `text` to [`MAX_CELL_CHARS`] characters.
fn fit_cell(text: &str) -> &str {
    match text.char_indices().nth(MAX_CELL_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Writes `sheets` to a new workbook at `path`, replacing any existing file.
pub fn write_xlsx(path: &Path, sheets: &[Sheet]) -> Result<()> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    for sheet in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&sheet.name)?;

        for (r, row) in sheet.rows.iter().enumerate() {
            let r = u32::try_from(r)?;
            for (c, cell) in row.iter().enumerate() {
                let c = u16::try_from(c)?;
                match cell {
                    // Excel has no empty string cells; leave them blank
                    Cell::Text(text) if text.is_empty() => {}
                    Cell::Text(text) => {
                        let fitted = fit_cell(text);
                        if fitted.len() < text.len() {
                            warn!(
                                sheet = %sheet.name,
                                row = r,
                                col = c,
                                chars = text.chars().count(),
                                "Cell text exceeds the Excel limit, truncating"
                            );
                        }
                        if r == 0 && sheet.bold_header {
                            worksheet.write_string_with_format(r, c, fitted, &bold)?;
                        } else {
                            worksheet.write_string(r, c, fitted)?;
                        }
                    }
                    Cell::Number(n) => {
                        worksheet.write_number(r, c, *n)?;
                    }
                }
            }
        }
    }

    workbook.save(path)?;
    Ok(())
}

/// Serializes the report to `path`.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn write_report(path: &Path, report: &Report) -> Result<()> {
    let sheets = report.sheets();
    write_xlsx(path, &sheets).with_context(|| format!("writing report {}", path.display()))?;

    info!(
        visits = report.summaries.len(),
        sheets = sheets.len(),
        "Report written"
    );
    Ok(())
}
