//! The whole run: fetch and survey load in parallel, classify, match, write.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::classify::classify;
use crate::output::{Report, write_report};
use crate::services::reporting_api::ReportingApi;
use crate::survey::SurveyTable;
use crate::visits::fetch_all;

/// Loads the survey when a path is given.
pub async fn load_survey(path: Option<&Path>) -> Result<Option<SurveyTable>> {
    match path {
        Some(path) => Ok(Some(SurveyTable::load(path).await?)),
        None => Ok(None),
    }
}

/// Runs the report end to end and writes it to `output_path`.
///
/// Nothing is written unless every fetch and the survey load succeed.
pub async fn run<A>(
    api: Arc<A>,
    concurrency: usize,
    survey_path: Option<&Path>,
    output_path: &Path,
) -> Result<Report>
where
    A: ReportingApi + ?Sized + 'static,
{
    let (profiles, survey) = tokio::try_join!(fetch_all(api, concurrency), load_survey(survey_path))?;

    info!("All data recovered. Processing...");
    let summaries = classify(&profiles);
    for summary in &summaries {
        debug!(?summary, "Visit classified");
    }
    info!(visits = summaries.len(), "Visits classified");

    let report = Report::new(summaries, survey);
    write_report(output_path, &report)?;

    Ok(report)
}
