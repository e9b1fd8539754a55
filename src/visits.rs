//! Two-stage visitor fetch: list visitor ids, then one profile per visitor.

use anyhow::{Context, Result, anyhow};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, info, warn};

use crate::model::VisitorProfile;
use crate::services::reporting_api::ReportingApi;

pub const LIST_USERS: &str = "UserId.getUsers";
pub const GET_VISITOR_PROFILE: &str = "Live.getVisitorProfile";

/// Lists visitor ids in the order the API returns them.
#[tracing::instrument(skip_all)]
pub async fn list_visitor_ids<A: ReportingApi + ?Sized>(api: &A) -> Result<Vec<String>> {
    let body = api.call(LIST_USERS, &[]).await.context("listing users")?;

    let users = body
        .as_array()
        .ok_or_else(|| anyhow!("listing users: expected a JSON array, got {body}"))?;

    let ids: Vec<String> = users
        .iter()
        .filter_map(|user| match user["idvisitor"].as_str() {
            Some(id) => Some(id.to_string()),
            None => {
                warn!(%user, "User entry without idvisitor, skipping");
                None
            }
        })
        .collect();

    info!(visitors = ids.len(), "Visitor list fetched");
    Ok(ids)
}

/// Fetches a single visitor profile.
pub async fn fetch_profile<A: ReportingApi + ?Sized>(
    api: &A,
    visitor_id: &str,
) -> Result<VisitorProfile> {
    let body = api
        .call(GET_VISITOR_PROFILE, &[("visitorId", visitor_id)])
        .await?;
    let profile: VisitorProfile = serde_json::from_value(body)?;
    debug!(visits = profile.last_visits.len(), "Profile received");
    Ok(profile)
}

/// Fetches every profile with at most `concurrency` requests in flight.
///
/// Profiles come back in the order of `visitor_ids`. The first failure aborts
/// the tasks still pending and is returned; no partial result is kept.
#[tracing::instrument(skip(api, visitor_ids), fields(visitors = visitor_ids.len()))]
pub async fn fetch_profiles<A>(
    api: Arc<A>,
    visitor_ids: Vec<String>,
    concurrency: usize,
) -> Result<Vec<VisitorProfile>>
where
    A: ReportingApi + ?Sized + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = Vec::with_capacity(visitor_ids.len());

    for visitor_id in visitor_ids {
        let api = api.clone();
        let sem = semaphore.clone();
        let span = tracing::debug_span!("fetch_profile", visitor_id = %visitor_id);

        let task = tokio::spawn(
            async move {
                let _permit = sem.acquire_owned().await?;
                fetch_profile(api.as_ref(), &visitor_id)
                    .await
                    .with_context(|| format!("fetching profile for visitor {visitor_id}"))
            }
            .instrument(span),
        );
        tasks.push(task);
    }

    let mut profiles = Vec::with_capacity(tasks.len());
    let mut pending = tasks.iter_mut();
    while let Some(task) = pending.next() {
        let outcome = match task.await {
            Ok(result) => result,
            Err(join_err) => Err(anyhow!("profile task failed: {join_err}")),
        };
        match outcome {
            Ok(profile) => profiles.push(profile),
            Err(e) => {
                for rest in pending {
                    rest.abort();
                }
                return Err(e);
            }
        }
    }

    info!(profiles = profiles.len(), "All visitor profiles fetched");
    Ok(profiles)
}

/// Lists visitors and fetches all of their profiles.
pub async fn fetch_all<A>(api: Arc<A>, concurrency: usize) -> Result<Vec<VisitorProfile>>
where
    A: ReportingApi + ?Sized + 'static,
{
    let ids = list_visitor_ids(api.as_ref()).await?;
    fetch_profiles(api, ids, concurrency).await
}
