//! Activity fetching and aggregation.
//!
//! [`fetch`] resolves who and where, pages through each repository's event
//! feed inside the UTC window for the target date, classifies every kept
//! record, and returns an [`ActivityCollection`] sorted oldest first.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{AdapterError, Result};
use crate::standup::config::StandupConfig;
use crate::standup::dates;
use crate::standup::events::{ActivityEvent, EventType, FetchContext, RawEvent};
use crate::standup::source::ActivitySource;

/// Records requested per page.
pub const PAGE_SIZE: usize = 100;

/// Upper bound on pages read from any one feed.
pub const MAX_PAGES: u32 = 50;

/// Returned when no repository source can be resolved.
pub const NO_REPO_SOURCE: &str =
    "Either GITHUB_ORG or GITHUB_REPOS environment variable is required when not specifying repos";

/// Aggregate counts over a list of events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub total_events: usize,
    pub event_types: BTreeMap<String, usize>,
    pub repositories: Vec<String>,
    pub commit_count: usize,
    pub pr_count: usize,
}

/// Everything one report request works from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityCollection {
    pub target_date: NaiveDate,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub repos: Option<Vec<String>>,
    #[serde(default)]
    pub events: Vec<ActivityEvent>,
    #[serde(default)]
    pub summary: SummaryStats,
}

impl ActivityCollection {
    /// Build a collection from already-classified events, sorting them and
    /// computing the summary.
    pub fn new(
        target_date: NaiveDate,
        username: Option<String>,
        repos: Option<Vec<String>>,
        mut events: Vec<ActivityEvent>,
    ) -> Self {
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let summary = summarize(&events);
        Self {
            target_date,
            username,
            repos,
            events,
            summary,
        }
    }
}

/// Reduce events to [`SummaryStats`].
pub fn summarize(events: &[ActivityEvent]) -> SummaryStats {
    let mut stats = SummaryStats {
        total_events: events.len(),
        ..SummaryStats::default()
    };
    let mut repositories = BTreeSet::new();

    for event in events {
        *stats
            .event_types
            .entry(event.event_type.as_str().to_owned())
            .or_default() += 1;
        repositories.insert(event.repo.clone());
        match event.event_type {
            EventType::Push => stats.commit_count += event.processed_info.commits.len(),
            EventType::PullRequest => stats.pr_count += 1,
            _ => {}
        }
    }

    stats.repositories = repositories.into_iter().collect();
    stats
}

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

/// Where events are read from once repositories are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Feeds {
    Repos(Vec<String>),
    UserPublic(String),
}

/// Time window and actor filter applied to every record.
struct RecordFilter<'a> {
    start: String,
    end: String,
    actor: Option<&'a str>,
}

impl RecordFilter<'_> {
    fn matches_actor(&self, login: &str) -> bool {
        self.actor
            .is_none_or(|wanted| login.to_lowercase() == wanted.to_lowercase())
    }
}

/// Fetch and classify activity for `target_date`.
///
/// Identity and repository resolution failures are returned as errors.  A
/// repository whose feed cannot be read is logged and contributes no events.
pub async fn fetch(
    source: &dyn ActivitySource,
    config: &StandupConfig,
    target_date: NaiveDate,
    username: Option<&str>,
    repos: Option<Vec<String>>,
) -> Result<ActivityCollection> {
    let mut ctx = FetchContext::new();

    let username = match username.map(str::trim).filter(|u| !u.is_empty()) {
        Some(u) => u.to_owned(),
        None => match source.current_user().await {
            Ok(Some(login)) => login,
            Ok(None) => return Err(AdapterError::IdentityUnresolved),
            Err(e) => {
                warn!(error = %e, "failed to look up current user");
                return Err(AdapterError::IdentityUnresolved);
            }
        },
    };

    let (start, end) = dates::utc_window(target_date);
    let filter = RecordFilter {
        start,
        end,
        actor: Some(username.as_str()),
    };
    info!(date = %target_date, user = %username, start = %filter.start, end = %filter.end, "fetching activity");

    let explicit = repos.filter(|r| !r.is_empty());
    let feeds = resolve_feeds(source, config, explicit.as_deref(), &username).await?;

    let mut events = Vec::new();
    match &feeds {
        Feeds::Repos(list) => {
            for repo in list {
                let path = |page: u32| {
                    format!("/repos/{repo}/events?page={page}&per_page={PAGE_SIZE}")
                };
                let found = collect_events(source, path, &filter, Some(repo), &mut ctx).await;
                debug!(repo = %repo, events = found.len(), "repository done");
                events.extend(found);
            }
        }
        Feeds::UserPublic(user) => {
            let path = |page: u32| {
                format!("/users/{user}/events/public?page={page}&per_page={PAGE_SIZE}")
            };
            events = collect_events(source, path, &filter, None, &mut ctx).await;
        }
    }

    let collection = ActivityCollection::new(target_date, Some(username), explicit, events);
    info!(
        events = collection.summary.total_events,
        repositories = collection.summary.repositories.len(),
        "activity fetched"
    );
    Ok(collection)
}

/// Precedence: explicit > configured repos > configured org > the user's own
/// repositories > the user's public event feed.
async fn resolve_feeds(
    source: &dyn ActivitySource,
    config: &StandupConfig,
    explicit: Option<&[String]>,
    username: &str,
) -> Result<Feeds> {
    if let Some(list) = explicit {
        return non_empty_repos(trimmed(list));
    }
    if !config.repos.is_empty() {
        return non_empty_repos(trimmed(&config.repos));
    }
    if let Some(org) = &config.org {
        return non_empty_repos(org_repos(source, org).await);
    }
    if !config.user_fallback {
        return Err(AdapterError::ConfigError(NO_REPO_SOURCE.to_owned()));
    }

    let path = format!("/users/{username}/repos?per_page={PAGE_SIZE}");
    let own = match source.get_page(&path).await {
        Ok(page) => repo_names(&page),
        Err(e) => {
            warn!(user = %username, error = %e, "failed to list user repositories");
            Vec::new()
        }
    };
    if own.is_empty() {
        info!(user = %username, "no repositories found, reading public event feed");
        Ok(Feeds::UserPublic(username.to_owned()))
    } else {
        Ok(Feeds::Repos(own))
    }
}

fn trimmed(list: &[String]) -> Vec<String> {
    list.iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .map(str::to_owned)
        .collect()
}

/// A named repository source that resolves to nothing is a configuration error.
fn non_empty_repos(list: Vec<String>) -> Result<Feeds> {
    if list.is_empty() {
        return Err(AdapterError::ConfigError(NO_REPO_SOURCE.to_owned()));
    }
    Ok(Feeds::Repos(list))
}

/// List an organization's repositories, paging until a short page.
async fn org_repos(source: &dyn ActivitySource, org: &str) -> Vec<String> {
    let mut repos = Vec::new();
    for page in 1..=MAX_PAGES {
        let path = format!("/orgs/{org}/repos?page={page}&per_page={PAGE_SIZE}");
        let body = match source.get_page(&path).await {
            Ok(body) => body,
            Err(e) => {
                warn!(org = %org, page, error = %e, "failed to list organization repositories");
                break;
            }
        };
        let names = repo_names(&body);
        let short = body.as_array().is_none_or(|a| a.len() < PAGE_SIZE);
        repos.extend(names);
        if short {
            break;
        }
    }
    debug!(org = %org, count = repos.len(), "organization repositories");
    repos
}

fn repo_names(body: &Value) -> Vec<String> {
    body.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|r| r.get("full_name").and_then(Value::as_str))
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Page through one feed, newest first, keeping records inside the window.
///
/// `repo` fixes the repository for per-repo feeds; with `None` each record
/// names its own and records without one are skipped.  A failed or malformed
/// page discards the whole feed.
async fn collect_events<F>(
    source: &dyn ActivitySource,
    path_for_page: F,
    filter: &RecordFilter<'_>,
    repo: Option<&str>,
    ctx: &mut FetchContext,
) -> Vec<ActivityEvent>
where
    F: Fn(u32) -> String,
{
    let mut events = Vec::new();

    for page in 1..=MAX_PAGES {
        let path = path_for_page(page);
        let body = match source.get_page(&path).await {
            Ok(body) => body,
            Err(e) => {
                warn!(path = %path, error = %e, "failed to fetch events page, dropping feed");
                return Vec::new();
            }
        };
        let Some(records) = body.as_array() else {
            warn!(path = %path, "events response is not an array, dropping feed");
            return Vec::new();
        };
        if records.is_empty() {
            break;
        }

        for record in records {
            let raw: RawEvent = match serde_json::from_value(record.clone()) {
                Ok(raw) => raw,
                Err(e) => {
                    debug!(error = %e, "skipping unreadable event record");
                    continue;
                }
            };

            if raw.created_at.as_str() < filter.start.as_str() {
                // Feeds are newest first; nothing older can match.
                return events;
            }
            if raw.created_at.as_str() > filter.end.as_str()
                || !filter.matches_actor(raw.actor_login())
            {
                continue;
            }

            let repo_name = match repo {
                Some(fixed) => fixed.to_owned(),
                None => raw.repo_name().to_owned(),
            };
            if repo_name.is_empty() {
                continue;
            }
            events.push(ActivityEvent::from_raw(raw, &repo_name, ctx));
        }

        if records.len() < PAGE_SIZE {
            break;
        }
        let last_created = records
            .last()
            .and_then(|r| r.get("created_at"))
            .and_then(Value::as_str)
            .unwrap_or("");
        if last_created < filter.start.as_str() {
            break;
        }
    }

    events
}
