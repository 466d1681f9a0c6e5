//! Report rendering.
//!
//! A standup report leads with condensed "standup items" (one bullet per
//! group of related activity) and follows with a short per-repository
//! breakdown.  The detailed view lists every event verbatim.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};

use crate::error::{AdapterError, Result};
use crate::standup::activity::{ActivityCollection, SummaryStats, summarize};
use crate::standup::events::{
    ActivityEvent, EventDetail, EventType, FetchContext, Payload, ProcessedInfo, RefAction,
    WEB_BASE, classify,
};

/// Individual commits listed under a multi-commit repository line.
const MAX_LISTED_COMMITS: usize = 3;

/// Output representation of a standup report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Markdown,
    Text,
    Json,
}

impl ReportFormat {
    /// Parse a user-supplied format name; anything unrecognized is markdown.
    pub fn lenient(name: Option<&str>) -> Self {
        name.and_then(|n| n.parse().ok()).unwrap_or_default()
    }
}

impl FromStr for ReportFormat {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(AdapterError::InvalidParams {
                tool_name: "format".into(),
                reason: format!("unknown report format `{other}`"),
            }),
        }
    }
}

/// Render a standup report.
pub fn render(collection: &ActivityCollection, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Markdown => Ok(render_markdown(collection)),
        ReportFormat::Text => Ok(render_text(collection)),
        ReportFormat::Json => render_json(collection),
    }
}

fn human_date(date: NaiveDate) -> String {
    date.format("%B %d, %Y").to_string()
}

fn render_markdown(collection: &ActivityCollection) -> String {
    let mut lines = vec![
        format!("# Standup Summary - {}", human_date(collection.target_date)),
        String::new(),
    ];
    push_items(&mut lines, standup_items(&collection.events));
    lines.extend(["", "---", ""].map(String::from));
    lines.extend(details_block(collection));
    lines.join("\n")
}

fn render_text(collection: &ActivityCollection) -> String {
    let mut lines = vec![
        format!("Standup Summary - {}", human_date(collection.target_date)),
        "=".repeat(50),
        String::new(),
    ];
    push_items(
        &mut lines,
        standup_items(&collection.events)
            .iter()
            .map(|item| to_plain(item))
            .collect(),
    );

    let details = details_block(collection);
    if !details.is_empty() {
        lines.extend([String::new(), "-".repeat(50), String::new()]);
        lines.extend(
            details
                .iter()
                .map(|line| to_plain(line.trim_start_matches("## "))),
        );
    }
    lines.join("\n")
}

fn render_json(collection: &ActivityCollection) -> Result<String> {
    let doc = json!({
        "date": collection.target_date.format("%Y-%m-%d").to_string(),
        "source": {
            "summary": collection.summary,
            "events": collection.events,
        },
        "standup_items": standup_items(&collection.events),
    });
    Ok(serde_json::to_string_pretty(&doc)?)
}

fn push_items(lines: &mut Vec<String>, items: Vec<String>) {
    if items.is_empty() {
        lines.push("No significant activity to report.".into());
    } else {
        lines.extend(items);
    }
}

/// Totals and one linked bullet per repository; empty when there are no
/// events.
fn details_block(collection: &ActivityCollection) -> Vec<String> {
    if collection.events.is_empty() {
        return Vec::new();
    }
    let summary = &collection.summary;
    let mut lines = vec![
        "## GitHub Activity Details".to_owned(),
        String::new(),
        format!(
            "**{} events** across **{} repositories**",
            summary.total_events,
            summary.repositories.len()
        ),
        String::new(),
    ];
    let mut repos = summary.repositories.clone();
    repos.sort();
    lines.extend(
        repos
            .iter()
            .map(|repo| format!("- [{repo}]({WEB_BASE}/{repo})")),
    );
    lines.push(String::new());
    lines
}

fn markdown_link() -> Option<&'static Regex> {
    static LINK: OnceLock<Option<Regex>> = OnceLock::new();
    LINK.get_or_init(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").ok())
        .as_ref()
}

/// Strip emphasis markers and collapse `[label](url)` to `label`.
pub fn to_plain(line: &str) -> String {
    let stripped = line.replace("**", "").replace('*', "");
    match markdown_link() {
        Some(re) => re.replace_all(&stripped, "$1").into_owned(),
        None => stripped,
    }
}

// ---------------------------------------------------------------------------
// Standup items
// ---------------------------------------------------------------------------

/// Condensed bullets: commits, then pull requests, then reviews, then other.
pub fn standup_items(events: &[ActivityEvent]) -> Vec<String> {
    let mut commits = Vec::new();
    let mut pulls = Vec::new();
    let mut reviews = Vec::new();
    let mut other = Vec::new();

    for event in events {
        match event.event_type {
            EventType::Push if !event.processed_info.commits.is_empty() => commits.push(event),
            EventType::PullRequest => pulls.push(event),
            EventType::PullRequestReview | EventType::PullRequestReviewComment => {
                reviews.push(event)
            }
            EventType::IssueComment | EventType::Create => other.push(event),
            _ => {}
        }
    }

    let mut items = commit_items(&commits);
    items.extend(pulls.iter().filter_map(|e| pull_request_item(e)));
    items.extend(review_items(&reviews));
    items.extend(other.iter().filter_map(|e| other_item(e)));
    items
}

/// Group by repository in first-seen order.
fn commit_items(events: &[&ActivityEvent]) -> Vec<String> {
    let mut order: Vec<&str> = Vec::new();
    let mut by_repo: BTreeMap<&str, Vec<_>> = BTreeMap::new();
    for event in events {
        let repo = event.repo.as_str();
        if !by_repo.contains_key(repo) {
            order.push(repo);
        }
        by_repo
            .entry(repo)
            .or_default()
            .extend(event.processed_info.commits.iter());
    }

    let mut items = Vec::new();
    for repo in order {
        let commits = &by_repo[repo];
        if let [only] = commits.as_slice() {
            items.push(format!(
                "- Committed **{}** to [{repo}]({})",
                only.message, only.link
            ));
            continue;
        }
        items.push(format!(
            "- Made **{} commits** to [{repo}]({WEB_BASE}/{repo})",
            commits.len()
        ));
        for commit in commits.iter().take(MAX_LISTED_COMMITS) {
            items.push(format!(
                "  - {} ([{}]({}))",
                commit.message, commit.short_sha, commit.link
            ));
        }
        if commits.len() > MAX_LISTED_COMMITS {
            items.push(format!(
                "  - *(and {} more)*",
                commits.len() - MAX_LISTED_COMMITS
            ));
        }
    }
    items
}

fn first_link_or(info: &ProcessedInfo, fallback: impl FnOnce() -> String) -> String {
    info.links.first().cloned().unwrap_or_else(fallback)
}

fn pull_request_item(event: &ActivityEvent) -> Option<String> {
    let EventDetail::PullRequest {
        pr_number,
        action,
        title,
    } = &event.processed_info.detail
    else {
        return None;
    };
    let verb = action.standup_verb()?;
    let link = first_link_or(&event.processed_info, || {
        format!("{WEB_BASE}/{}/pull/{pr_number}", event.repo)
    });
    Some(format!("- {verb} **[PR #{pr_number}]({link})**: {title}"))
}

/// Only the latest review per pull request is reported.
fn review_items(events: &[&ActivityEvent]) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    let mut latest: BTreeMap<String, (&ActivityEvent, u64, &str)> = BTreeMap::new();

    for event in events {
        if event.event_type != EventType::PullRequestReview {
            continue;
        }
        let EventDetail::Review {
            pr_number,
            review_state,
        } = &event.processed_info.detail
        else {
            continue;
        };
        let key = format!("{}#{pr_number}", event.repo);
        if !latest.contains_key(&key) {
            order.push(key.clone());
        }
        latest.insert(key, (*event, *pr_number, review_state.as_str()));
    }

    order
        .iter()
        .filter_map(|key| latest.get(key))
        .map(|(event, pr_number, state)| {
            let link = first_link_or(&event.processed_info, || {
                format!("{WEB_BASE}/{}/pull/{pr_number}", event.repo)
            });
            format!("- Reviewed **[PR #{pr_number}]({link})** ({state})")
        })
        .collect()
}

fn other_item(event: &ActivityEvent) -> Option<String> {
    match &event.processed_info.detail {
        EventDetail::Comment {
            issue_number,
            is_pull_request,
        } => {
            let label = if *is_pull_request { "PR" } else { "issue" };
            let link = first_link_or(&event.processed_info, String::new);
            Some(format!("- Commented on **[{label} #{issue_number}]({link})**"))
        }
        EventDetail::Ref {
            action: RefAction::Created,
            ref_type,
            ref_name,
        } if ref_type == "branch" => Some(format!(
            "- Created branch **{ref_name}** in {}",
            event.repo
        )),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Detailed view
// ---------------------------------------------------------------------------

/// Every event grouped by repository (first-seen order) with all of its
/// details, links and commits.
pub fn render_detailed(collection: &ActivityCollection) -> String {
    let date = collection.target_date.format("%Y-%m-%d");
    if collection.events.is_empty() {
        return format!("No GitHub activity found for {date}");
    }

    let summary = &collection.summary;
    let mut lines = vec![
        format!("# GitHub Activity for {date}"),
        String::new(),
        format!(
            "**Summary:** {} events across {} repositories",
            summary.total_events,
            summary.repositories.len()
        ),
        String::new(),
    ];
    if summary.commit_count > 0 {
        lines.push(format!("- **Commits:** {}", summary.commit_count));
    }
    if summary.pr_count > 0 {
        lines.push(format!("- **Pull Requests:** {}", summary.pr_count));
    }
    lines.extend(["", "## Detailed Activity", ""].map(String::from));

    let mut order: Vec<&str> = Vec::new();
    let mut by_repo: BTreeMap<&str, Vec<&ActivityEvent>> = BTreeMap::new();
    for event in &collection.events {
        if !by_repo.contains_key(event.repo.as_str()) {
            order.push(&event.repo);
        }
        by_repo.entry(&event.repo).or_default().push(event);
    }

    for repo in order {
        lines.push(format!("### {repo}"));
        lines.push(String::new());
        for event in &by_repo[repo] {
            lines.push(format!(
                "**{}** by {} at {}",
                event.event_type, event.actor, event.created_at
            ));
            let info = &event.processed_info;
            lines.extend(info.details.iter().map(|d| format!("- {d}")));
            lines.extend(info.links.iter().map(|l| format!("- Link: {l}")));
            lines.extend(info.commits.iter().map(|c| {
                format!("- Commit: {} ([{}]({}))", c.message, c.short_sha, c.link)
            }));
            lines.push(String::new());
        }
    }

    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Caller-supplied collections
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ReportSource {
    #[serde(default)]
    events: Vec<ActivityEvent>,
    #[serde(default)]
    summary: Option<SummaryStats>,
}

#[derive(Deserialize)]
struct ReportInput {
    #[serde(alias = "date", deserialize_with = "lenient_date")]
    target_date: NaiveDate,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    repos: Option<Vec<String>>,
    #[serde(default)]
    events: Vec<ActivityEvent>,
    #[serde(default)]
    summary: Option<SummaryStats>,
    #[serde(default)]
    source: Option<ReportSource>,
}

/// Accept `YYYY-MM-DD` with or without a trailing time component.
fn lenient_date<'de, D>(deserializer: D) -> std::result::Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .ok_or_else(|| serde::de::Error::custom(format!("invalid date `{raw}`")))
}

/// Rebuild an [`ActivityCollection`] from either its own serialized form or
/// the JSON report shape.  Events without processed info are classified
/// from their payload; a missing summary is recomputed.
pub fn collection_from_value(value: Value) -> Result<ActivityCollection> {
    let input: ReportInput =
        serde_json::from_value(value).map_err(|e| AdapterError::InvalidParams {
            tool_name: "format_standup_report".into(),
            reason: format!("github_activity is not a valid activity collection: {e}"),
        })?;

    let (mut events, summary) = match input.source {
        Some(source) => (source.events, source.summary.or(input.summary)),
        None => (input.events, input.summary),
    };

    let mut ctx = FetchContext::new();
    for event in &mut events {
        if event.processed_info == ProcessedInfo::default() && event.payload.is_object() {
            let payload = Payload::parse(&event.event_type, &event.payload);
            event.processed_info = classify(&event.repo, &payload, &mut ctx);
        }
    }
    events.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    let summary = summary.unwrap_or_else(|| summarize(&events));
    Ok(ActivityCollection {
        target_date: input.target_date,
        username: input.username,
        repos: input.repos,
        events,
        summary,
    })
}
