//! Activity events: wire records, typed payloads, and classification.
//!
//! A [`RawEvent`] is one record from the GitHub events feed.  Its untyped
//! payload is parsed once into a [`Payload`] variant keyed by the event type,
//! and [`classify`] turns that into the uniform [`ProcessedInfo`] block every
//! [`ActivityEvent`] carries.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Base URL for human-facing links.
pub const WEB_BASE: &str = "https://github.com";

/// Prefix stripped from push refs to get the branch name.
const BRANCH_REF_PREFIX: &str = "refs/heads/";

// ---------------------------------------------------------------------------
// Enumerated tags
// ---------------------------------------------------------------------------

/// The `type` tag of an activity record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    Push,
    PullRequest,
    IssueComment,
    PullRequestReview,
    PullRequestReviewComment,
    Create,
    Delete,
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Push => "PushEvent",
            Self::PullRequest => "PullRequestEvent",
            Self::IssueComment => "IssueCommentEvent",
            Self::PullRequestReview => "PullRequestReviewEvent",
            Self::PullRequestReviewComment => "PullRequestReviewCommentEvent",
            Self::Create => "CreateEvent",
            Self::Delete => "DeleteEvent",
            Self::Other(tag) => tag,
        }
    }
}

impl From<&str> for EventType {
    fn from(tag: &str) -> Self {
        match tag {
            "PushEvent" => Self::Push,
            "PullRequestEvent" => Self::PullRequest,
            "IssueCommentEvent" => Self::IssueComment,
            "PullRequestReviewEvent" => Self::PullRequestReview,
            "PullRequestReviewCommentEvent" => Self::PullRequestReviewComment,
            "CreateEvent" => Self::Create,
            "DeleteEvent" => Self::Delete,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl From<String> for EventType {
    fn from(tag: String) -> Self {
        Self::from(tag.as_str())
    }
}

impl From<EventType> for String {
    fn from(kind: EventType) -> Self {
        kind.as_str().to_owned()
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `action` of a pull-request event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PrAction {
    Opened,
    Closed,
    Merged,
    Reopened,
    Other(String),
}

impl PrAction {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Opened => "opened",
            Self::Closed => "closed",
            Self::Merged => "merged",
            Self::Reopened => "reopened",
            Self::Other(action) => action,
        }
    }

    /// Capitalized verb for standup lines; `None` for actions that are not
    /// worth reporting.
    pub fn standup_verb(&self) -> Option<&'static str> {
        match self {
            Self::Opened => Some("Opened"),
            Self::Closed => Some("Closed"),
            Self::Merged => Some("Merged"),
            Self::Reopened | Self::Other(_) => None,
        }
    }
}

impl From<String> for PrAction {
    fn from(action: String) -> Self {
        match action.as_str() {
            "opened" => Self::Opened,
            "closed" => Self::Closed,
            "merged" => Self::Merged,
            "reopened" => Self::Reopened,
            _ => Self::Other(action),
        }
    }
}

impl From<PrAction> for String {
    fn from(action: PrAction) -> Self {
        action.as_str().to_owned()
    }
}

/// Whether a ref was created or deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefAction {
    Created,
    Deleted,
}

impl RefAction {
    fn label(self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Deleted => "Deleted",
        }
    }
}

// ---------------------------------------------------------------------------
// Wire records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Login {
    #[serde(default)]
    pub login: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepoName {
    #[serde(default)]
    pub name: String,
}

/// One record of the events feed, as returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub actor: Option<Login>,
    #[serde(default)]
    pub repo: Option<RepoName>,
    #[serde(default)]
    pub payload: Value,
}

impl RawEvent {
    pub fn actor_login(&self) -> &str {
        self.actor.as_ref().map(|a| a.login.as_str()).unwrap_or("")
    }

    pub fn repo_name(&self) -> &str {
        self.repo.as_ref().map(|r| r.name.as_str()).unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// Typed payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawCommit {
    pub message: String,
    pub sha: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PushPayload {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub size: u64,
    pub commits: Vec<RawCommit>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NumberedRef {
    pub number: u64,
    pub title: String,
    /// Present on issues that are really pull requests.
    pub pull_request: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PullRequestPayload {
    pub action: String,
    pub pull_request: NumberedRef,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IssueCommentPayload {
    pub issue: NumberedRef,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReviewState {
    pub state: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReviewPayload {
    pub pull_request: NumberedRef,
    pub review: ReviewState,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RefFields {
    pub ref_type: String,
    #[serde(rename = "ref")]
    pub ref_name: String,
}

/// The payload fields each classifier needs, keyed by event type.
#[derive(Debug, Clone)]
pub enum Payload {
    Push(PushPayload),
    PullRequest(PullRequestPayload),
    IssueComment(IssueCommentPayload),
    Review(ReviewPayload),
    Ref(RefAction, RefFields),
    Other,
}

impl Payload {
    /// Parse the raw payload for `kind`.  Fields of the wrong shape fall back
    /// to their defaults rather than rejecting the event.
    pub fn parse(kind: &EventType, raw: &Value) -> Self {
        fn typed<T: serde::de::DeserializeOwned + Default>(kind: &EventType, raw: &Value) -> T {
            serde_json::from_value(raw.clone()).unwrap_or_else(|e| {
                debug!(event_type = %kind, error = %e, "malformed payload, using defaults");
                T::default()
            })
        }

        match kind {
            EventType::Push => Self::Push(typed(kind, raw)),
            EventType::PullRequest => Self::PullRequest(typed(kind, raw)),
            EventType::IssueComment => Self::IssueComment(typed(kind, raw)),
            EventType::PullRequestReview => Self::Review(typed(kind, raw)),
            EventType::Create => Self::Ref(RefAction::Created, typed(kind, raw)),
            EventType::Delete => Self::Ref(RefAction::Deleted, typed(kind, raw)),
            EventType::PullRequestReviewComment | EventType::Other(_) => Self::Other,
        }
    }
}

// ---------------------------------------------------------------------------
// Processed info
// ---------------------------------------------------------------------------

/// A commit surviving deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    pub message: String,
    pub short_sha: String,
    pub full_sha: String,
    pub link: String,
}

/// Type-specific fields extracted by the classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventDetail {
    Push {
        branch: String,
        commit_count: u64,
    },
    PullRequest {
        pr_number: u64,
        action: PrAction,
        title: String,
    },
    Comment {
        issue_number: u64,
        is_pull_request: bool,
    },
    Review {
        pr_number: u64,
        review_state: String,
    },
    Ref {
        action: RefAction,
        ref_type: String,
        #[serde(rename = "ref")]
        ref_name: String,
    },
    #[default]
    None,
}

/// Uniform enrichment attached to every event.  The three sequences are
/// always present, possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedInfo {
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub details: Vec<String>,
    #[serde(default)]
    pub commits: Vec<CommitRef>,
    #[serde(default)]
    pub detail: EventDetail,
}

/// A normalized activity event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    #[serde(alias = "type")]
    pub event_type: EventType,
    pub created_at: String,
    pub repo: String,
    pub actor: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub processed_info: ProcessedInfo,
}

impl ActivityEvent {
    /// Build and classify an event from a feed record.
    pub fn from_raw(raw: RawEvent, repo: &str, ctx: &mut FetchContext) -> Self {
        let event_type = EventType::from(raw.kind.as_str());
        let payload = Payload::parse(&event_type, &raw.payload);
        let processed_info = classify(repo, &payload, ctx);
        Self {
            actor: raw.actor_login().to_owned(),
            event_type,
            created_at: raw.created_at,
            repo: repo.to_owned(),
            payload: raw.payload,
            processed_info,
        }
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// State scoped to a single activity fetch.
#[derive(Debug, Default)]
pub struct FetchContext {
    seen_commits: HashSet<String>,
}

impl FetchContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct commit messages attributed so far.
    pub fn seen_count(&self) -> usize {
        self.seen_commits.len()
    }

    /// Record `message`; returns `true` only the first time it is seen.
    fn first_sighting(&mut self, message: &str) -> bool {
        self.seen_commits.insert(dedup_key(message))
    }
}

/// Normalized commit message used to collapse force-push duplicates.
pub fn dedup_key(message: &str) -> String {
    message.to_lowercase().replace(' ', "_")
}

/// Produce the processed info for one event.
pub fn classify(repo: &str, payload: &Payload, ctx: &mut FetchContext) -> ProcessedInfo {
    match payload {
        Payload::Push(push) => classify_push(repo, push, ctx),
        Payload::PullRequest(pr) => {
            let number = pr.pull_request.number;
            let action = PrAction::from(pr.action.clone());
            let title = pr.pull_request.title.clone();
            ProcessedInfo {
                links: vec![format!("{WEB_BASE}/{repo}/pull/{number}")],
                details: vec![format!("PR #{number}: {} - {title}", action.as_str())],
                commits: Vec::new(),
                detail: EventDetail::PullRequest {
                    pr_number: number,
                    action,
                    title,
                },
            }
        }
        Payload::IssueComment(comment) => {
            let number = comment.issue.number;
            let is_pr = comment.issue.pull_request.is_some();
            let (path, label) = if is_pr { ("pull", "PR") } else { ("issues", "issue") };
            ProcessedInfo {
                links: vec![format!("{WEB_BASE}/{repo}/{path}/{number}")],
                details: vec![format!("Commented on {label} #{number}")],
                commits: Vec::new(),
                detail: EventDetail::Comment {
                    issue_number: number,
                    is_pull_request: is_pr,
                },
            }
        }
        Payload::Review(review) => {
            let number = review.pull_request.number;
            let state = review.review.state.clone();
            ProcessedInfo {
                links: vec![format!("{WEB_BASE}/{repo}/pull/{number}")],
                details: vec![format!("Reviewed PR #{number}: {state}")],
                commits: Vec::new(),
                detail: EventDetail::Review {
                    pr_number: number,
                    review_state: state,
                },
            }
        }
        Payload::Ref(action, fields) => ProcessedInfo {
            links: Vec::new(),
            details: vec![format!(
                "{} {} '{}'",
                action.label(),
                fields.ref_type,
                fields.ref_name
            )],
            commits: Vec::new(),
            detail: EventDetail::Ref {
                action: *action,
                ref_type: fields.ref_type.clone(),
                ref_name: fields.ref_name.clone(),
            },
        },
        Payload::Other => ProcessedInfo::default(),
    }
}

fn classify_push(repo: &str, push: &PushPayload, ctx: &mut FetchContext) -> ProcessedInfo {
    let branch = push
        .git_ref
        .strip_prefix(BRANCH_REF_PREFIX)
        .unwrap_or(&push.git_ref)
        .to_owned();

    let commits = push
        .commits
        .iter()
        .filter_map(|commit| {
            let message = commit.message.trim();
            let sha = commit.sha.as_str();
            if message.is_empty() || sha.is_empty() || !ctx.first_sighting(message) {
                return None;
            }
            Some(CommitRef {
                message: message.to_owned(),
                short_sha: sha.chars().take(7).collect(),
                full_sha: sha.to_owned(),
                link: format!("{WEB_BASE}/{repo}/commit/{sha}"),
            })
        })
        .collect();

    ProcessedInfo {
        links: vec![format!("{WEB_BASE}/{repo}/tree/{branch}")],
        details: vec![format!("Pushed {} commits to {branch}", push.size)],
        commits,
        detail: EventDetail::Push {
            branch,
            commit_count: push.size,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(kind: &str, payload: Value) -> RawEvent {
        serde_json::from_value(json!({
            "type": kind,
            "created_at": "2024-07-23T10:00:00Z",
            "actor": {"login": "testuser"},
            "repo": {"name": "test_org/repo1"},
            "payload": payload,
        }))
        .unwrap()
    }

    fn event(kind: &str, payload: Value, ctx: &mut FetchContext) -> ActivityEvent {
        ActivityEvent::from_raw(raw(kind, payload), "test_org/repo1", ctx)
    }

    #[test]
    fn push_event_extracts_branch_and_commits() {
        let mut ctx = FetchContext::new();
        let ev = event(
            "PushEvent",
            json!({
                "ref": "refs/heads/feature/login",
                "size": 2,
                "commits": [
                    {"message": "Add login form", "sha": "abc123def456"},
                    {"message": "  Wire up API  ", "sha": "def456abc789"}
                ]
            }),
            &mut ctx,
        );
        let info = &ev.processed_info;
        assert_eq!(ev.event_type, EventType::Push);
        assert_eq!(ev.actor, "testuser");
        assert_eq!(
            info.links,
            vec!["https://github.com/test_org/repo1/tree/feature/login"]
        );
        assert_eq!(info.details, vec!["Pushed 2 commits to feature/login"]);
        assert_eq!(info.commits.len(), 2);
        assert_eq!(info.commits[0].short_sha, "abc123d");
        assert_eq!(info.commits[0].full_sha, "abc123def456");
        assert_eq!(
            info.commits[0].link,
            "https://github.com/test_org/repo1/commit/abc123def456"
        );
        assert_eq!(info.commits[1].message, "Wire up API");
        assert_eq!(
            info.detail,
            EventDetail::Push {
                branch: "feature/login".into(),
                commit_count: 2
            }
        );
    }

    #[test]
    fn push_skips_empty_message_or_sha() {
        let mut ctx = FetchContext::new();
        let ev = event(
            "PushEvent",
            json!({
                "ref": "refs/heads/main",
                "size": 3,
                "commits": [
                    {"message": "", "sha": "aaa"},
                    {"message": "no sha", "sha": ""},
                    {"message": "kept", "sha": "bbbbbbbbb"}
                ]
            }),
            &mut ctx,
        );
        assert_eq!(ev.processed_info.commits.len(), 1);
        assert_eq!(ctx.seen_count(), 1);
    }

    #[test]
    fn repeated_messages_are_attributed_once_per_fetch() {
        let mut ctx = FetchContext::new();
        let first = event(
            "PushEvent",
            json!({"ref": "refs/heads/main", "size": 1,
                   "commits": [{"message": "Fix the bug", "sha": "1111111aaa"}]}),
            &mut ctx,
        );
        // Force-push: same message, new hash, different casing.
        let second = event(
            "PushEvent",
            json!({"ref": "refs/heads/main", "size": 2,
                   "commits": [{"message": "fix the bug", "sha": "2222222bbb"},
                               {"message": "Another change", "sha": "3333333ccc"}]}),
            &mut ctx,
        );
        assert_eq!(first.processed_info.commits.len(), 1);
        assert_eq!(second.processed_info.commits.len(), 1);
        assert_eq!(second.processed_info.commits[0].message, "Another change");
        assert_eq!(ctx.seen_count(), 2);

        // A fresh context forgets everything.
        let mut fresh = FetchContext::new();
        let again = event(
            "PushEvent",
            json!({"ref": "refs/heads/main", "size": 1,
                   "commits": [{"message": "Fix the bug", "sha": "4444444ddd"}]}),
            &mut fresh,
        );
        assert_eq!(again.processed_info.commits.len(), 1);
    }

    #[test]
    fn dedup_key_normalizes_case_and_spaces() {
        assert_eq!(dedup_key("Fix The Bug"), "fix_the_bug");
    }

    #[test]
    fn pull_request_event() {
        let mut ctx = FetchContext::new();
        let ev = event(
            "PullRequestEvent",
            json!({"action": "opened", "pull_request": {"number": 123, "title": "Add new feature"}}),
            &mut ctx,
        );
        let info = &ev.processed_info;
        assert_eq!(info.links, vec!["https://github.com/test_org/repo1/pull/123"]);
        assert_eq!(info.details, vec!["PR #123: opened - Add new feature"]);
        assert!(info.commits.is_empty());
        assert_eq!(
            info.detail,
            EventDetail::PullRequest {
                pr_number: 123,
                action: PrAction::Opened,
                title: "Add new feature".into()
            }
        );
    }

    #[test]
    fn comment_on_pull_request_vs_issue() {
        let mut ctx = FetchContext::new();
        let on_pr = event(
            "IssueCommentEvent",
            json!({"issue": {"number": 789, "pull_request": {"url": "x"}}}),
            &mut ctx,
        );
        assert_eq!(
            on_pr.processed_info.links,
            vec!["https://github.com/test_org/repo1/pull/789"]
        );
        assert_eq!(on_pr.processed_info.details, vec!["Commented on PR #789"]);

        let on_issue = event("IssueCommentEvent", json!({"issue": {"number": 12}}), &mut ctx);
        assert_eq!(
            on_issue.processed_info.links,
            vec!["https://github.com/test_org/repo1/issues/12"]
        );
        assert_eq!(on_issue.processed_info.details, vec!["Commented on issue #12"]);
    }

    #[test]
    fn review_event() {
        let mut ctx = FetchContext::new();
        let ev = event(
            "PullRequestReviewEvent",
            json!({"pull_request": {"number": 456}, "review": {"state": "approved"}}),
            &mut ctx,
        );
        assert_eq!(ev.processed_info.details, vec!["Reviewed PR #456: approved"]);
        assert_eq!(
            ev.processed_info.links,
            vec!["https://github.com/test_org/repo1/pull/456"]
        );
    }

    #[test]
    fn ref_create_and_delete() {
        let mut ctx = FetchContext::new();
        let created = event(
            "CreateEvent",
            json!({"ref_type": "branch", "ref": "feature-branch"}),
            &mut ctx,
        );
        assert_eq!(created.processed_info.details, vec!["Created branch 'feature-branch'"]);
        assert!(created.processed_info.links.is_empty());
        let value = serde_json::to_value(&created.processed_info.detail).unwrap();
        assert_eq!(value["action"], "created");
        assert_eq!(value["ref"], "feature-branch");

        let deleted = event("DeleteEvent", json!({"ref_type": "tag", "ref": "v1"}), &mut ctx);
        assert_eq!(deleted.processed_info.details, vec!["Deleted tag 'v1'"]);
    }

    #[test]
    fn unknown_and_review_comment_events_get_empty_info() {
        let mut ctx = FetchContext::new();
        for kind in ["WatchEvent", "PullRequestReviewCommentEvent"] {
            let ev = event(kind, json!({"anything": 1}), &mut ctx);
            assert_eq!(ev.processed_info, ProcessedInfo::default());
        }
        let ev = event("WatchEvent", json!({}), &mut ctx);
        assert_eq!(ev.event_type, EventType::Other("WatchEvent".into()));
    }

    #[test]
    fn malformed_payload_falls_back_to_defaults() {
        let mut ctx = FetchContext::new();
        let ev = event("PushEvent", json!({"size": "lots", "commits": 5}), &mut ctx);
        assert!(ev.processed_info.commits.is_empty());
        assert_eq!(ev.processed_info.details, vec!["Pushed 0 commits to "]);
    }

    #[test]
    fn event_type_serializes_as_wire_tag() {
        assert_eq!(serde_json::to_value(EventType::Push).unwrap(), json!("PushEvent"));
        let parsed: EventType = serde_json::from_value(json!("GollumEvent")).unwrap();
        assert_eq!(parsed, EventType::Other("GollumEvent".into()));
    }

    #[test]
    fn activity_event_accepts_type_alias() {
        let ev: ActivityEvent = serde_json::from_value(json!({
            "type": "PullRequestEvent",
            "created_at": "2024-07-23T11:00:00Z",
            "repo": "o/r",
            "actor": "me"
        }))
        .unwrap();
        assert_eq!(ev.event_type, EventType::PullRequest);
        assert_eq!(ev.processed_info, ProcessedInfo::default());
    }

    #[test]
    fn processed_info_always_serializes_three_sequences() {
        let value = serde_json::to_value(ProcessedInfo::default()).unwrap();
        assert_eq!(value["links"], json!([]));
        assert_eq!(value["details"], json!([]));
        assert_eq!(value["commits"], json!([]));
    }
}
