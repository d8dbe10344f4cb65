//! ZenTao API request and response types.
//!
//! These types model the `api.php/v1` responses for users, products,
//! projects, executions, tasks, stories and bugs, plus the two
//! configuration endpoints (`index.php?mode=getconfig` and `repos/rules`).
//! Unknown fields are ignored; fields the server may omit are optional.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The current authenticated user.
///
/// Returned (wrapped in `profile`) by `GET api.php/v1/user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// The user ID.
    pub id: u64,
    /// The login account.
    pub account: String,
    /// The user's real name.
    #[serde(default)]
    pub realname: String,
    /// The user's role.
    #[serde(default)]
    pub role: Option<String>,
    /// The user's email address.
    #[serde(default)]
    pub email: Option<String>,
}

impl User {
    /// The name to show for this user: real name, or account when empty.
    pub fn display_name(&self) -> &str {
        if self.realname.is_empty() {
            &self.account
        } else {
            &self.realname
        }
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name(), self.account)
    }
}

/// Response body of `GET api.php/v1/user`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ProfileResponse {
    pub profile: User,
}

/// Request body of `POST api.php/v1/tokens`.
#[derive(Debug, Serialize)]
pub(crate) struct TokenRequest<'a> {
    pub account: &'a str,
    pub password: &'a str,
}

/// Response body of `POST api.php/v1/tokens`.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub token: String,
}

/// A user reference embedded in another object (e.g. `assignedTo`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// The user ID, when the server includes it.
    #[serde(default)]
    pub id: Option<u64>,
    /// The login account.
    #[serde(default)]
    pub account: String,
    /// The user's real name.
    #[serde(default)]
    pub realname: Option<String>,
}

/// The assignee of a task, story or bug.
///
/// Depending on the endpoint the server sends either a user object or a
/// bare account string (empty when unassigned).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Assignee {
    /// Full user reference.
    User(UserRef),
    /// Bare account name.
    Account(String),
}

impl Assignee {
    /// Check whether this assignee is the given user.
    ///
    /// Object references compare by id when present, otherwise by account.
    pub fn is_user(&self, user: &User) -> bool {
        match self {
            Assignee::User(r) => match r.id {
                Some(id) => id == user.id,
                None => !r.account.is_empty() && r.account == user.account,
            },
            Assignee::Account(account) => !account.is_empty() && *account == user.account,
        }
    }

    /// The assignee's account name, empty when unassigned.
    pub fn account(&self) -> &str {
        match self {
            Assignee::User(r) => &r.account,
            Assignee::Account(account) => account,
        }
    }
}

/// A ZenTao product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// The product ID.
    pub id: u64,
    /// The product name.
    pub name: String,
    /// The product code.
    #[serde(default)]
    pub code: Option<String>,
    /// The product status (e.g. "normal", "closed").
    #[serde(default)]
    pub status: Option<String>,
}

/// A ZenTao project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// The project ID.
    pub id: u64,
    /// The project name.
    pub name: String,
    /// The project code.
    #[serde(default)]
    pub code: Option<String>,
    /// The project status (e.g. "wait", "doing", "closed").
    #[serde(default)]
    pub status: Option<String>,
    /// Planned start date.
    #[serde(default)]
    pub begin: Option<String>,
    /// Planned end date.
    #[serde(default)]
    pub end: Option<String>,
}

/// An execution (iteration / sprint) under a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// The execution ID.
    pub id: u64,
    /// The execution name.
    pub name: String,
    /// The owning project ID.
    #[serde(default)]
    pub project: Option<u64>,
    /// The execution status.
    #[serde(default)]
    pub status: Option<String>,
    /// Planned start date.
    #[serde(default)]
    pub begin: Option<String>,
    /// Planned end date.
    #[serde(default)]
    pub end: Option<String>,
}

/// A task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// The task ID.
    pub id: u64,
    /// The task name.
    pub name: String,
    /// The task status (wait, doing, done, pause, cancel, closed).
    #[serde(default)]
    pub status: Option<String>,
    /// The current assignee.
    #[serde(default, rename = "assignedTo")]
    pub assigned_to: Option<Assignee>,
    /// Parent task ID (`-1` marks a parent task, `0` a top-level task).
    #[serde(default)]
    pub parent: Option<i64>,
    /// Child tasks.
    #[serde(default)]
    pub children: Vec<Task>,
}

/// A story (requirement).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    /// The story ID.
    pub id: u64,
    /// The story title.
    pub title: String,
    /// The story status (draft, active, changing, reviewing, closed).
    #[serde(default)]
    pub status: Option<String>,
    /// The current assignee.
    #[serde(default, rename = "assignedTo")]
    pub assigned_to: Option<Assignee>,
    /// Parent story ID.
    #[serde(default)]
    pub parent: Option<i64>,
    /// Child stories.
    #[serde(default)]
    pub children: Vec<Story>,
}

/// A bug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bug {
    /// The bug ID.
    pub id: u64,
    /// The bug title.
    pub title: String,
    /// The bug status (active, resolved, closed).
    #[serde(default)]
    pub status: Option<String>,
    /// The current assignee.
    #[serde(default, rename = "assignedTo")]
    pub assigned_to: Option<Assignee>,
}

/// Pagination fields carried by list responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct PageInfo {
    /// The current page number.
    #[serde(default)]
    pub page: Option<u64>,
    /// Total number of records on the server.
    #[serde(default)]
    pub total: Option<u64>,
    /// Page size used for this response.
    #[serde(default)]
    pub limit: Option<u64>,
}

impl PageInfo {
    /// Read the pagination fields from a response object.
    ///
    /// Missing or non-numeric fields are treated as absent.
    pub fn from_body(body: &serde_json::Map<String, serde_json::Value>) -> Self {
        let field = |name: &str| body.get(name).and_then(as_count);
        Self {
            page: field("page"),
            total: field("total"),
            limit: field("limit"),
        }
    }

    /// The limit to request so that one page holds every record.
    ///
    /// Returns `None` when the response is not paginated or already complete.
    pub fn full_page_limit(&self) -> Option<u64> {
        match (self.limit, self.total) {
            (Some(limit), Some(total)) if limit < total => Some(total),
            _ => None,
        }
    }
}

/// Accept counts sent either as numbers or numeric strings.
fn as_count(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Server deployment mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    /// Project-centric hierarchy: tasks hang directly off projects.
    Classic,
    /// Project + execution hierarchy.
    New,
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMode::Classic => write!(f, "classic"),
            ServerMode::New => write!(f, "new"),
        }
    }
}

/// Server configuration returned by `GET index.php?mode=getconfig`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Server version string.
    #[serde(default)]
    pub version: Option<String>,
    /// URL routing style ("PATH_INFO" or "GET").
    #[serde(default)]
    pub request_type: Option<String>,
    /// Deployment mode ("classic" or "new").
    #[serde(default)]
    pub system_mode: Option<String>,
    /// Everything else the server reports.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ServerConfig {
    /// The deployment mode. Anything but an explicit "classic" is the new mode.
    pub fn server_mode(&self) -> ServerMode {
        match self.system_mode.as_deref() {
            Some("classic") => ServerMode::Classic,
            _ => ServerMode::New,
        }
    }
}

/// Commit-message matching rules returned by `GET api.php/v1/repos/rules`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRules {
    /// Keywords naming each object type inside a commit message.
    pub module: RuleModules,
    /// How object ids are marked and separated.
    pub id: RuleIdFormat,
    /// Action keyword groups (start/finish task, resolve bug, ...).
    #[serde(flatten)]
    pub actions: serde_json::Map<String, serde_json::Value>,
}

/// Object type keywords used in commit messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleModules {
    /// Keyword for tasks.
    pub task: String,
    /// Keyword for bugs.
    pub bug: String,
    /// Keyword for stories.
    pub story: String,
}

/// Id marker and separator used in commit messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleIdFormat {
    /// Prefix placed before an id (e.g. "#").
    pub mark: String,
    /// Separator between several ids (e.g. ",").
    pub split: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_user() -> User {
        User {
            id: 3,
            account: "alice".to_string(),
            realname: "Alice".to_string(),
            role: None,
            email: None,
        }
    }

    #[test]
    fn test_parse_profile_response() {
        let body = json!({
            "profile": {
                "id": 3,
                "account": "alice",
                "realname": "Alice",
                "role": "dev",
                "dept": 2
            }
        });
        let parsed: ProfileResponse = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.profile.account, "alice");
        assert_eq!(parsed.profile.role.as_deref(), Some("dev"));
    }

    #[test]
    fn test_user_display_name_falls_back_to_account() {
        let mut user = sample_user();
        assert_eq!(user.display_name(), "Alice");
        user.realname.clear();
        assert_eq!(user.display_name(), "alice");
        assert_eq!(user.to_string(), "alice (alice)");
    }

    #[test]
    fn test_assignee_object_form() {
        let task: Task = serde_json::from_value(json!({
            "id": 12,
            "name": "Write parser",
            "status": "doing",
            "assignedTo": {"id": 3, "account": "alice", "realname": "Alice"}
        }))
        .unwrap();

        let assignee = task.assigned_to.unwrap();
        assert!(assignee.is_user(&sample_user()));
        assert_eq!(assignee.account(), "alice");
    }

    #[test]
    fn test_assignee_string_form() {
        let bug: Bug = serde_json::from_value(json!({
            "id": 4,
            "title": "Crash on save",
            "assignedTo": "alice"
        }))
        .unwrap();

        assert!(bug.assigned_to.unwrap().is_user(&sample_user()));
    }

    #[test]
    fn test_unassigned_empty_string_matches_nobody() {
        let assignee = Assignee::Account(String::new());
        let mut user = sample_user();
        user.account.clear();
        assert!(!assignee.is_user(&user));
    }

    #[test]
    fn test_parse_task_with_children() {
        let task: Task = serde_json::from_value(json!({
            "id": 1,
            "name": "Parent",
            "parent": -1,
            "children": [{"id": 2, "name": "Child", "parent": 1}]
        }))
        .unwrap();

        assert_eq!(task.children.len(), 1);
        assert_eq!(task.children[0].parent, Some(1));
        assert!(task.assigned_to.is_none());
    }

    #[test]
    fn test_page_info_full_page_limit() {
        let body = json!({"page": 1, "total": 42, "limit": 20, "tasks": []});
        let info = PageInfo::from_body(body.as_object().unwrap());
        assert_eq!(info.full_page_limit(), Some(42));

        let body = json!({"page": 1, "total": 42, "limit": 100});
        let info = PageInfo::from_body(body.as_object().unwrap());
        assert_eq!(info.full_page_limit(), None);
    }

    #[test]
    fn test_page_info_missing_fields() {
        let body = json!({"products": []});
        let info = PageInfo::from_body(body.as_object().unwrap());
        assert_eq!(info, PageInfo::default());
        assert_eq!(info.full_page_limit(), None);
    }

    #[test]
    fn test_page_info_accepts_numeric_strings() {
        let body = json!({"total": "30", "limit": "20"});
        let info = PageInfo::from_body(body.as_object().unwrap());
        assert_eq!(info.full_page_limit(), Some(30));
    }

    #[test]
    fn test_server_mode() {
        let config: ServerConfig = serde_json::from_value(json!({
            "version": "18.5",
            "requestType": "PATH_INFO",
            "systemMode": "classic",
            "sessionName": "zentaosid"
        }))
        .unwrap();
        assert_eq!(config.server_mode(), ServerMode::Classic);
        assert_eq!(config.extra.get("sessionName"), Some(&json!("zentaosid")));

        let config: ServerConfig = serde_json::from_value(json!({"version": "18.5"})).unwrap();
        assert_eq!(config.server_mode(), ServerMode::New);
    }

    #[test]
    fn test_parse_commit_rules() {
        let rules: CommitRules = serde_json::from_value(json!({
            "module": {"task": "Task", "bug": "Bug", "story": "Story"},
            "id": {"mark": "#", "split": ","},
            "task": {"start": "Start", "finish": "Finish"}
        }))
        .unwrap();

        assert_eq!(rules.module.story, "Story");
        assert_eq!(rules.id.mark, "#");
        assert!(rules.actions.contains_key("task"));
    }
}
