//! Picker list formatting.
//!
//! Turns ZenTao objects into `{id, label}` entries for selection lists:
//! child objects are flattened one level under their parent, then the list
//! is narrowed by assignee, by status and by excluded ids.

use std::fmt;
use std::iter;

use serde::{Deserialize, Serialize};

use crate::api::types::{Assignee, Bug, Execution, Product, Project, Story, Task, User};

/// Marker placed before child entries.
const CHILD_INDENT: &str = "└─ ";

/// The object types that carry a status allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Tasks of a project or execution.
    Task,
    /// Bugs.
    Bug,
    /// Stories (requirements).
    Story,
}

impl ResourceKind {
    /// Statuses considered open for this kind.
    pub fn open_statuses(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::Task => &["wait", "doing", "pause"],
            ResourceKind::Bug => &["active"],
            ResourceKind::Story => &["draft", "active", "changing", "reviewing"],
        }
    }
}

/// Which kinds are narrowed to their open statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusFilter {
    /// Only show unfinished tasks.
    pub task: bool,
    /// Only show active bugs.
    pub bug: bool,
    /// Only show open stories.
    pub story: bool,
}

impl Default for StatusFilter {
    fn default() -> Self {
        Self {
            task: true,
            bug: true,
            story: true,
        }
    }
}

impl StatusFilter {
    /// A filter that keeps every status.
    pub fn disabled() -> Self {
        Self {
            task: false,
            bug: false,
            story: false,
        }
    }

    /// Whether filtering is switched on for `kind`.
    pub fn is_enabled(&self, kind: ResourceKind) -> bool {
        match kind {
            ResourceKind::Task => self.task,
            ResourceKind::Bug => self.bug,
            ResourceKind::Story => self.story,
        }
    }
}

/// Options for [`format_for_picker`].
#[derive(Debug, Clone, Default)]
pub struct PickerOptions {
    /// Keep only objects assigned to the given user.
    pub assigned_to_me: bool,
    /// Object kind, selecting the status allow-list.
    pub kind: Option<ResourceKind>,
    /// Per-kind switches for status filtering.
    pub status_filter: Option<StatusFilter>,
    /// Ids to leave out.
    pub exclude: Vec<u64>,
    /// Text placed before each label.
    pub prefix: Option<String>,
}

/// One entry of a picker list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickerItem {
    /// The object id.
    pub id: u64,
    /// The display label.
    pub label: String,
}

impl fmt::Display for PickerItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

/// An object that can appear in a picker list.
pub trait PickerSource: Sized {
    /// The object id.
    fn id(&self) -> u64;

    /// The name or title shown in the label.
    fn title(&self) -> &str;

    /// The workflow status, if the object has one.
    fn status(&self) -> Option<&str> {
        None
    }

    /// Who the object is assigned to, if anyone.
    fn assignee(&self) -> Option<&Assignee> {
        None
    }

    /// Direct children, shown indented below the object.
    fn children(&self) -> &[Self] {
        &[]
    }
}

impl PickerSource for Product {
    fn id(&self) -> u64 {
        self.id
    }

    fn title(&self) -> &str {
        &self.name
    }

    fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}

impl PickerSource for Project {
    fn id(&self) -> u64 {
        self.id
    }

    fn title(&self) -> &str {
        &self.name
    }

    fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}

impl PickerSource for Execution {
    fn id(&self) -> u64 {
        self.id
    }

    fn title(&self) -> &str {
        &self.name
    }

    fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}

impl PickerSource for Task {
    fn id(&self) -> u64 {
        self.id
    }

    fn title(&self) -> &str {
        &self.name
    }

    fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    fn assignee(&self) -> Option<&Assignee> {
        self.assigned_to.as_ref()
    }

    fn children(&self) -> &[Self] {
        &self.children
    }
}

impl PickerSource for Story {
    fn id(&self) -> u64 {
        self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    fn assignee(&self) -> Option<&Assignee> {
        self.assigned_to.as_ref()
    }

    fn children(&self) -> &[Self] {
        &self.children
    }
}

impl PickerSource for Bug {
    fn id(&self) -> u64 {
        self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    fn assignee(&self) -> Option<&Assignee> {
        self.assigned_to.as_ref()
    }
}

/// Format objects for a picker list.
///
/// Each object is followed by its direct children (grandchildren are not
/// expanded). The flattened list is then filtered, in order, by assignee
/// (when `assigned_to_me` is set and a user is known), by the status
/// allow-list of `kind` (when enabled in `status_filter`; objects without a
/// status are dropped), and by `exclude`. Surviving objects keep their order.
pub fn format_for_picker<T: PickerSource>(
    objects: &[T],
    user: Option<&User>,
    options: &PickerOptions,
) -> Vec<PickerItem> {
    let allowed_statuses = match (options.kind, options.status_filter) {
        (Some(kind), Some(filter)) if filter.is_enabled(kind) => Some(kind.open_statuses()),
        _ => None,
    };
    let assignee_filter = if options.assigned_to_me { user } else { None };
    let prefix = match options.prefix.as_deref() {
        Some(prefix) if !prefix.is_empty() => format!("{} ", prefix),
        _ => String::new(),
    };

    objects
        .iter()
        .flat_map(|parent| {
            iter::once((parent, false)).chain(parent.children().iter().map(|child| (child, true)))
        })
        .filter(|(object, _)| match assignee_filter {
            Some(user) => object.assignee().is_some_and(|a| a.is_user(user)),
            None => true,
        })
        .filter(|(object, _)| match allowed_statuses {
            Some(statuses) => object.status().is_some_and(|s| statuses.contains(&s)),
            None => true,
        })
        .filter(|(object, _)| !options.exclude.contains(&object.id()))
        .map(|(object, is_child)| PickerItem {
            id: object.id(),
            label: format!(
                "{}{}#{}: {}",
                prefix,
                if is_child { CHILD_INDENT } else { "" },
                object.id(),
                object.title()
            ),
        })
        .collect()
}
