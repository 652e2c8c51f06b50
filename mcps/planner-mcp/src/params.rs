//! Parameter definitions for planner-mcp tools

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Upper bound on `get_archived_tasks` page size
pub const MAX_ARCHIVED_LIMIT: u32 = 1000;

// ============================================================================
// Task queries
// ============================================================================

/// Which tasks of a day to return
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CompletionFilter {
    #[default]
    All,
    Incomplete,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetTasksByDayParams {
    /// Day in YYYY-MM-DD format
    pub day: String,
    /// IANA timezone name, e.g. "Europe/Berlin". Defaults to the user's timezone.
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub completion_filter: CompletionFilter,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetArchivedTasksParams {
    /// Number of tasks to skip
    #[serde(default)]
    pub offset: Option<u32>,
    /// Page size, 1 to 1000 (default 100)
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetTaskByIdParams {
    pub task_id: String,
}

// ============================================================================
// Task mutations
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateTaskParams {
    /// Task title
    pub text: String,
    #[serde(default)]
    pub notes: Option<String>,
    /// Streams (projects) to file the task under
    #[serde(default)]
    pub stream_ids: Option<Vec<String>>,
    /// Estimated duration in minutes
    #[serde(default)]
    pub time_estimate: Option<u32>,
    /// Due date in YYYY-MM-DD format
    #[serde(default)]
    pub due_date: Option<String>,
    /// Day to schedule the task on, YYYY-MM-DD. Omit to put it in the backlog.
    #[serde(default)]
    pub snooze_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UpdateTaskCompleteParams {
    pub task_id: String,
    /// Set to false to mark the task incomplete again
    #[serde(default = "default_true")]
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UpdateTaskSnoozeDateParams {
    pub task_id: String,
    /// New day in YYYY-MM-DD format, or null to move the task to the backlog
    #[serde(default)]
    pub new_day: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeleteTaskParams {
    pub task_id: String,
}

fn default_true() -> bool {
    true
}
