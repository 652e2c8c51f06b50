//! Handler implementations for planner-mcp tools
//!
//! Each handler validates its params, calls the planner API with the client
//! the request resolved to, and wraps the JSON reply in a `CallToolResult`.

use chrono::NaiveDate;
use mcp_common::{internal_error, invalid_params, json_success, unauthorized, CallToolResult, McpError};
use serde_json::{json, Map, Value};

use crate::client_cache::AuthenticatedClient;
use crate::params::*;
use crate::upstream::ApiError;

const DEFAULT_ARCHIVED_LIMIT: u32 = 100;

async fn call(
    client: &AuthenticatedClient,
    method: &str,
    args: Value,
) -> Result<Value, McpError> {
    tracing::debug!(method, identity = ?client.identity(), "calling planner API");
    client.api().call(method, args).await.map_err(|e| match e {
        ApiError::Unauthorized => unauthorized(format!("{method}: planner API rejected the session")),
        e => internal_error(format!("Failed to call {method}: {e}")),
    })
}

// ============================================================================
// User & streams
// ============================================================================

pub async fn get_user(client: &AuthenticatedClient) -> Result<CallToolResult, McpError> {
    let user = call(client, "getUser", json!({})).await?;
    json_success(&user)
}

pub async fn get_streams(client: &AuthenticatedClient) -> Result<CallToolResult, McpError> {
    let streams = call(client, "getStreams", json!({})).await?;
    json_success(&streams)
}

// ============================================================================
// Task queries
// ============================================================================

pub async fn get_tasks_by_day(
    client: &AuthenticatedClient,
    params: GetTasksByDayParams,
) -> Result<CallToolResult, McpError> {
    let day = parse_day("day", &params.day)?;

    let mut args = Map::new();
    args.insert("day".into(), json!(day.to_string()));
    if let Some(tz) = params.timezone {
        args.insert("timezone".into(), json!(tz));
    }

    let tasks = call(client, "getTasksByDay", Value::Object(args)).await?;
    json_success(&filter_by_completion(tasks, params.completion_filter))
}

pub async fn get_tasks_backlog(client: &AuthenticatedClient) -> Result<CallToolResult, McpError> {
    let tasks = call(client, "getTasksBacklog", json!({})).await?;
    json_success(&tasks)
}

pub async fn get_archived_tasks(
    client: &AuthenticatedClient,
    params: GetArchivedTasksParams,
) -> Result<CallToolResult, McpError> {
    let limit = params.limit.unwrap_or(DEFAULT_ARCHIVED_LIMIT);
    if !(1..=MAX_ARCHIVED_LIMIT).contains(&limit) {
        return Err(invalid_params(format!(
            "limit must be between 1 and {MAX_ARCHIVED_LIMIT}, got {limit}"
        )));
    }
    let offset = params.offset.unwrap_or(0);

    let tasks = call(
        client,
        "getArchivedTasks",
        json!({ "offset": offset, "limit": limit }),
    )
    .await?;

    let count = tasks.as_array().map_or(0, Vec::len);
    json_success(&json!({
        "tasks": tasks,
        "pagination": {
            "offset": offset,
            "limit": limit,
            "count": count,
            "has_more": count == limit as usize,
            "next_offset": offset.saturating_add(count as u32),
        }
    }))
}

pub async fn get_task_by_id(
    client: &AuthenticatedClient,
    params: GetTaskByIdParams,
) -> Result<CallToolResult, McpError> {
    let task_id = require_id(&params.task_id)?;
    let task = call(client, "getTaskById", json!({ "taskId": task_id })).await?;
    if task.is_null() {
        return Err(invalid_params(format!("Task not found: {task_id}")));
    }
    json_success(&task)
}

// ============================================================================
// Task mutations
// ============================================================================

pub async fn create_task(
    client: &AuthenticatedClient,
    params: CreateTaskParams,
) -> Result<CallToolResult, McpError> {
    if params.text.trim().is_empty() {
        return Err(invalid_params("Task text cannot be empty"));
    }

    let mut args = Map::new();
    args.insert("text".into(), json!(params.text));
    if let Some(notes) = params.notes {
        args.insert("notes".into(), json!(notes));
    }
    if let Some(stream_ids) = params.stream_ids {
        args.insert("streamIds".into(), json!(stream_ids));
    }
    if let Some(minutes) = params.time_estimate {
        args.insert("timeEstimate".into(), json!(minutes));
    }
    if let Some(due) = params.due_date {
        args.insert("dueDate".into(), json!(parse_day("due_date", &due)?.to_string()));
    }
    if let Some(day) = params.snooze_date {
        args.insert("snoozeDate".into(), json!(parse_day("snooze_date", &day)?.to_string()));
    }

    let task = call(client, "createTask", Value::Object(args)).await?;
    json_success(&task)
}

pub async fn update_task_complete(
    client: &AuthenticatedClient,
    params: UpdateTaskCompleteParams,
) -> Result<CallToolResult, McpError> {
    let task_id = require_id(&params.task_id)?;
    let result = call(
        client,
        "updateTaskComplete",
        json!({ "taskId": task_id, "completed": params.completed }),
    )
    .await?;
    json_success(&result)
}

pub async fn update_task_snooze_date(
    client: &AuthenticatedClient,
    params: UpdateTaskSnoozeDateParams,
) -> Result<CallToolResult, McpError> {
    let task_id = require_id(&params.task_id)?;
    let new_day = params
        .new_day
        .as_deref()
        .map(|day| parse_day("new_day", day))
        .transpose()?;

    let mut args = Map::new();
    args.insert("taskId".into(), json!(task_id));
    args.insert("newDay".into(), json!(new_day.map(|d| d.to_string())));
    if let Some(tz) = params.timezone {
        args.insert("timezone".into(), json!(tz));
    }

    let result = call(client, "updateTaskSnoozeDate", Value::Object(args)).await?;
    json_success(&result)
}

pub async fn delete_task(
    client: &AuthenticatedClient,
    params: DeleteTaskParams,
) -> Result<CallToolResult, McpError> {
    let task_id = require_id(&params.task_id)?;
    let result = call(client, "deleteTask", json!({ "taskId": task_id })).await?;
    json_success(&result)
}

// ============================================================================
// Helpers
// ============================================================================

/// Parse a strict `YYYY-MM-DD` day
fn parse_day(field: &str, value: &str) -> Result<NaiveDate, McpError> {
    let invalid = || invalid_params(format!("{field} must be a date in YYYY-MM-DD format, got {value:?}"));
    if value.len() != 10 {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| invalid())
}

fn require_id(task_id: &str) -> Result<&str, McpError> {
    let task_id = task_id.trim();
    if task_id.is_empty() {
        return Err(invalid_params("task_id cannot be empty"));
    }
    Ok(task_id)
}

/// A task counts as completed when `completed` is true or `completedAt` is set
fn is_completed(task: &Value) -> bool {
    task.get("completed").and_then(Value::as_bool).unwrap_or(false)
        || task.get("completedAt").is_some_and(|v| !v.is_null())
}

/// Apply the completion filter to a task list. Non-list replies pass through.
fn filter_by_completion(tasks: Value, filter: CompletionFilter) -> Value {
    let keep: fn(&Value) -> bool = match filter {
        CompletionFilter::All => return tasks,
        CompletionFilter::Completed => is_completed,
        CompletionFilter::Incomplete => |task| !is_completed(task),
    };
    match tasks {
        Value::Array(items) => Value::Array(items.into_iter().filter(|t| keep(t)).collect()),
        other => other,
    }
}
