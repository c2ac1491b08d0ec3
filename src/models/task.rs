use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default page size used by the task dashboard
pub const DEFAULT_PAGE_SIZE: u32 = 8;

// ==================================================================================================
// Enums
// ==================================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "TODO",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Done => "DONE",
        }
    }

    /// Status a task moves to when its checkbox is clicked
    pub fn toggled(self) -> Self {
        match self {
            TaskStatus::Done => TaskStatus::Todo,
            _ => TaskStatus::Done,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "TODO" => Ok(TaskStatus::Todo),
            "IN_PROGRESS" => Ok(TaskStatus::InProgress),
            "DONE" => Ok(TaskStatus::Done),
            other => Err(format!(
                "unknown status '{}' (expected TODO, IN_PROGRESS or DONE)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "LOW",
            TaskPriority::Medium => "MEDIUM",
            TaskPriority::High => "HIGH",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LOW" => Ok(TaskPriority::Low),
            "MEDIUM" => Ok(TaskPriority::Medium),
            "HIGH" => Ok(TaskPriority::High),
            other => Err(format!(
                "unknown priority '{}' (expected LOW, MEDIUM or HIGH)",
                other
            )),
        }
    }
}

// ==================================================================================================
// Response Models
// ==================================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: i64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TasksResponse {
    pub tasks: Vec<Task>,
    pub pagination: Pagination,
}

// ==================================================================================================
// Request Models
// ==================================================================================================

/// Filters for `GET /tasks`
#[derive(Debug, Clone, PartialEq)]
pub struct TaskQuery {
    pub page: u32,
    pub limit: u32,
    pub search: String,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
}

impl Default for TaskQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
            search: String::new(),
            status: None,
            priority: None,
        }
    }
}

impl TaskQuery {
    /// Query-string pairs; unset filters are left out, search is always sent
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("page", self.page.to_string()),
            ("limit", self.limit.to_string()),
            ("search", self.search.clone()),
        ];
        if let Some(status) = self.status {
            pairs.push(("status", status.as_str().to_string()));
        }
        if let Some(priority) = self.priority {
            pairs.push(("priority", priority.as_str().to_string()));
        }
        pairs
    }
}

/// Body of `POST /tasks`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            status: TaskStatus::Todo,
            priority: TaskPriority::Medium,
            due_date: None,
        }
    }
}

/// Body of `PATCH /tasks/:id`; only set fields are sent
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

impl TaskUpdate {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_value(TaskStatus::InProgress).unwrap(),
            json!("IN_PROGRESS")
        );
        let status: TaskStatus = serde_json::from_value(json!("DONE")).unwrap();
        assert_eq!(status, TaskStatus::Done);
    }

    #[test]
    fn test_status_from_str_is_lenient() {
        assert_eq!("todo".parse::<TaskStatus>().unwrap(), TaskStatus::Todo);
        assert_eq!(
            "in-progress".parse::<TaskStatus>().unwrap(),
            TaskStatus::InProgress
        );
        assert!("later".parse::<TaskStatus>().is_err());
        assert_eq!("High".parse::<TaskPriority>().unwrap(), TaskPriority::High);
    }

    #[test]
    fn test_toggle() {
        assert_eq!(TaskStatus::Done.toggled(), TaskStatus::Todo);
        assert_eq!(TaskStatus::Todo.toggled(), TaskStatus::Done);
        assert_eq!(TaskStatus::InProgress.toggled(), TaskStatus::Done);
    }

    #[test]
    fn test_query_omits_unset_filters() {
        let pairs = TaskQuery::default().to_pairs();
        assert_eq!(
            pairs,
            vec![
                ("page", "1".to_string()),
                ("limit", "8".to_string()),
                ("search", String::new()),
            ]
        );

        let query = TaskQuery {
            status: Some(TaskStatus::Done),
            priority: Some(TaskPriority::Low),
            ..TaskQuery::default()
        };
        let pairs = query.to_pairs();
        assert!(pairs.contains(&("status", "DONE".to_string())));
        assert!(pairs.contains(&("priority", "LOW".to_string())));
    }

    #[test]
    fn test_task_deserialize() {
        let task: Task = serde_json::from_value(json!({
            "id": 3,
            "title": "Write report",
            "status": "TODO",
            "priority": "HIGH",
            "dueDate": null,
            "createdAt": "2025-01-12T10:30:00Z",
            "updatedAt": "2025-01-12T10:30:00.000Z"
        }))
        .unwrap();

        assert_eq!(task.id, 3);
        assert!(task.description.is_none());
        assert!(task.due_date.is_none());
        assert_eq!(task.priority, TaskPriority::High);
    }

    #[test]
    fn test_update_only_sends_set_fields() {
        let update = TaskUpdate::status(TaskStatus::Done);
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({ "status": "DONE" })
        );
        assert!(TaskUpdate::default().is_empty());
    }

    #[test]
    fn test_new_task_due_date_format() {
        let mut task = NewTask::new("Ship it");
        task.due_date = NaiveDate::from_ymd_opt(2025, 3, 1);
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["dueDate"], json!("2025-03-01"));
        assert_eq!(value["priority"], json!("MEDIUM"));
        assert!(value.get("description").is_none());
    }
}
