use reqwest::Method;
use std::sync::Arc;

use crate::error::{ClientError, Result};
use crate::http_client::ApiClient;
use crate::models::{NewTask, Task, TaskQuery, TaskUpdate, TasksResponse};

/// Page size used when scanning for a single task
const SCAN_PAGE_SIZE: u32 = 50;

/// CRUD operations on `/tasks`
#[derive(Clone)]
pub struct TaskApi {
    http: Arc<ApiClient>,
}

impl TaskApi {
    pub fn new(http: Arc<ApiClient>) -> Self {
        Self { http }
    }

    /// One page of tasks matching `query`
    pub async fn list(&self, query: &TaskQuery) -> Result<TasksResponse> {
        let request = self
            .http
            .request(Method::GET, "/tasks")
            .query(&query.to_pairs());
        self.http.send_json(request).await
    }

    pub async fn create(&self, task: &NewTask) -> Result<Task> {
        let request = self.http.request(Method::POST, "/tasks").json(task);
        let created: Task = self.http.send_json(request).await?;
        tracing::info!(task_id = created.id, "Created task");
        Ok(created)
    }

    pub async fn update(&self, id: i64, update: &TaskUpdate) -> Result<Task> {
        let request = self
            .http
            .request(Method::PATCH, &format!("/tasks/{}", id))
            .json(update);
        self.http.send_json(request).await
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        let request = self.http.request(Method::DELETE, &format!("/tasks/{}", id));
        self.http.send_empty(request).await?;
        tracing::info!(task_id = id, "Deleted task");
        Ok(())
    }

    /// Flip DONE to TODO and anything else to DONE
    pub async fn toggle_status(&self, task: &Task) -> Result<Task> {
        let next = task.status.toggled();
        let updated = self.update(task.id, &TaskUpdate::status(next)).await?;
        tracing::info!(task_id = task.id, "Task marked as {}", next);
        Ok(updated)
    }

    /// Find a task by id by paging through the list
    pub async fn find(&self, id: i64) -> Result<Task> {
        let mut query = TaskQuery {
            limit: SCAN_PAGE_SIZE,
            ..TaskQuery::default()
        };

        loop {
            let page = self.list(&query).await?;
            if let Some(task) = page.tasks.into_iter().find(|t| t.id == id) {
                return Ok(task);
            }
            if query.page >= page.pagination.total_pages {
                return Err(ClientError::Api {
                    status: 404,
                    message: format!("Task {} not found", id),
                });
            }
            query.page += 1;
        }
    }
}
