// Data models for the task API

pub mod common;
pub mod task;

pub use common::{ErrorBody, FieldError};
pub use task::{
    NewTask, Pagination, Task, TaskPriority, TaskQuery, TaskStatus, TaskUpdate, TasksResponse,
};
