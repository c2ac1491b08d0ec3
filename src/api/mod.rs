// Typed wrappers over the task API endpoints

pub mod auth;
pub mod tasks;

pub use auth::AuthApi;
pub use tasks::TaskApi;
