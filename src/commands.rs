// Command-line front end: login/register, task dashboard and task form

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Input, Password};
use std::sync::Arc;

use crate::api::{AuthApi, TaskApi};
use crate::auth::{SessionManager, SqliteStore};
use crate::config::{CliArgs, Config};
use crate::error::{ClientError, Result};
use crate::http_client::{build_transport, ApiClient};
use crate::models::{NewTask, Task, TaskPriority, TaskQuery, TaskStatus, TaskUpdate, TasksResponse};

/// TaskFlow command-line client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub args: CliArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in and store the session
    Login {
        #[arg(short, long)]
        email: Option<String>,
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Create an account
    Register {
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        email: Option<String>,
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Sign out and forget stored credentials
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Manage tasks
    #[command(subcommand)]
    Tasks(TaskCommand),
    /// Write a .env file interactively
    Setup,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    /// List tasks
    List {
        #[arg(long, default_value = "1")]
        page: u32,
        #[arg(long, default_value = "8")]
        limit: u32,
        /// Search tasks by title
        #[arg(short = 'q', long, default_value = "")]
        search: String,
        #[arg(long)]
        status: Option<TaskStatus>,
        #[arg(long)]
        priority: Option<TaskPriority>,
    },
    /// Create a task
    Add {
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long, default_value = "TODO")]
        status: TaskStatus,
        #[arg(long, default_value = "MEDIUM")]
        priority: TaskPriority,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<NaiveDate>,
    },
    /// Edit a task
    Edit {
        id: i64,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long)]
        status: Option<TaskStatus>,
        #[arg(long)]
        priority: Option<TaskPriority>,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<NaiveDate>,
    },
    /// Mark a task done, or back to do if it already is
    Toggle { id: i64 },
    /// Delete a task
    Delete {
        id: i64,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Everything a command needs, built once per process
pub struct App {
    pub session: Arc<SessionManager>,
    pub auth: AuthApi,
    pub tasks: TaskApi,
}

impl App {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let transport = build_transport(config.http_connect_timeout, config.http_request_timeout)?;
        let store = SqliteStore::open(&config.store_path).with_context(|| {
            format!(
                "Failed to open credential store at {}",
                config.store_path.display()
            )
        })?;

        let session = Arc::new(SessionManager::new(
            Arc::new(store),
            transport.clone(),
            config.api_base_url.clone(),
        ));
        Ok(Self::new(transport, session))
    }

    pub fn new(transport: reqwest::Client, session: Arc<SessionManager>) -> Self {
        let http = Arc::new(ApiClient::new(transport, session.clone()));
        Self {
            session,
            auth: AuthApi::new(http.clone()),
            tasks: TaskApi::new(http),
        }
    }

    /// Run a command; the session must already be restored
    pub async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Login { email, password } => {
                let email = prompt_or(email, "Email")?;
                let password = password_or(password, false)?;
                let user = self.auth.login(&email, &password).await?;
                println!("Welcome back, {}!", user.name);
            }
            Command::Register {
                name,
                email,
                password,
            } => {
                let name = prompt_or(name, "Full name")?;
                let email = prompt_or(email, "Email")?;
                let password = password_or(password, true)?;
                self.auth.register(&name, &email, &password).await?;
                println!("Registration successful. Run `taskflow login` to sign in.");
            }
            Command::Logout => {
                self.auth.logout().await?;
                println!("Logged out");
            }
            Command::Whoami => match self.session.user().await {
                Some(user) => println!("{} <{}> (id {})", user.name, user.email, user.id),
                None => println!("Not logged in"),
            },
            Command::Tasks(cmd) => {
                self.require_session().await?;
                self.run_task_command(cmd).await?;
            }
            Command::Setup => {
                crate::config::run_interactive_setup()?;
            }
        }
        Ok(())
    }

    async fn require_session(&self) -> Result<()> {
        if self.session.is_authenticated().await {
            Ok(())
        } else {
            Err(ClientError::NotAuthenticated)
        }
    }

    async fn run_task_command(&self, cmd: TaskCommand) -> Result<()> {
        match cmd {
            TaskCommand::List {
                page,
                limit,
                search,
                status,
                priority,
            } => {
                let query = TaskQuery {
                    page,
                    limit,
                    search,
                    status,
                    priority,
                };
                let response = self.tasks.list(&query).await?;
                print!("{}", render_task_page(&response));
            }
            TaskCommand::Add {
                title,
                description,
                status,
                priority,
                due,
            } => {
                let task = NewTask {
                    title: prompt_or(title, "Title")?,
                    description,
                    status,
                    priority,
                    due_date: due,
                };
                let created = self.tasks.create(&task).await?;
                println!("Task created successfully");
                println!("{}", render_task_line(&created));
            }
            TaskCommand::Edit {
                id,
                title,
                description,
                status,
                priority,
                due,
            } => {
                let update = TaskUpdate {
                    title,
                    description,
                    status,
                    priority,
                    due_date: due,
                };
                let update = require_changes(update)?;
                let updated = self.tasks.update(id, &update).await?;
                println!("Task updated successfully");
                println!("{}", render_task_line(&updated));
            }
            TaskCommand::Toggle { id } => {
                let task = self.tasks.find(id).await?;
                let updated = self.tasks.toggle_status(&task).await?;
                println!(
                    "Task marked as {}",
                    updated.status.as_str().to_lowercase().replace('_', " ")
                );
            }
            TaskCommand::Delete { id, yes } => {
                let confirmed = yes
                    || Confirm::new()
                        .with_prompt("Are you sure you want to delete this task?")
                        .default(false)
                        .interact()
                        .context("Failed to read confirmation")?;
                if !confirmed {
                    println!("Cancelled");
                    return Ok(());
                }
                self.tasks.delete(id).await?;
                println!("Task deleted successfully");
            }
        }
        Ok(())
    }
}

fn require_changes(update: TaskUpdate) -> Result<TaskUpdate> {
    if update.is_empty() {
        return Err(ClientError::Usage(
            "Nothing to update; pass at least one field".to_string(),
        ));
    }
    Ok(update)
}

fn prompt_or(value: Option<String>, prompt: &str) -> Result<String> {
    match value {
        Some(v) => Ok(v),
        None => Ok(Input::<String>::new()
            .with_prompt(prompt)
            .interact_text()
            .with_context(|| format!("Failed to read {}", prompt.to_lowercase()))?),
    }
}

fn password_or(value: Option<String>, confirm: bool) -> Result<String> {
    if let Some(v) = value {
        return Ok(v);
    }
    let mut prompt = Password::new().with_prompt("Password");
    if confirm {
        prompt = prompt.with_confirmation("Confirm password", "Passwords do not match");
    }
    Ok(prompt.interact().context("Failed to read password")?)
}

/// One line per task: checkbox, id, priority, title, due date
pub fn render_task_line(task: &Task) -> String {
    let check = if task.status == TaskStatus::Done { "x" } else { " " };
    let mut line = format!(
        "[{}] #{:<4} {:<6} {:<11} {}",
        check,
        task.id,
        task.priority.as_str(),
        task.status.as_str(),
        task.title
    );
    if let Some(due) = task.due_date {
        line.push_str(&format!("  (due {})", due.format("%Y-%m-%d")));
    }
    line
}

pub fn render_task_page(response: &TasksResponse) -> String {
    if response.tasks.is_empty() {
        return "No tasks found\n".to_string();
    }

    let mut out = String::new();
    for task in &response.tasks {
        out.push_str(&render_task_line(task));
        out.push('\n');
    }
    let p = &response.pagination;
    out.push_str(&format!(
        "Page {} of {}, {} tasks total\n",
        p.page,
        p.total_pages.max(1),
        p.total
    ));
    out
}
