// Authentication module
// Manages the session lifecycle, credential persistence and token refresh

mod credentials;
mod manager;
mod refresh;
mod types;

pub use credentials::{
    CredentialStore, MemoryStore, SqliteStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY,
};
pub use manager::SessionManager;
pub use types::{LoginRequest, LoginResponse, RegisterRequest, Session, User};
