//! # Book Companion
//!
//! Client-side core of the book site's reader widgets: the persisted
//! session, the sign-in/sign-up state machine, the background preferences
//! panel, the book assistant chat and the per-chapter personalize/translate
//! actions. Every decision is delegated to the companion REST backend.
//!
//! ## Architecture
//!
//! ```text
//! CLI / host view ──► flows ──► Backend (reqwest) ──► companion API
//!                       │
//!                       └────► SessionStore ──► LocalStorage (SQLite)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use book_companion::api::BackendClient;
//! use book_companion::flows::{AuthFlow, AuthMode};
//! use book_companion::storage::SqliteStorage;
//! use book_companion::{Config, SessionStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage = SqliteStorage::new(&config.storage).await?;
//!     let session = SessionStore::new(Arc::new(storage));
//!     let backend = Arc::new(BackendClient::new(&config.backend, config.request.clone())?);
//!
//!     let mut flow = AuthFlow::new(backend, session, AuthMode::SignIn);
//!     flow.set_email("reader@example.com");
//!     flow.set_password("secret");
//!     flow.submit().await?;
//!     Ok(())
//! }
//! ```

/// Backend REST client and wire types.
pub mod api;
/// Command-line host for the flows.
pub mod cli;
/// Configuration loaded from environment variables.
pub mod config;
/// Error types and result aliases.
pub mod error;
/// View-state machines for each widget.
pub mod flows;
/// Reader background questionnaire types.
pub mod profile;
/// Persisted authentication session.
pub mod session;
/// Durable key/value storage backing the session.
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use session::{Session, SessionStore};
