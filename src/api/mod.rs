//! ZenTao API client and types.
//!
//! This module provides the interface for communicating with the ZenTao
//! REST API (`api.php/v1`) and for persisting login credentials.

pub mod auth;
pub mod client;
pub mod error;
pub mod types;

pub use auth::{CredentialStore, Credentials, KeyringStore, MemoryStore};
pub use client::{ClientOptions, RequestOptions, Session, ZentaoClient};
pub use error::ApiError;
pub use types::{
    Assignee, Bug, CommitRules, Execution, Product, Project, ServerConfig, ServerMode, Story,
    Task, User,
};
