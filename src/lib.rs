//! zentao-cli - a client for the ZenTao project management REST API.
//!
//! The [`api::ZentaoClient`] handles login, token persistence, pagination
//! and the resource listings; [`picker::format_for_picker`] turns listed
//! objects into selectable labels.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod notice;
pub mod picker;
