//! Fetch-and-cache engine for a terminal Gmail client.
//!
//! [`connection::Connection`] lists and fetches messages through a
//! [`api::MailApi`], keeps one live object per message and label ID, and
//! applies label changes confirmed by the server. [`content`] and [`verify`]
//! turn a fetched message into displayable, optionally signature-checked,
//! text.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod connection;
pub mod content;
pub mod error;
pub mod gmail;
pub mod models;
pub mod page;
pub mod parallel;
pub mod session;
pub mod verify;

pub use error::{Error, Result};
