//! bookvault: a publishing and reading backend for e-books.
//!
//! Publishers register, organise books into categories and upload content
//! files, which are encrypted at rest. Readers register, purchase books,
//! keep highlights, notes and a bookmark per purchase, manage a cart and a
//! wishlist, and stream the books they own.
//!
//! # Features
//!
//! - JSON HTTP API with role-scoped bearer tokens
//! - Ownership checks on every publisher and reader resource
//! - XChaCha20-Poly1305 encryption of stored book files
//! - Staged uploads committed together with their database rows
//! - Per-client rate limits on registration and login

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication and tokens.
pub mod auth;
/// Configuration and CLI.
pub mod config;
/// Book file encryption.
pub mod crypto;
/// Database operations.
pub mod db;
/// Error types.
pub mod error;
/// HTTP server.
pub mod server;
/// Upload directories.
pub mod storage;


pub use config::{Cli, Command, Config};
pub use db::Database;
pub use error::{AppError, Result};
pub use server::{AppState, create_router};
