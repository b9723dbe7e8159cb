//! `clickup_sync` - bidirectional sync between beads issues and a ClickUp list
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Data types shared by both sides (issues, tasks, run results)
//! - [`storage`] - Local issue store backends (`bd` executable, `SQLite`)
//! - [`remote`] - ClickUp REST client
//! - [`sync`] - Reconciliation engine, ledger and run lock
//! - [`config`] - Configuration management
//! - [`error`] - Error types and handling
//! - [`format`] - Human-readable output

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod format;
pub mod logging;
pub mod model;
pub mod remote;
pub mod storage;
pub mod sync;

pub use error::{Result, SyncError};
