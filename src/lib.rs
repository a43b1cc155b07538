//! `sed-prep` library crate.
//!
//! The binary (`sed`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the survey, reddening and engine collaborators can be swapped for fakes
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod engine;
pub mod error;
pub mod io;
pub mod photometry;
pub mod report;
pub mod settings;
