//! ws-toolkit: workspace management over a single SQLite database
//!
//! Ideas, proposals, todos, wiki pages, tools, sessions, quality tracking,
//! maintenance and backups, driven by the `ws` command-line front end.

pub mod automation;
pub mod backup;
pub mod cli;
pub mod collab;
pub mod config;
pub mod dedup;
pub mod domain;
pub mod error;
pub mod evolution;
pub mod health;
pub mod ideas;
pub mod knowledge;
pub mod maintenance;
pub mod process;
pub mod proposals;
pub mod quality;
pub mod sessions;
pub mod store;
pub mod todos;
pub mod tools;
pub mod wiki;
pub mod workflow;
