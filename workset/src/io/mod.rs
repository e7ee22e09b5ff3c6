//! I/O collaborators for workset commands.

pub mod config;
pub mod git;
pub mod hosting;
pub mod manifest;
pub mod process;
pub mod state;
