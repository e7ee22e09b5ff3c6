//! Deterministic, pure logic shared by the workset commands.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod backend;
pub mod groups;
pub mod hooks;
pub mod merge;
pub mod paths;
pub mod policy;
pub mod safety;
pub mod session_name;
pub mod types;
