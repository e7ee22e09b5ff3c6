//! Workspaces of git worktrees with managed terminal sessions.
//!
//! A workspace is a directory holding one worktree per repo plus a
//! `workset.yaml` manifest; a global registry maps workspace names to those
//! directories. The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (data model, alias merge, session
//!   names, safety aggregation, containment, hook manifests). No I/O.
//! - **[`io`]**: Side-effecting collaborators behind traits (process runner,
//!   git, registry and manifest stores, source hosting) so tests can fake them.
//!
//! Orchestration modules ([`recover`], [`safety`], [`session`], [`hooks`],
//! [`groups`], [`workspaces`]) coordinate core logic with I/O to implement CLI
//! commands.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod groups;
pub mod hooks;
pub mod io;
pub mod logging;
pub mod recover;
pub mod safety;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workspaces;
