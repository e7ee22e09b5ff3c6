//! Workspaces of git worktrees with managed terminal sessions.
//!
//! Thin CLI over the orchestration modules of the `workset` library. Results
//! print as plain text (or JSON with `--json` on listings); failures exit with
//! a code from [`workset::exit_codes`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use workset::core::policy::FailurePolicy;
use workset::error::unsafe_details;
use workset::hooks::{self, DenyAll, TrustedRepos};
use workset::io::config::{default_config_path, load_registry};
use workset::io::git::CliGit;
use workset::io::hosting::GitHubHost;
use workset::io::process::SystemRunner;
use workset::recover::{RecoverOptions, recover};
use workset::safety::{
    DeleteWorkspaceOptions, RemoveRepoOptions, SafetyTarget, check_safety, delete_workspace,
    remove_repo,
};
use workset::session::{SessionRequest, SessionScope, StartRequest};
use workset::{exit_codes, groups, logging, session, workspaces};

#[derive(Parser)]
#[command(
    name = "workset",
    version,
    about = "Workspaces of git worktrees with managed terminal sessions"
)]
struct Cli {
    /// Registry file (default: $WORKSET_REGISTRY or ~/.workset/config.yaml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Re-register workspaces from manifests found under a root directory.
    Recover {
        /// Directory to scan (default: defaults.workspace_root).
        #[arg(long)]
        root: Option<String>,
        /// Fill empty repo alias fields from local clones.
        #[arg(long)]
        rebuild_repos: bool,
        /// Report without saving the registry.
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        json: bool,
    },
    #[command(subcommand)]
    Workspace(WorkspaceCommand),
    #[command(subcommand)]
    Repo(RepoCommand),
    #[command(subcommand)]
    Session(SessionCommand),
    #[command(subcommand)]
    Hooks(HooksCommand),
    #[command(subcommand)]
    Group(GroupCommand),
}

#[derive(Args, Clone, Default)]
struct WorkspaceArg {
    /// Workspace name (default: defaults.workspace).
    #[arg(short, long, default_value = "")]
    workspace: String,
}

#[derive(Subcommand)]
enum WorkspaceCommand {
    List {
        /// Include archived workspaces.
        #[arg(long)]
        all: bool,
        #[arg(long)]
        json: bool,
    },
    /// Register an existing directory as a workspace.
    Register { name: String, path: PathBuf },
    /// Report dirty, unmerged, and unpushed worktrees.
    Safety {
        #[command(flatten)]
        target: WorkspaceArg,
        #[arg(long)]
        json: bool,
    },
    /// Unregister a workspace; `--delete-files` also removes it from disk.
    Delete {
        #[command(flatten)]
        target: WorkspaceArg,
        #[arg(long)]
        delete_files: bool,
        /// Confirm an irreversible deletion.
        #[arg(long)]
        yes: bool,
        /// Proceed despite unsafe worktrees.
        #[arg(long)]
        force: bool,
    },
    Archive {
        name: String,
        #[arg(long, default_value = "")]
        reason: String,
    },
    Unarchive {
        name: String,
    },
    Pin {
        name: String,
        #[arg(long)]
        order: Option<u32>,
    },
    Unpin {
        name: String,
    },
}

#[derive(Subcommand)]
enum RepoCommand {
    /// Drop a repo from a workspace.
    Remove {
        #[command(flatten)]
        target: WorkspaceArg,
        repo: String,
        /// Also delete the repo's worktree.
        #[arg(long)]
        delete_worktree: bool,
        #[arg(long)]
        yes: bool,
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum SessionCommand {
    Start {
        #[command(flatten)]
        target: WorkspaceArg,
        #[arg(long, default_value = "")]
        name: String,
        /// auto, tmux, screen, or exec (default: defaults.session_backend).
        #[arg(long, default_value = "")]
        backend: String,
        #[arg(long)]
        attach: bool,
        /// Run an exec session attached to this terminal.
        #[arg(long)]
        interactive: bool,
        /// Command to run (default: $SHELL for exec, the backend's shell otherwise).
        #[arg(last = true)]
        command: Vec<String>,
    },
    Attach {
        #[command(flatten)]
        target: WorkspaceArg,
        #[arg(default_value = "")]
        name: String,
        /// Backend to use when the record has none.
        #[arg(long, default_value = "")]
        backend: String,
    },
    Stop {
        #[command(flatten)]
        target: WorkspaceArg,
        #[arg(default_value = "")]
        name: String,
        #[arg(long, default_value = "")]
        backend: String,
        /// Drop a record that cannot be stopped.
        #[arg(long)]
        force: bool,
    },
    List {
        #[command(flatten)]
        target: WorkspaceArg,
        #[arg(long)]
        json: bool,
    },
    Show {
        #[command(flatten)]
        target: WorkspaceArg,
        #[arg(default_value = "")]
        name: String,
        #[arg(long)]
        json: bool,
    },
    /// Stop every recorded session of the workspace.
    StopAll {
        #[command(flatten)]
        target: WorkspaceArg,
        /// Keep going past failures.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum HooksCommand {
    /// Show the hooks a repo declares, without running them.
    Discover {
        /// Repo alias, local path, or git URL.
        source: String,
        #[arg(long = "ref", default_value = "")]
        git_ref: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum GroupCommand {
    List {
        #[arg(long)]
        json: bool,
    },
    Show {
        name: String,
        #[arg(long)]
        json: bool,
    },
    Create {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    Delete {
        name: String,
    },
    Add {
        group: String,
        repo: String,
        #[arg(long, default_value = "")]
        base_remote: String,
        #[arg(long, default_value = "")]
        write_remote: String,
    },
    Remove {
        group: String,
        repo: String,
    },
    /// Append the group's repos to a workspace.
    Apply {
        #[command(flatten)]
        target: WorkspaceArg,
        group: String,
        /// Run hooks of these repos after their worktrees are created.
        #[arg(long = "trust", value_name = "REPO")]
        trusted: Vec<String>,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        if let Some(details) = unsafe_details(&err) {
            print_items("dirty", &details.dirty);
            print_items("unmerged", &details.unmerged);
            print_items("unpushed", &details.unpushed);
            print_warnings(&details.warnings);
        }
        std::process::exit(exit_codes::for_error(&err));
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let runner = SystemRunner::default();
    let git = CliGit::new(&runner);
    match cli.command {
        Command::Recover {
            root,
            rebuild_repos,
            dry_run,
            json,
        } => {
            let options = RecoverOptions {
                root: root.unwrap_or_default(),
                rebuild_repo_aliases: rebuild_repos,
                dry_run,
            };
            let report = recover(&config, &git, &options)?;
            if json {
                return print_json(&report);
            }
            println!("root: {}", report.root.display());
            print_items("recovered workspaces", &report.recovered_workspaces);
            print_items("recovered repo aliases", &report.recovered_repo_aliases);
            print_items("conflicts", &report.conflicts);
            print_warnings(&report.warnings);
            Ok(())
        }
        Command::Workspace(command) => run_workspace(&config, &git, &runner, command),
        Command::Repo(RepoCommand::Remove {
            target,
            repo,
            delete_worktree,
            yes,
            force,
        }) => {
            let outcome = remove_repo(
                &config,
                &git,
                &RemoveRepoOptions {
                    workspace: target.workspace,
                    repo,
                    delete_worktree,
                    confirmed: yes,
                    force,
                },
            )?;
            println!("removed {} from {}", outcome.repo, outcome.workspace);
            print_warnings(&outcome.warnings);
            Ok(())
        }
        Command::Session(command) => run_session(&config, &runner, command),
        Command::Hooks(HooksCommand::Discover {
            source,
            git_ref,
            json,
        }) => {
            let registry = load_registry(&config)?;
            let host = GitHubHost::new()?;
            let discovery = hooks::discover(&registry, &host, &source, &git_ref)?;
            if json {
                return print_json(&discovery);
            }
            if !discovery.exists {
                println!("no hooks declared in {}", discovery.resolved);
                return Ok(());
            }
            for hook in &discovery.hooks {
                println!("{}\t{}\t{}", hook.id, hook.on.join(","), hook.run.join(" "));
            }
            Ok(())
        }
        Command::Group(command) => run_group(&config, &git, &runner, command),
    }
}

fn run_workspace(
    config: &Path,
    git: &CliGit<&SystemRunner>,
    runner: &SystemRunner,
    command: WorkspaceCommand,
) -> Result<()> {
    match command {
        WorkspaceCommand::List { all, json } => {
            let entries = workspaces::list(&load_registry(config)?, all);
            if json {
                return print_json(&entries);
            }
            for entry in entries {
                let mut flags = Vec::new();
                if entry.pinned {
                    flags.push("pinned");
                }
                if entry.archived {
                    flags.push("archived");
                }
                println!("{}\t{}\t{}", entry.name, entry.path.display(), flags.join(","));
            }
            Ok(())
        }
        WorkspaceCommand::Register { name, path } => workspaces::register(config, &name, &path),
        WorkspaceCommand::Safety { target, json } => {
            let registry = load_registry(config)?;
            let workspace = workspaces::resolve(&registry, &target.workspace)?;
            let report = check_safety(git, &registry, &[SafetyTarget::Workspace(workspace.path)])?;
            if json {
                return print_json(&report);
            }
            if !report.is_risky() {
                println!("{}: safe to delete", workspace.name);
            }
            print_items("dirty", &report.dirty);
            print_items("unmerged", &report.unmerged);
            print_items("unpushed", &report.unpushed);
            print_warnings(&report.warnings);
            Ok(())
        }
        WorkspaceCommand::Delete {
            target,
            delete_files,
            yes,
            force,
        } => {
            let outcome = delete_workspace(
                config,
                git,
                runner,
                &DeleteWorkspaceOptions {
                    name: target.workspace,
                    delete_files,
                    confirmed: yes,
                    force,
                },
            )?;
            if outcome.deleted_files {
                println!("deleted {} ({})", outcome.name, outcome.path.display());
            } else {
                println!("unregistered {} (files kept at {})", outcome.name, outcome.path.display());
            }
            print_warnings(&outcome.warnings);
            Ok(())
        }
        WorkspaceCommand::Archive { name, reason } => workspaces::archive(config, &name, &reason),
        WorkspaceCommand::Unarchive { name } => workspaces::unarchive(config, &name),
        WorkspaceCommand::Pin { name, order } => workspaces::pin(config, &name, order),
        WorkspaceCommand::Unpin { name } => workspaces::unpin(config, &name),
    }
}

fn run_session(config: &Path, runner: &SystemRunner, command: SessionCommand) -> Result<()> {
    let registry = load_registry(config)?;
    let workspace_name = match &command {
        SessionCommand::Start { target, .. }
        | SessionCommand::Attach { target, .. }
        | SessionCommand::Stop { target, .. }
        | SessionCommand::List { target, .. }
        | SessionCommand::Show { target, .. }
        | SessionCommand::StopAll { target, .. } => target.workspace.clone(),
    };
    let workspace = workspaces::resolve(&registry, &workspace_name)?;
    let scope = SessionScope {
        workspace: &workspace.name,
        root: &workspace.path,
        defaults: &registry.defaults,
    };
    match command {
        SessionCommand::Start {
            name,
            backend,
            attach,
            interactive,
            command,
            ..
        } => {
            let outcome = session::start(
                runner,
                &scope,
                &StartRequest {
                    name,
                    backend,
                    command,
                    attach,
                    interactive,
                },
            )?;
            print_notice(outcome.notice.as_deref());
            if outcome.persisted {
                println!("started {} session {}", outcome.backend, outcome.name);
            }
            print_warnings(&outcome.warnings);
            workspaces::touch(config, &workspace.name)
        }
        SessionCommand::Attach { name, backend, .. } => {
            let outcome = session::attach(runner, &scope, &SessionRequest { name, backend })?;
            print_notice(outcome.notice.as_deref());
            print_warnings(&outcome.warnings);
            workspaces::touch(config, &workspace.name)
        }
        SessionCommand::Stop {
            name,
            backend,
            force,
            ..
        } => {
            let outcome = session::stop(runner, &scope, &SessionRequest { name, backend }, force)?;
            print_notice(outcome.notice.as_deref());
            if outcome.was_running {
                println!("stopped {}", outcome.name);
            } else {
                println!("{} was not running; record removed", outcome.name);
            }
            print_warnings(&outcome.warnings);
            Ok(())
        }
        SessionCommand::List { json, .. } => {
            let sessions = session::list(runner, &workspace.path)?;
            if json {
                return print_json(&sessions);
            }
            for status in sessions {
                let state = match (&status.error, status.running) {
                    (Some(error), _) => format!("unknown ({error})"),
                    (None, true) => "running".to_string(),
                    (None, false) => "stopped".to_string(),
                };
                println!("{}\t{}\t{state}", status.name, status.backend);
            }
            Ok(())
        }
        SessionCommand::Show { name, json, .. } => {
            let status = session::show(runner, &scope, &name)?;
            if json {
                return print_json(&status);
            }
            println!("name: {}", status.name);
            println!("backend: {}", status.backend);
            println!("running: {}", status.running);
            if !status.command.is_empty() {
                println!("command: {}", status.command.join(" "));
            }
            if !status.started_at.is_empty() {
                println!("started: {}", status.started_at);
            }
            if !status.last_attached.is_empty() {
                println!("last attached: {}", status.last_attached);
            }
            if let Some(error) = &status.error {
                println!("error: {error}");
            }
            Ok(())
        }
        SessionCommand::StopAll { force, .. } => {
            let report =
                session::stop_all(runner, &workspace.path, FailurePolicy::from_force(force))?;
            print_items("stopped", &report.stopped);
            print_items("not running", &report.not_running);
            print_warnings(&report.warnings);
            Ok(())
        }
    }
}

fn run_group(
    config: &Path,
    git: &CliGit<&SystemRunner>,
    runner: &SystemRunner,
    command: GroupCommand,
) -> Result<()> {
    match command {
        GroupCommand::List { json } => {
            let names = groups::list(config)?;
            if json {
                return print_json(&names);
            }
            for name in names {
                println!("{name}");
            }
            Ok(())
        }
        GroupCommand::Show { name, json } => {
            let group = groups::show(config, &name)?;
            if json {
                return print_json(&group);
            }
            if !group.description.is_empty() {
                println!("{}", group.description);
            }
            for member in &group.members {
                println!("{}\t{}", member.repo, member.remotes.base.name);
            }
            Ok(())
        }
        GroupCommand::Create { name, description } => groups::create(config, &name, &description),
        GroupCommand::Delete { name } => groups::delete(config, &name),
        GroupCommand::Add {
            group,
            repo,
            base_remote,
            write_remote,
        } => groups::add(config, &group, &repo, &base_remote, &write_remote),
        GroupCommand::Remove { group, repo } => groups::remove(config, &group, &repo),
        GroupCommand::Apply {
            target,
            group,
            trusted,
        } => {
            let outcome = if trusted.is_empty() {
                groups::apply(config, git, runner, &DenyAll, &target.workspace, &group)?
            } else {
                let trust = TrustedRepos::new(trusted);
                groups::apply(config, git, runner, &trust, &target.workspace, &group)?
            };
            print_items("added", &outcome.added);
            print_items("worktrees", &outcome.worktrees);
            print_warnings(&outcome.warnings);
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}

fn print_items(label: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("{label}:");
    for item in items {
        println!("  {item}");
    }
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        eprintln!("warning: {warning}");
    }
}

fn print_notice(notice: Option<&str>) {
    if let Some(notice) = notice {
        eprintln!("{notice}");
    }
}
