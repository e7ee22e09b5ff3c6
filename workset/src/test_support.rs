//! Test doubles for the I/O collaborators plus fixture helpers.
//!
//! Fakes use interior mutability so they can be shared by reference the same
//! way the real collaborators are.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

use crate::core::types::{RepoConfig, WorkspaceManifest, WorkspaceRef};
use crate::io::config::update_registry;
use crate::io::git::{GitClient, StatusSummary, WorktreeRemoval};
use crate::io::hosting::SourceHost;
use crate::io::manifest::save_manifest;
use crate::io::process::{CommandOutput, CommandSpec, ProcessRunner};

enum Scripted {
    Output(CommandOutput),
    Fail(String),
}

/// Scripted [`ProcessRunner`] keyed by the command line (`program arg ...`).
///
/// Unscripted commands succeed with empty output. Every call is recorded.
#[derive(Default)]
pub struct FakeRunner {
    scripted: RefCell<HashMap<String, Scripted>>,
    missing: RefCell<HashSet<String>>,
    calls: RefCell<Vec<CommandSpec>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit with `code` and `stdout`.
    pub fn respond(&self, command: &str, code: i32, stdout: &str) {
        self.scripted.borrow_mut().insert(
            command.to_string(),
            Scripted::Output(CommandOutput {
                exit_code: code,
                stdout: stdout.to_string(),
                stderr: String::new(),
            }),
        );
    }

    /// Exit with `code` and `stderr`.
    pub fn respond_err(&self, command: &str, code: i32, stderr: &str) {
        self.scripted.borrow_mut().insert(
            command.to_string(),
            Scripted::Output(CommandOutput {
                exit_code: code,
                stdout: String::new(),
                stderr: stderr.to_string(),
            }),
        );
    }

    /// Fail to execute at all (the program could not be run).
    pub fn fail(&self, command: &str, message: &str) {
        self.scripted
            .borrow_mut()
            .insert(command.to_string(), Scripted::Fail(message.to_string()));
    }

    /// Make `look_path(program)` fail.
    pub fn without_program(&self, program: &str) {
        self.missing.borrow_mut().insert(program.to_string());
    }

    /// Recorded command lines, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().iter().map(CommandSpec::display).collect()
    }

    pub fn specs(&self) -> Vec<CommandSpec> {
        self.calls.borrow().clone()
    }

    pub fn was_called(&self, command: &str) -> bool {
        self.calls().iter().any(|call| call == command)
    }
}

impl ProcessRunner for FakeRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.calls.borrow_mut().push(spec.clone());
        match self.scripted.borrow().get(&spec.display()) {
            Some(Scripted::Output(output)) => Ok(output.clone()),
            Some(Scripted::Fail(message)) => Err(anyhow!("{message}")),
            None => Ok(CommandOutput::default()),
        }
    }

    fn look_path(&self, program: &str) -> Result<PathBuf> {
        if self.missing.borrow().contains(program) {
            return Err(anyhow!("{program} not found on PATH"));
        }
        Ok(PathBuf::from("/usr/bin").join(program))
    }
}

/// One repository as seen by [`FakeGit`].
#[derive(Debug, Clone, Default)]
pub struct FakeRepo {
    remotes: Vec<(String, Vec<String>)>,
    branch: Option<String>,
    dirty: bool,
    refs: HashSet<String>,
    ancestors: HashSet<(String, String)>,
    content_merged: HashSet<(String, String)>,
    failures: HashMap<&'static str, String>,
}

impl FakeRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remote(mut self, name: &str, url: &str) -> Self {
        self.remotes.push((name.to_string(), vec![url.to_string()]));
        self
    }

    pub fn branch(mut self, name: &str) -> Self {
        self.branch = Some(name.to_string());
        self
    }

    pub fn dirty(mut self) -> Self {
        self.dirty = true;
        self
    }

    pub fn reference(mut self, name: &str) -> Self {
        self.refs.insert(name.to_string());
        self
    }

    /// Record `ancestor` as reachable from `descendant`.
    pub fn ancestor(mut self, ancestor: &str, descendant: &str) -> Self {
        self.ancestors
            .insert((ancestor.to_string(), descendant.to_string()));
        self
    }

    pub fn content_merged(mut self, branch: &str, base: &str) -> Self {
        self.content_merged
            .insert((branch.to_string(), base.to_string()));
        self
    }

    /// Make the named [`GitClient`] method fail for this repo.
    pub fn failing(mut self, method: &'static str, message: &str) -> Self {
        self.failures.insert(method, message.to_string());
        self
    }

    fn check(&self, method: &'static str) -> Result<()> {
        match self.failures.get(method) {
            Some(message) => Err(anyhow!("{message}")),
            None => Ok(()),
        }
    }
}

/// In-memory [`GitClient`] keyed by repository path.
#[derive(Default)]
pub struct FakeGit {
    repos: RefCell<HashMap<PathBuf, FakeRepo>>,
    worktrees: RefCell<HashSet<PathBuf>>,
    removed: RefCell<Vec<PathBuf>>,
    added: RefCell<Vec<(PathBuf, PathBuf, String)>>,
}

impl FakeGit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repo(self, path: impl Into<PathBuf>, repo: FakeRepo) -> Self {
        self.repos.borrow_mut().insert(path.into(), repo);
        self
    }

    /// Register `path` as a linked worktree git knows about.
    pub fn with_worktree(self, path: impl Into<PathBuf>) -> Self {
        self.worktrees.borrow_mut().insert(path.into());
        self
    }

    pub fn removed(&self) -> Vec<PathBuf> {
        self.removed.borrow().clone()
    }

    /// `(repo, worktree path, branch)` for every `worktree_add` call.
    pub fn added(&self) -> Vec<(PathBuf, PathBuf, String)> {
        self.added.borrow().clone()
    }

    fn repo(&self, path: &Path) -> Result<FakeRepo> {
        self.repos
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("fatal: not a git repository: {}", path.display()))
    }
}

impl GitClient for FakeGit {
    fn remote_names(&self, repo: &Path) -> Result<Vec<String>> {
        let repo = self.repo(repo)?;
        repo.check("remote_names")?;
        Ok(repo.remotes.iter().map(|(name, _)| name.clone()).collect())
    }

    fn remote_urls(&self, repo: &Path, remote: &str) -> Result<Vec<String>> {
        let repo = self.repo(repo)?;
        repo.check("remote_urls")?;
        repo.remotes
            .iter()
            .find(|(name, _)| name == remote)
            .map(|(_, urls)| urls.clone())
            .ok_or_else(|| anyhow!("No such remote '{remote}'"))
    }

    fn current_branch(&self, repo: &Path) -> Result<Option<String>> {
        let repo = self.repo(repo)?;
        repo.check("current_branch")?;
        Ok(repo.branch.clone())
    }

    fn status(&self, path: &Path) -> Result<StatusSummary> {
        let Ok(repo) = self.repo(path) else {
            return Ok(StatusSummary {
                missing: true,
                ..StatusSummary::default()
            });
        };
        repo.check("status")?;
        Ok(StatusSummary {
            dirty: repo.dirty,
            ..StatusSummary::default()
        })
    }

    fn reference_exists(&self, repo: &Path, reference: &str) -> Result<bool> {
        let repo = self.repo(repo)?;
        repo.check("reference_exists")?;
        Ok(repo.refs.contains(reference))
    }

    fn is_ancestor(&self, repo: &Path, ancestor: &str, descendant: &str) -> Result<bool> {
        let repo = self.repo(repo)?;
        repo.check("is_ancestor")?;
        Ok(ancestor == descendant
            || repo
                .ancestors
                .contains(&(ancestor.to_string(), descendant.to_string())))
    }

    fn is_content_merged(&self, repo: &Path, branch: &str, base: &str) -> Result<bool> {
        let repo = self.repo(repo)?;
        repo.check("is_content_merged")?;
        Ok(repo
            .content_merged
            .contains(&(branch.to_string(), base.to_string())))
    }

    fn remote_exists(&self, repo: &Path, remote: &str) -> Result<bool> {
        Ok(self.remote_names(repo)?.iter().any(|name| name == remote))
    }

    fn worktree_add(&self, repo: &Path, path: &Path, branch: &str) -> Result<()> {
        self.repo(repo)?.check("worktree_add")?;
        fs::create_dir_all(path)?;
        self.added
            .borrow_mut()
            .push((repo.to_path_buf(), path.to_path_buf(), branch.to_string()));
        Ok(())
    }

    fn worktree_remove(&self, repo: &Path, worktree: &Path, _force: bool) -> Result<WorktreeRemoval> {
        if let Ok(fake) = self.repo(repo) {
            fake.check("worktree_remove")?;
        }
        if !self.worktrees.borrow_mut().remove(worktree) {
            return Ok(WorktreeRemoval::NotFound);
        }
        if worktree.exists() {
            fs::remove_dir_all(worktree)?;
        }
        self.removed.borrow_mut().push(worktree.to_path_buf());
        Ok(WorktreeRemoval::Removed)
    }
}

/// In-memory [`SourceHost`] keyed by `owner/repo/path`.
#[derive(Default)]
pub struct FakeHost {
    files: HashMap<String, Vec<u8>>,
    error: Option<String>,
    requests: RefCell<Vec<String>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, owner: &str, repo: &str, path: &str, content: &str) -> Self {
        self.files
            .insert(format!("{owner}/{repo}/{path}"), content.as_bytes().to_vec());
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.error = Some(message.to_string());
        self
    }

    /// `host owner/repo/path@ref` for each request.
    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }
}

impl SourceHost for FakeHost {
    fn get_file_content(
        &self,
        host: &str,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<Vec<u8>>> {
        self.requests
            .borrow_mut()
            .push(format!("{host} {owner}/{repo}/{path}@{git_ref}"));
        if let Some(message) = &self.error {
            return Err(anyhow!("{message}"));
        }
        Ok(self.files.get(&format!("{owner}/{repo}/{path}")).cloned())
    }
}

/// Write `root/workset.yaml` naming the workspace and its repos.
pub fn write_manifest(root: &Path, name: &str, repos: &[&str]) -> WorkspaceManifest {
    let manifest = WorkspaceManifest {
        name: name.to_string(),
        repos: repos
            .iter()
            .map(|repo| RepoConfig {
                name: (*repo).to_string(),
                repo_dir: (*repo).to_string(),
                ..RepoConfig::default()
            })
            .collect(),
    };
    fs::create_dir_all(root).expect("create workspace dir");
    save_manifest(root, &manifest).expect("write manifest");
    manifest
}

/// Register `name → path` in the registry at `config_path`.
pub fn register_workspace(config_path: &Path, name: &str, path: &Path) {
    update_registry(config_path, |registry| {
        registry.workspaces.insert(
            name.to_string(),
            WorkspaceRef {
                path: path.to_path_buf(),
                ..WorkspaceRef::default()
            },
        );
        Ok(())
    })
    .expect("register workspace");
}

/// Create `dir` as a linked worktree whose `.git` file points into `common/worktrees/<name>`.
pub fn fake_linked_worktree(dir: &Path, common: &Path) {
    let name = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let admin = common.join("worktrees").join(&name);
    fs::create_dir_all(&admin).expect("create admin dir");
    fs::write(admin.join("commondir"), "../..\n").expect("write commondir");
    fs::create_dir_all(dir).expect("create worktree dir");
    fs::write(dir.join(".git"), format!("gitdir: {}\n", admin.display())).expect("write .git");
}
