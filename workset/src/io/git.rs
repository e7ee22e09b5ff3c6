//! Git query client.
//!
//! Recovery, the safety gate, and worktree cleanup need a handful of read
//! queries plus worktree add/remove. They go through [`GitClient`] so tests can
//! substitute a fake; [`CliGit`] shells out to `git` through a
//! [`ProcessRunner`] and therefore honors the runner's cancellation token.

use std::path::Path;

use anyhow::{Result, anyhow};
use tracing::{debug, instrument};

use crate::io::process::{CommandOutput, CommandSpec, ProcessRunner};

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSummary {
    pub dirty: bool,
    /// Directory absent or not a git work tree.
    pub missing: bool,
    pub entries: Vec<StatusEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorktreeRemoval {
    Removed,
    /// git does not know the path as a linked worktree.
    NotFound,
}

pub trait GitClient {
    fn remote_names(&self, repo: &Path) -> Result<Vec<String>>;
    /// All URLs configured for `remote`; errors when there are none.
    fn remote_urls(&self, repo: &Path, remote: &str) -> Result<Vec<String>>;
    /// Current branch, or `None` on a detached or unborn HEAD.
    fn current_branch(&self, repo: &Path) -> Result<Option<String>>;
    fn status(&self, path: &Path) -> Result<StatusSummary>;
    fn reference_exists(&self, repo: &Path, reference: &str) -> Result<bool>;
    fn is_ancestor(&self, repo: &Path, ancestor: &str, descendant: &str) -> Result<bool>;
    /// True when every commit of `branch` has an equivalent patch in `base`
    /// (squash or rebase merges).
    fn is_content_merged(&self, repo: &Path, branch: &str, base: &str) -> Result<bool>;
    fn remote_exists(&self, repo: &Path, remote: &str) -> Result<bool>;
    /// Check out `branch` (created from HEAD when missing) at `path`.
    fn worktree_add(&self, repo: &Path, path: &Path, branch: &str) -> Result<()>;
    fn worktree_remove(&self, repo: &Path, worktree: &Path, force: bool) -> Result<WorktreeRemoval>;
}

/// [`GitClient`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct CliGit<R> {
    runner: R,
}

impl<R: ProcessRunner> CliGit<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    fn run(&self, repo: &Path, args: &[&str]) -> Result<CommandOutput> {
        let spec = CommandSpec::new("git")
            .args(["-C".to_string(), repo.display().to_string()])
            .args(args.iter().copied());
        self.runner.run(&spec)
    }

    fn run_checked(&self, repo: &Path, args: &[&str]) -> Result<CommandOutput> {
        let output = self.run(repo, args)?;
        if !output.success() {
            return Err(anyhow!("git {} failed: {}", args.join(" "), output.message()));
        }
        Ok(output)
    }

    fn run_capture(&self, repo: &Path, args: &[&str]) -> Result<String> {
        Ok(self.run_checked(repo, args)?.stdout)
    }
}

impl<R: ProcessRunner> GitClient for CliGit<R> {
    fn remote_names(&self, repo: &Path) -> Result<Vec<String>> {
        let out = self.run_capture(repo, &["remote"])?;
        Ok(non_empty_lines(&out))
    }

    fn remote_urls(&self, repo: &Path, remote: &str) -> Result<Vec<String>> {
        let out = self.run_capture(repo, &["remote", "get-url", "--all", remote])?;
        let urls = non_empty_lines(&out);
        if urls.is_empty() {
            return Err(anyhow!("remote {remote} has no URLs configured"));
        }
        Ok(urls)
    }

    #[instrument(skip_all, fields(repo = %repo.display()))]
    fn current_branch(&self, repo: &Path) -> Result<Option<String>> {
        let output = self.run(repo, &["rev-parse", "--abbrev-ref", "HEAD"])?;
        if !output.success() {
            if is_missing_ref(&output.stderr) {
                return Ok(None);
            }
            return Err(anyhow!(
                "git rev-parse --abbrev-ref HEAD failed: {}",
                output.message()
            ));
        }
        let name = output.stdout.trim();
        if name.is_empty() || name == "HEAD" {
            debug!("detached or unborn HEAD");
            return Ok(None);
        }
        Ok(Some(name.to_string()))
    }

    fn status(&self, path: &Path) -> Result<StatusSummary> {
        if !path.exists() {
            return Ok(StatusSummary {
                missing: true,
                ..StatusSummary::default()
            });
        }
        let output = self.run(path, &["status", "--porcelain=v1", "-uall"])?;
        if !output.success() {
            if output.stderr.contains("not a git repository") {
                return Ok(StatusSummary {
                    missing: true,
                    ..StatusSummary::default()
                });
            }
            return Err(anyhow!("git status failed: {}", output.message()));
        }
        let entries = output
            .stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(parse_status_line)
            .collect::<Result<Vec<_>>>()?;
        Ok(StatusSummary {
            dirty: !entries.is_empty(),
            missing: false,
            entries,
        })
    }

    fn reference_exists(&self, repo: &Path, reference: &str) -> Result<bool> {
        let output = self.run(repo, &["show-ref", "--verify", "--quiet", reference])?;
        match output.exit_code {
            0 => Ok(true),
            1 => Ok(false),
            _ if is_missing_ref(&output.stderr) => Ok(false),
            code => Err(anyhow!(
                "git show-ref {reference} failed (exit {code}): {}",
                output.message()
            )),
        }
    }

    fn is_ancestor(&self, repo: &Path, ancestor: &str, descendant: &str) -> Result<bool> {
        let output = self.run(repo, &["merge-base", "--is-ancestor", ancestor, descendant])?;
        match output.exit_code {
            0 => Ok(true),
            1 => Ok(false),
            code => Err(anyhow!(
                "git merge-base --is-ancestor {ancestor} {descendant} failed (exit {code}): {}",
                output.message()
            )),
        }
    }

    fn is_content_merged(&self, repo: &Path, branch: &str, base: &str) -> Result<bool> {
        let out = self.run_capture(repo, &["cherry", base, branch])?;
        Ok(!out.lines().any(|line| line.starts_with('+')))
    }

    fn remote_exists(&self, repo: &Path, remote: &str) -> Result<bool> {
        Ok(self.remote_names(repo)?.iter().any(|name| name == remote))
    }

    #[instrument(skip_all, fields(repo = %repo.display(), path = %path.display(), branch = %branch))]
    fn worktree_add(&self, repo: &Path, path: &Path, branch: &str) -> Result<()> {
        let target = path.display().to_string();
        if self.reference_exists(repo, &format!("refs/heads/{branch}"))? {
            self.run_checked(repo, &["worktree", "add", &target, branch])?;
        } else {
            self.run_checked(repo, &["worktree", "add", "-b", branch, &target])?;
        }
        Ok(())
    }

    #[instrument(skip_all, fields(repo = %repo.display(), worktree = %worktree.display(), force = force))]
    fn worktree_remove(&self, repo: &Path, worktree: &Path, force: bool) -> Result<WorktreeRemoval> {
        let target = worktree.display().to_string();
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(&target);
        let output = self.run(repo, &args)?;
        if output.success() {
            return Ok(WorktreeRemoval::Removed);
        }
        if output.stderr.contains("not a working tree") {
            debug!("worktree unknown to git");
            return Ok(WorktreeRemoval::NotFound);
        }
        Err(anyhow!(
            "git {} failed: {}",
            args.join(" "),
            output.message()
        ))
    }
}

fn non_empty_lines(out: &str) -> Vec<String> {
    out.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_missing_ref(stderr: &str) -> bool {
    stderr.contains("unknown revision")
        || stderr.contains("ambiguous argument 'HEAD'")
        || stderr.contains("not a valid ref")
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeRunner;

    #[test]
    fn parses_untracked_line() {
        let e = parse_status_line("?? foo.txt").expect("parse");
        assert_eq!(
            e,
            StatusEntry {
                code: "??".to_string(),
                path: "foo.txt".to_string()
            }
        );
    }

    #[test]
    fn parses_rename_line_uses_new_path() {
        let e = parse_status_line("R  old.txt -> new.txt").expect("parse");
        assert_eq!(e.path, "new.txt");
    }

    #[test]
    fn remote_names_skip_blank_lines() {
        let runner = FakeRunner::new();
        runner.respond("git -C /r remote", 0, "origin\n\nupstream\n");
        let git = CliGit::new(&runner);
        let names = git.remote_names(Path::new("/r")).expect("names");
        assert_eq!(names, vec!["origin".to_string(), "upstream".to_string()]);
    }

    #[test]
    fn detached_head_is_none() {
        let runner = FakeRunner::new();
        runner.respond("git -C /r rev-parse --abbrev-ref HEAD", 0, "HEAD\n");
        let git = CliGit::new(&runner);
        assert_eq!(git.current_branch(Path::new("/r")).expect("branch"), None);
    }

    #[test]
    fn ancestor_exit_one_means_false() {
        let runner = FakeRunner::new();
        runner.respond("git -C /r merge-base --is-ancestor a b", 1, "");
        runner.respond("git -C /r merge-base --is-ancestor b a", 128, "");
        let git = CliGit::new(&runner);
        assert!(!git.is_ancestor(Path::new("/r"), "a", "b").expect("ancestor"));
        assert!(git.is_ancestor(Path::new("/r"), "b", "a").is_err());
    }

    #[test]
    fn cherry_plus_lines_mean_unmerged() {
        let runner = FakeRunner::new();
        runner.respond("git -C /r cherry main feature", 0, "- abc\n+ def\n");
        runner.respond("git -C /r cherry main squashed", 0, "- abc\n");
        let git = CliGit::new(&runner);
        assert!(!git.is_content_merged(Path::new("/r"), "feature", "main").expect("cherry"));
        assert!(git.is_content_merged(Path::new("/r"), "squashed", "main").expect("cherry"));
    }

    #[test]
    fn unknown_worktree_is_not_found() {
        let runner = FakeRunner::new();
        runner.respond_err(
            "git -C /r worktree remove /w/api",
            128,
            "fatal: '/w/api' is not a working tree",
        );
        let git = CliGit::new(&runner);
        let removal = git
            .worktree_remove(Path::new("/r"), Path::new("/w/api"), false)
            .expect("remove");
        assert_eq!(removal, WorktreeRemoval::NotFound);
    }
}
