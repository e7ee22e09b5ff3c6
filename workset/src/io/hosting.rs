//! Source-hosting client used to read hook manifests from remote repos.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use tracing::{debug, instrument};

const GITHUB_HOST: &str = "github.com";
const GITHUB_API: &str = "https://api.github.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Reads single files from a hosted repository.
pub trait SourceHost {
    /// Content of `path` at `git_ref` (empty means the repo's default branch).
    ///
    /// `Ok(None)` means the file does not exist; that is not an error.
    fn get_file_content(
        &self,
        host: &str,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<Vec<u8>>>;
}

/// GitHub (and GitHub Enterprise) contents API client. Unauthenticated.
pub struct GitHubHost {
    client: reqwest::blocking::Client,
}

impl GitHubHost {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("workset/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;
        Ok(Self { client })
    }
}

/// REST base for `host`: the public API for github.com, `/api/v3` otherwise.
pub fn api_base(host: &str) -> String {
    if host.is_empty() || host.eq_ignore_ascii_case(GITHUB_HOST) {
        GITHUB_API.to_string()
    } else {
        format!("https://{host}/api/v3")
    }
}

impl SourceHost for GitHubHost {
    #[instrument(skip_all, fields(host = %host, owner = %owner, repo = %repo, path = %path, git_ref = %git_ref))]
    fn get_file_content(
        &self,
        host: &str,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<Vec<u8>>> {
        let url = format!(
            "{}/repos/{owner}/{repo}/contents/{}",
            api_base(host),
            path.trim_start_matches('/')
        );
        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github.raw");
        if !git_ref.is_empty() {
            request = request.query(&[("ref", git_ref)]);
        }
        let resp = request.send().with_context(|| format!("GET {url}"))?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            debug!("file not found");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(anyhow!("GET {url}: HTTP {status}"));
        }
        let body = resp.bytes().with_context(|| format!("read body of {url}"))?;
        Ok(Some(body.to_vec()))
    }
}
