//! Session backend variants and the command lines each one issues.
//!
//! `auto` exists only as a [`BackendPreference`]; it is resolved to a concrete
//! [`Backend`] at the call boundary and never persisted as the resolved value.

use std::fmt;

use crate::error::WorksetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Tmux,
    Screen,
    /// Runs the command synchronously; leaves nothing to attach to or stop.
    Exec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendPreference {
    Auto,
    Fixed(Backend),
}

/// Order in which `auto` probes for an installed multiplexer.
pub const AUTO_ORDER: [Backend; 2] = [Backend::Tmux, Backend::Screen];

/// Parse a configured or requested backend name. Empty means `auto`.
pub fn parse_backend(value: &str) -> Result<BackendPreference, WorksetError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "auto" => Ok(BackendPreference::Auto),
        "tmux" => Ok(BackendPreference::Fixed(Backend::Tmux)),
        "screen" => Ok(BackendPreference::Fixed(Backend::Screen)),
        "exec" => Ok(BackendPreference::Fixed(Backend::Exec)),
        _ => Err(WorksetError::validation(format!(
            "unsupported session backend {value:?} (use auto, tmux, screen, exec)"
        ))),
    }
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tmux => "tmux",
            Self::Screen => "screen",
            Self::Exec => "exec",
        }
    }

    /// Executable that hosts the session, if any.
    pub fn program(self) -> Option<&'static str> {
        match self {
            Self::Tmux => Some("tmux"),
            Self::Screen => Some("screen"),
            Self::Exec => None,
        }
    }

    /// Whether sessions of this backend outlive the starting call.
    pub fn is_persistent(self) -> bool {
        !matches!(self, Self::Exec)
    }

    /// Arguments that create a detached session rooted at `root`.
    ///
    /// screen has no working-directory flag, so the caller runs it with `root`
    /// as the process working directory.
    pub fn start_args(self, name: &str, root: &str, command: &[String]) -> Vec<String> {
        let mut args = match self {
            Self::Tmux => strings(&["new-session", "-d", "-s", name, "-c", root]),
            Self::Screen => strings(&["-dmS", name]),
            Self::Exec => Vec::new(),
        };
        args.extend(command.iter().cloned());
        args
    }

    /// Arguments that attach the current terminal. `nested` is true when
    /// already running inside a client of the same multiplexer.
    pub fn attach_args(self, name: &str, nested: bool) -> Vec<String> {
        match (self, nested) {
            (Self::Tmux, false) => strings(&["attach", "-t", name]),
            (Self::Tmux, true) => strings(&["switch-client", "-t", name]),
            (Self::Screen, false) => strings(&["-r", name]),
            (Self::Screen, true) => strings(&["-x", name]),
            (Self::Exec, _) => Vec::new(),
        }
    }

    pub fn stop_args(self, name: &str) -> Vec<String> {
        match self {
            Self::Tmux => strings(&["kill-session", "-t", name]),
            Self::Screen => strings(&["-S", name, "-X", "quit"]),
            Self::Exec => Vec::new(),
        }
    }

    /// Liveness probe. tmux answers through its exit code; screen lists
    /// sessions and the output is matched with [`screen_has_session`].
    pub fn probe_args(self, name: &str) -> Vec<String> {
        match self {
            Self::Tmux => strings(&["has-session", "-t", name]),
            Self::Screen => strings(&["-ls"]),
            Self::Exec => Vec::new(),
        }
    }

    /// Environment variable set by the multiplexer inside its own clients.
    pub fn nested_env_var(self) -> Option<&'static str> {
        match self {
            Self::Tmux => Some("TMUX"),
            Self::Screen => Some("STY"),
            Self::Exec => None,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Match a session name in `screen -ls` output (`<pid>.<name>\t(Detached)`).
pub fn screen_has_session(output: &str, name: &str) -> bool {
    let suffix = format!(".{name}");
    output
        .lines()
        .map(|line| line.trim().split('\t').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .any(|line| line == name || line.ends_with(&suffix))
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}
