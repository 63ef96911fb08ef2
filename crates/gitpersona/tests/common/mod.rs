//! Shared helpers for gitpersona integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use gitpersona::process::{SSH_ADD, SSH_KEYGEN};
use gitpersona::{
    CommandAllowlist, Error, ProcessOutput, ProcessRunner, Result, RunOptions, SecureProcessRunner,
};
use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex};

/// Whether a `git` binary is on PATH.
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// `git init` a fresh repository at `dir`.
pub fn init_repo(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    let status = Command::new("git")
        .args(["init", "-q"])
        .current_dir(dir)
        .status()
        .unwrap();
    assert!(status.success(), "git init failed in {}", dir.display());
}

/// Run git in `dir` with a throwaway committer identity, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args([
            "-c",
            "user.name=Fixture",
            "-c",
            "user.email=fixture@example.com",
            "-c",
            "protocol.file.allow=always",
        ])
        .args(args)
        .current_dir(dir)
        .status()
        .unwrap();
    assert!(status.success(), "git {args:?} failed in {}", dir.display());
}

/// Create a one-commit repository at `source` and add it to `parent` as the
/// submodule `name`.
pub fn add_submodule(parent: &Path, source: &Path, name: &str) {
    init_repo(source);
    git(source, &["commit", "-q", "--allow-empty", "-m", "init"]);
    let source = source.to_string_lossy().into_owned();
    git(parent, &["submodule", "add", "-q", &source, name]);
}

/// Read a key straight from `.git/config`, bypassing the library.
pub fn local_config(dir: &Path, key: &str) -> Option<String> {
    let out = Command::new("git")
        .args(["config", "--local", key])
        .current_dir(dir)
        .output()
        .unwrap();
    out.status
        .success()
        .then(|| String::from_utf8_lossy(&out.stdout).trim_end().to_string())
}

/// In-process SSH agent.
///
/// Handles `ssh-add -l`, `ssh-add [--apple-use-keychain] <path>`,
/// `ssh-add -d <path>` and `ssh-keygen -lf <path>` with the exit codes of the
/// real tools. Everything else is delegated to a [`SecureProcessRunner`].
/// Every invocation is checked against the allowlist first.
pub struct FakeAgent {
    loaded: Mutex<Vec<String>>,
    running: bool,
    allowlist: CommandAllowlist,
    inner: SecureProcessRunner,
}

impl FakeAgent {
    pub fn new() -> Self {
        Self {
            loaded: Mutex::new(Vec::new()),
            running: true,
            allowlist: CommandAllowlist::new(),
            inner: SecureProcessRunner::new(),
        }
    }

    /// An agent that cannot be reached (`ssh-add` exits 2).
    pub fn stopped() -> Self {
        Self {
            running: false,
            ..Self::new()
        }
    }

    pub fn with_loaded(self, path: &str) -> Self {
        self.loaded.lock().unwrap().push(path.to_string());
        self
    }

    pub fn loaded(&self) -> Vec<String> {
        self.loaded.lock().unwrap().clone()
    }

    fn fail(code: i32, stderr: &str) -> Result<ProcessOutput> {
        Err(Error::ExecutionFailure {
            command: SSH_ADD.to_string(),
            code: Some(code),
            stderr: stderr.to_string(),
        })
    }

    fn ssh_add(&self, args: &[String]) -> Result<ProcessOutput> {
        if !self.running {
            return Self::fail(2, "Could not open a connection to your authentication agent.");
        }
        let mut loaded = self.loaded.lock().unwrap();
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        match argv.as_slice() {
            ["-l"] => {
                if loaded.is_empty() {
                    return Self::fail(1, "The agent has no identities.");
                }
                let stdout = loaded
                    .iter()
                    .enumerate()
                    .map(|(i, path)| format!("256 SHA256:fake{i} {path} (ED25519)\n"))
                    .collect();
                Ok(ProcessOutput {
                    stdout,
                    stderr: String::new(),
                })
            }
            ["-d", path] => match loaded.iter().position(|p| p.as_str() == *path) {
                Some(idx) => {
                    loaded.remove(idx);
                    Ok(ProcessOutput::default())
                }
                None => Self::fail(1, "Could not remove identity"),
            },
            [path] | ["--apple-use-keychain", path] => {
                if !loaded.iter().any(|p| p.as_str() == *path) {
                    loaded.push(path.to_string());
                }
                Ok(ProcessOutput::default())
            }
            _ => Self::fail(1, "unexpected arguments"),
        }
    }
}

#[async_trait]
impl ProcessRunner for FakeAgent {
    async fn run(
        &self,
        command: &str,
        args: &[String],
        options: &RunOptions,
    ) -> Result<ProcessOutput> {
        let verdict = self.allowlist.check(command, args);
        assert!(
            verdict.is_allowed(),
            "adapter issued a non-allowlisted command: {command} {args:?} ({verdict:?})"
        );
        match command {
            SSH_ADD => self.ssh_add(args),
            SSH_KEYGEN => Ok(ProcessOutput {
                stdout: format!("256 SHA256:keygen {} (ED25519)\n", args[1]),
                stderr: String::new(),
            }),
            _ => self.inner.run(command, args, options).await,
        }
    }
}

/// Records every call, then delegates to `inner` (or fails when there is none).
pub struct RecordingRunner {
    calls: Mutex<Vec<(String, Vec<String>)>>,
    inner: Option<Arc<dyn ProcessRunner>>,
}

impl RecordingRunner {
    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            inner: None,
        }
    }

    pub fn wrapping(inner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            inner: Some(inner),
        }
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessRunner for RecordingRunner {
    async fn run(
        &self,
        command: &str,
        args: &[String],
        options: &RunOptions,
    ) -> Result<ProcessOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((command.to_string(), args.to_vec()));
        match &self.inner {
            Some(inner) => inner.run(command, args, options).await,
            None => Err(Error::ExecutionFailure {
                command: command.to_string(),
                code: Some(1),
                stderr: "recording runner".to_string(),
            }),
        }
    }
}
