use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use git2::ConfigLevel;
use git2::ErrorCode;

use crate::transport::DEFAULT_CLOSE_GRACE;
use crate::transport::SshExeOptions;

/// Environment variable overriding the ssh executable.
pub const SSH_EXE_ENV: &str = "GIT_SSH_EXE";

// -----------------------------------------------------------------------------
// ConfigExt

/// String getters over git configuration that treat a missing key as `None`.
pub trait ConfigExt {
    fn get_string_opt(&self, key: &str) -> Result<Option<String>, git2::Error>;

    /// Look up a key given as its dotted parts, e.g. `["remote", "origin", "url"]`.
    fn get_string_parts(&self, key_parts: &[&str]) -> Result<Option<String>, git2::Error> {
        self.get_string_opt(&key_parts.join("."))
    }

    /// Look up a key in one configuration level only.
    fn get_string_at(
        &self,
        key: &str,
        level: ConfigLevel,
    ) -> Result<Option<String>, git2::Error>;
}

impl ConfigExt for git2::Config {
    fn get_string_opt(&self, key: &str) -> Result<Option<String>, git2::Error> {
        match self.get_string(key) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn get_string_at(
        &self,
        key: &str,
        level: ConfigLevel,
    ) -> Result<Option<String>, git2::Error> {
        match self.open_level(level) {
            Ok(config) => config.get_string_opt(key),
            Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

// -----------------------------------------------------------------------------
// Config

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Scheme the transport is registered for.
    pub scheme: String,
    pub ssh_program: PathBuf,
    pub upload_pack: String,
    pub receive_pack: String,
    pub close_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let options = SshExeOptions::default();
        Self {
            scheme: "ssh".to_string(),
            ssh_program: options.program,
            upload_pack: options.upload_pack,
            receive_pack: options.receive_pack,
            close_grace: DEFAULT_CLOSE_GRACE,
        }
    }
}

impl Config {
    /// Load config from the repository's git configuration (`sshexe.*`).
    pub fn load(repo_path: &Path) -> Result<Self> {
        let repo = git2::Repository::discover(repo_path)
            .with_context(|| format!("No git repository found at {}", repo_path.display()))?;
        let config = repo.config().context("Failed to read git configuration")?;
        Self::from_git_config(&config)
    }

    pub fn from_git_config(config: &git2::Config) -> Result<Self> {
        let defaults = Self::default();
        let get = |name: &str| config.get_string_parts(&["sshexe", name]);

        let ssh_program = match std::env::var_os(SSH_EXE_ENV) {
            Some(program) => PathBuf::from(program),
            None => get("program")?.map_or(defaults.ssh_program, PathBuf::from),
        };
        let close_grace = match get("closeGraceMs")? {
            Some(ms) => Duration::from_millis(
                ms.trim()
                    .parse()
                    .with_context(|| format!("Invalid sshexe.closeGraceMs: {ms}"))?,
            ),
            None => defaults.close_grace,
        };

        Ok(Self {
            scheme: get("scheme")?.unwrap_or(defaults.scheme),
            ssh_program,
            upload_pack: get("uploadPack")?.unwrap_or(defaults.upload_pack),
            receive_pack: get("receivePack")?.unwrap_or(defaults.receive_pack),
            close_grace,
        })
    }

    /// Options for registering the transport.
    pub fn ssh_options(&self) -> SshExeOptions {
        SshExeOptions {
            program: self.ssh_program.clone(),
            upload_pack: self.upload_pack.clone(),
            receive_pack: self.receive_pack.clone(),
            close_grace: self.close_grace,
        }
    }
}
