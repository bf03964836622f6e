use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};

use crate::error::LaunchError;

pub const DEFAULT_BINARY: &str = "consul";

/// Overrides [`DEFAULT_BINARY`] when set to a non-empty value.
pub const BINARY_ENV: &str = "CONSUL_TESTUTIL_BIN";

/// How to invoke the agent process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCommand {
    binary: String,
    envs: Vec<(OsString, OsString)>,
}

impl Default for AgentCommand {
    fn default() -> Self {
        Self::from_env_value(std::env::var(BINARY_ENV).ok())
    }
}

impl AgentCommand {
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            envs: Vec::new(),
        }
    }

    /// Command for the value of [`BINARY_ENV`], falling back to [`DEFAULT_BINARY`].
    #[must_use]
    pub fn from_env_value(value: Option<String>) -> Self {
        match value.map(|v| v.trim().to_string()) {
            Some(v) if !v.is_empty() => Self::new(v),
            _ => Self::new(DEFAULT_BINARY),
        }
    }

    #[must_use]
    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn set_binary(&mut self, binary: impl Into<String>) {
        self.binary = binary.into();
    }

    /// Set an environment variable on the spawned agent.
    pub fn env(&mut self, key: impl Into<OsString>, value: impl Into<OsString>) {
        self.envs.push((key.into(), value.into()));
    }

    /// Locate the agent binary.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::AgentNotFound`] if the binary is not an executable file.
    pub fn resolve(&self) -> Result<PathBuf, LaunchError> {
        find_executable(&self.binary).ok_or_else(|| LaunchError::AgentNotFound {
            binary: self.binary.clone(),
        })
    }

    /// Spawn `<program> agent -config-file <config_file>` with inherited stdio.
    pub(crate) fn spawn(&self, program: &Path, config_file: &Path) -> Result<Child, LaunchError> {
        Command::new(program)
            .arg("agent")
            .arg("-config-file")
            .arg(config_file)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                binary: self.binary.clone(),
                source,
            })
    }
}

/// Find `name` as given (when it contains a path separator) or in the directories of `$PATH`.
#[must_use]
pub fn find_executable(name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(name))
        .find(|p| is_executable(p))
}

fn is_executable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_value_overrides_default_binary() {
        assert_eq!(AgentCommand::from_env_value(None).binary(), "consul");
        assert_eq!(
            AgentCommand::from_env_value(Some("  ".to_string())).binary(),
            "consul"
        );
        assert_eq!(
            AgentCommand::from_env_value(Some("/opt/consul/bin/consul".to_string())).binary(),
            "/opt/consul/bin/consul"
        );
    }

    #[test]
    fn missing_binary_is_agent_not_found() {
        let err = AgentCommand::new("definitely-not-a-real-consul-binary-1f3a")
            .resolve()
            .unwrap_err();
        assert!(err.is_agent_missing());
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn empty_name_is_never_found() {
        assert_eq!(find_executable(""), None);
    }

    #[cfg(unix)]
    #[test]
    fn explicit_path_requires_executable_file() {
        use std::os::unix::fs::PermissionsExt as _;

        let dir = tempfile::tempdir().expect("tempdir");
        let bin = dir.path().join("agent");
        std::fs::write(&bin, "#!/bin/sh\n").expect("write");

        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o644)).expect("chmod");
        assert_eq!(find_executable(bin.to_str().expect("utf8")), None);

        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).expect("chmod");
        assert_eq!(find_executable(bin.to_str().expect("utf8")), Some(bin.clone()));

        assert_eq!(find_executable(dir.path().to_str().expect("utf8")), None);
    }

    #[cfg(unix)]
    #[test]
    fn bare_name_is_searched_on_path() {
        // `sh` is present on every unix host the tests run on.
        let found = find_executable("sh").expect("sh on PATH");
        assert!(found.is_absolute() || found.components().count() > 1);
        assert!(found.ends_with("sh"));
    }
}
