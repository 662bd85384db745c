//! The fully constructed command handed to the supervisor

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SupervisorError;

/// Executable plus arguments, treated as opaque by the supervisor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCommand {
    pub executable: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl AgentCommand {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    /// Build from an argv vector; the first element is the executable
    pub fn from_argv<I, S>(argv: I) -> Result<Self, SupervisorError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = argv.into_iter().map(Into::into);
        let executable = argv
            .next()
            .filter(|e: &String| !e.trim().is_empty())
            .ok_or(SupervisorError::EmptyCommand)?;
        Ok(Self {
            args: argv.collect(),
            ..Self::new(executable)
        })
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Locate the executable on PATH, or relative to the working directory
    pub fn resolve_executable(&self) -> Result<PathBuf, SupervisorError> {
        let found = match &self.cwd {
            Some(cwd) => which::which_in(&self.executable, std::env::var_os("PATH"), cwd),
            None => which::which(&self.executable),
        };
        found.map_err(|_| SupervisorError::ExecutableNotFound {
            executable: self.executable.clone(),
        })
    }

    /// Directory relative state locations resolve against
    pub fn base_dir(&self) -> PathBuf {
        match &self.cwd {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().unwrap_or_else(|_| Path::new(".").to_path_buf()),
        }
    }

    pub fn display(&self) -> String {
        std::iter::once(self.executable.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
