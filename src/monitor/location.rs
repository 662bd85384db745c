//! Resolving a provider's state directory for one session
//!
//! Agent CLIs keep per-project state under a shared root in the user's home.
//! A state directory may name the project with a placeholder component so that
//! each session watches only its own project:
//!
//! - `{project}`: the working directory with every character other than ASCII
//!   letters, digits and `-` replaced by `-` (`/work/my.repo` becomes
//!   `-work-my-repo`), the layout of `~/.claude/projects`.
//! - `{project_hash}`: the lowercase hex SHA-256 of the working directory, the
//!   layout of `~/.gemini/tmp`.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};

const PROJECT: &str = "{project}";
const PROJECT_HASH: &str = "{project_hash}";

/// Expand `~/`, anchor relative paths at `base` and fill in project
/// placeholders from `base`
pub fn resolve_state_dir(dir: &Path, base: &Path) -> PathBuf {
    let base = absolute(base);
    let anchored = match (dir.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ if dir.is_absolute() => dir.to_path_buf(),
        _ => base.join(dir),
    };

    anchored
        .components()
        .map(|component| match component {
            Component::Normal(name) if name == PROJECT => OsString::from(project_slug(&base)),
            Component::Normal(name) if name == PROJECT_HASH => OsString::from(project_hash(&base)),
            other => other.as_os_str().to_os_string(),
        })
        .collect()
}

pub fn project_slug(project: &Path) -> String {
    project
        .to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

pub fn project_hash(project: &Path) -> String {
    hex::encode(Sha256::digest(project.to_string_lossy().as_bytes()))
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}
