//! Self-installing Git hook
//!
//! The installed hook is a byte-exact copy of the running binary, so Git
//! invokes it directly. A SHA-256 content hash makes installation idempotent:
//! a second install of the same binary is a no-op.

use crate::git::GitRepo;
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Updated,
    UpToDate,
}

pub struct HookInstaller {
    binary: PathBuf,
    hook_path: PathBuf,
}

impl HookInstaller {
    /// Installer for the discovered repository and the running executable.
    pub fn for_current_repo() -> Result<Self> {
        let repo = GitRepo::discover()?;
        let binary =
            std::env::current_exe().context("failed to resolve current executable path")?;
        Ok(HookInstaller::new(binary, repo.hooks_dir().join("pre-push")))
    }

    pub fn new(binary: PathBuf, hook_path: PathBuf) -> Self {
        HookInstaller { binary, hook_path }
    }

    pub fn hook_path(&self) -> &Path {
        &self.hook_path
    }

    /// Installs or updates the hook when its content differs from the
    /// running binary.
    pub fn ensure(&self) -> Result<InstallOutcome> {
        if self.is_up_to_date()? {
            return Ok(InstallOutcome::UpToDate);
        }

        if let Some(hooks_dir) = self.hook_path.parent() {
            fs::create_dir_all(hooks_dir).with_context(|| {
                format!("failed to create hooks directory: {}", hooks_dir.display())
            })?;
        }

        fs::copy(&self.binary, &self.hook_path).with_context(|| {
            format!("failed to copy binary to {}", self.hook_path.display())
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.hook_path, fs::Permissions::from_mode(0o755))
                .context("failed to make hook executable")?;
        }

        Ok(InstallOutcome::Updated)
    }

    fn is_up_to_date(&self) -> Result<bool> {
        if !self.hook_path.exists() {
            return Ok(false);
        }
        Ok(file_digest(&self.hook_path)? == file_digest(&self.binary)?)
    }
}

fn file_digest(path: &Path) -> Result<[u8; 32]> {
    let mut file =
        fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)
        .with_context(|| format!("failed to hash {}", path.display()))?;
    Ok(hasher.finalize().into())
}
