use crate::hook::installer::{HookInstaller, InstallOutcome};
use anyhow::Result;
use clap::Args;

#[derive(Args)]
pub struct InstallArgs {}

pub async fn execute(_args: InstallArgs) -> Result<i32> {
    let installer = HookInstaller::for_current_repo()?;

    match installer.ensure()? {
        InstallOutcome::Updated => {
            println!(
                "Git pre-push hook installed successfully (version {})",
                crate::VERSION
            );
        }
        InstallOutcome::UpToDate => {
            println!(
                "Git pre-push hook is already up to date (version {})",
                crate::VERSION
            );
        }
    }

    Ok(0)
}
