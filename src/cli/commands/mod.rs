use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};

pub mod install;
pub mod list_uses;

#[derive(Parser)]
#[command(
    name = "pre-push",
    about = "Git pre-push hook runner with a DAG executor",
    long_about = "pre-push is a cross-platform, configurable Git pre-push hook runner that\n\
                  provides built-in checks and supports custom actions via YAML configuration.\n\
                  \n\
                  When invoked by Git as a hook, it reads the standard pre-push input and runs\n\
                  the configured checks. Configuration lives in .project.yml at the repository\n\
                  root.",
    disable_version_flag = true
)]
pub struct Cli {
    /// Print version and binary name
    #[arg(long)]
    pub version: bool,

    /// Print version only
    #[arg(short = 'V')]
    pub version_only: bool,

    /// Increase verbosity (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install or update the Git pre-push hook
    Install(install::InstallArgs),
    /// Run the pre-push stage in dry-run mode
    Test(test::TestArgs),
    /// List available built-in actions
    ListUses(list_uses::ListUsesArgs),
}

impl Cli {
    /// Executes the parsed command and returns the process exit code.
    pub async fn run(self) -> Result<i32> {
        crate::cli::setup_logging(self.verbose, self.debug);

        if self.version {
            println!("{} version {}", crate::PKG_NAME, crate::VERSION);
            return Ok(0);
        }
        if self.version_only {
            println!("{}", crate::VERSION);
            return Ok(0);
        }

        match self.command {
            Some(Commands::Install(args)) => install::execute(args).await,
            Some(Commands::Test(args)) => test::execute(args, self.verbose, self.debug).await,
            Some(Commands::ListUses(args)) => list_uses::execute(args).await,
            None => {
                let mut cmd = Cli::command();
                cmd.print_help()?;
                Ok(0)
            }
        }
    }
}
