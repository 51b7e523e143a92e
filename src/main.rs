use clap::Parser;
use pre_push::cli::Cli;
use pre_push::hook;

#[tokio::main]
async fn main() {
    // Git hook invocations carry positional remote arguments that clap would
    // reject, so they are detected and dispatched before parsing.
    if hook::is_git_hook() {
        match hook::run(pre_push::VERSION).await {
            Ok(code) => std::process::exit(code),
            Err(err) => {
                eprintln!("Error: {err:#}");
                std::process::exit(1);
            }
        }
    }

    let cli = Cli::parse();
    match cli.run().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            std::process::exit(1);
        }
    }
}
