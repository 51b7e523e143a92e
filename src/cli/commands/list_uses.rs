use anyhow::Result;
use clap::Args;

#[derive(Args)]
pub struct ListUsesArgs {}

pub async fn execute(_args: ListUsesArgs) -> Result<i32> {
    println!("Available built-in actions:");
    println!();

    for (name, description) in crate::list_builtins() {
        println!("  {name:<20} {description}");
    }

    Ok(0)
}
