use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Tasks for the project", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the workspace
    Build,
    /// Run every test in the workspace
    Test,
    /// Scan a few simulated pages into a directory with the CLI
    Demo {
        #[arg(long, default_value = "target/demo-scan")]
        out: String,
        /// Use memory transfer (TIFF output)
        #[arg(long)]
        memory: bool,
    },
}

fn cargo(args: &[&str]) -> Result<()> {
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("cargo {} failed", args.join(" "));
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Build => {
            println!("Building workspace...");
            cargo(&["build", "--workspace"])?;
        }
        Commands::Test => {
            println!("Testing workspace...");
            cargo(&["test", "--workspace"])?;
        }
        Commands::Demo { out, memory } => {
            println!("Scanning simulated pages into {out}...");
            let mut args = vec![
                "run", "-p", "twain-cli", "--", "--simulate", "--pages", "3", "scan", "--out",
                out.as_str(),
            ];
            if *memory {
                args.push("--memory");
            }
            cargo(&args)?;
        }
    }

    Ok(())
}
