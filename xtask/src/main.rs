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
    /// Run the workspace tests
    Test,
    /// Run the power-switch tool
    Cleware {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Run the raw control-message tool
    Control {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn cargo(args: &[&str], extra: &[String], what: &str) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.args(args);
    if !extra.is_empty() {
        cmd.arg("--").args(extra);
    }
    let status = cmd.status()?;
    if !status.success() {
        anyhow::bail!("{} failed", what);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Build => {
            println!("Building project...");
            cargo(&["build", "--workspace"], &[], "Build")?;
        }
        Commands::Test => {
            println!("Testing project...");
            cargo(&["test", "--workspace"], &[], "Test")?;
        }
        Commands::Cleware { args } => {
            cargo(&["run", "-p", "cleware-cli", "--bin", "cleware"], args, "Run")?;
        }
        Commands::Control { args } => {
            cargo(&["run", "-p", "usb-control", "--bin", "usb-control"], args, "Run")?;
        }
    }

    Ok(())
}
