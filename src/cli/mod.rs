//! CLI module for Shellgate
//!
//! - `serve`: run the gateway (default)
//! - `doctor`: configuration and host diagnostics

use clap::{Parser, Subcommand};

pub mod doctor;

/// Shellgate command gateway
#[derive(Parser, Debug)]
#[command(name = "shellgate")]
#[command(about = "Realtime command gateway with tiered trust")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the server (default)
    Serve,
    /// Check configuration and host prerequisites
    Doctor,
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Doctor) => doctor::run().await,
        Some(Commands::Serve) | None => crate::server::run().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_parses() {
        let cli = Cli::try_parse_from(["shellgate"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_doctor_subcommand() {
        let cli = Cli::try_parse_from(["shellgate", "doctor"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Doctor)));
    }
}
