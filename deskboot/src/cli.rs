// deskboot/src/cli.rs
//! Defines the command-line argument structure using clap.
use clap::{ArgAction, Parser};

/// Provision this machine to run the ABOLFAZL-DESKTOP shell.
///
/// Installs system packages, a pyenv-managed Python, the shell's source tree
/// and its login session. Safe to run again at any time; note that local
/// changes in the shell's working copy are discarded.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about, name = "deskboot", bin_name = "deskboot")]
pub struct CliArgs {
    /// Increase log verbosity (-v debug and log file, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}
