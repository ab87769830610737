//! entrypoint for sluice-cli

#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(not(test), warn(clippy::print_stdout, clippy::dbg_macro))]

use clap::{Parser, Subcommand};

pub mod cmd;
use self::cmd::dial;

pub mod trace;

#[derive(Debug, Parser)]
#[command(name = "sluice")]
#[command(bin_name = "sluice")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmds: CliCommands,
}

#[derive(Debug, Subcommand)]
enum CliCommands {
    Dial(dial::CliCommandDial),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    #[expect(clippy::exit)]
    if let Err(err) = match cli.cmds {
        CliCommands::Dial(cfg) => dial::run(cfg).await,
    } {
        eprintln!("🚩 exit with error: {err}");
        std::process::exit(1);
    }
}
