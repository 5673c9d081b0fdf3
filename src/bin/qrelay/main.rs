// src/bin/qrelay/main.rs
use anyhow::Result;
use clap::{Arg, ArgAction, Command};

mod commands;
use commands::*;

#[tokio::main]
async fn main() -> Result<()> {
    let app = Command::new("qrelay")
        .version(env!("CARGO_PKG_VERSION"))
        .about("QRelay - transmission jobs with retry and relay of exhausted batches")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(Arg::new("config")
            .short('c')
            .long("config")
            .value_name("PATH")
            .help("TOML configuration file")
            .global(true))
        .subcommand(
            Command::new("start")
                .about("Start workers, the delayed-job promoter and the relay schedule")
                .arg(Arg::new("web")
                    .short('w')
                    .long("web")
                    .value_name("HOST:PORT")
                    .help("Also serve the admin endpoints on this address"))
        )
        .subcommand(
            Command::new("broadcast")
                .about("Send one payload from a sender to every recipient")
                .arg(Arg::new("sender")
                    .short('s')
                    .long("sender")
                    .value_name("NAME")
                    .required(true))
                .arg(Arg::new("payload")
                    .short('p')
                    .long("payload")
                    .value_name("TEXT")
                    .required(true))
                .arg(Arg::new("recipients")
                    .value_name("RECIPIENT")
                    .required(true)
                    .action(ArgAction::Append))
        )
        .subcommand(
            Command::new("sequence")
                .about("Send indexed chunks to one recipient, relayed on exhaustion")
                .arg(Arg::new("recipient")
                    .short('r')
                    .long("recipient")
                    .value_name("NAME")
                    .required(true))
                .arg(Arg::new("chunks")
                    .value_name("CHUNK")
                    .required(true)
                    .action(ArgAction::Append))
        )
        .subcommand(
            Command::new("relay")
                .about("Run one relay sweep over the failure store")
        )
        .subcommand(
            Command::new("failures")
                .about("List recorded failures")
        );

    let matches = app.get_matches();
    qrelay::logging::init_cli()?;
    let config = load_config(&matches)?;

    match matches.subcommand() {
        Some(("start", sub_matches)) => start_command(config, sub_matches).await,
        Some(("broadcast", sub_matches)) => broadcast_command(config, sub_matches).await,
        Some(("sequence", sub_matches)) => sequence_command(config, sub_matches).await,
        Some(("relay", _)) => relay_command(config).await,
        Some(("failures", _)) => failures_command(config).await,
        _ => unreachable!("subcommand required"),
    }
}
