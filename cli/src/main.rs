mod commands;
mod terminal;

use commands::{CommandLine, Commands, checks, probe, run};
use terminal::print;

use crate::terminal::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let commands = CommandLine::parse_args();
    let cfg = commands.load_config()?;

    logging::init(cfg.verbose);
    print::banner(commands.quiet);

    match commands.command {
        Commands::Run {
            fleet,
            findings,
            json,
        } => {
            print::header("getting ready for checks", commands.quiet);
            run::run(fleet, findings, json, cfg, commands.quiet).await
        }
        Commands::Probe { fleet } => {
            print::header("probing hosts", commands.quiet);
            probe::probe(fleet, cfg, commands.quiet).await
        }
        Commands::Checks => checks::checks(&cfg, commands.quiet),
    }
}
