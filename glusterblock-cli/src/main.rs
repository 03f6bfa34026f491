mod cli;
mod commands;

use clap::Parser;
use glusterblock::BlockError;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let log_guard = glusterblock::logging::init(cli.global.log_level());

    let result = run(cli).await;
    // flush buffered log lines before exiting
    drop(log_guard);

    if let Err(e) = result {
        match e.downcast_ref::<BlockError>() {
            Some(err) => eprintln!("Error [{}]: {e:#}", err.kind()),
            None => eprintln!("Error: {e:#}"),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let global = cli.global;
    match cli.command {
        Commands::Create(args) => commands::create::execute(args, &global).await,
        Commands::Rm(args) => commands::rm::execute(args, &global).await,
        Commands::Mount(args) => commands::mount::execute(args, &global).await,
        Commands::Unmount(args) => commands::unmount::execute(args, &global).await,
        Commands::Path(args) => commands::path::execute(args, &global).await,
        Commands::Inspect(args) => commands::inspect::execute(args, &global).await,
        Commands::List(args) => commands::list::execute(args, &global).await,
        Commands::Reconcile(args) => commands::reconcile::execute(args, &global).await,
    }
}
