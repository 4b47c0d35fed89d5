mod args;
mod commands;

use args::{Cli, Commands};
use clap::Parser;
use commands::create::CreateArgs;
use daemon_cli::{clienv, ui, DaemonError};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(clienv::log_filter()))
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli.command).await {
        match e.downcast_ref::<DaemonError>() {
            Some(DaemonError::UserCancelled) => {
                tracing::debug!("Cancelled by user");
            }
            Some(error) => {
                ui::print_error(error);
                std::process::exit(1);
            }
            None => {
                eprintln!("error: {e:#}");
                std::process::exit(1);
            }
        }
    }
}

async fn run(command: Commands) -> anyhow::Result<()> {
    if !command.skips_preflight() {
        commands::preflight()?;
    }

    match command {
        Commands::Create {
            name,
            command,
            rotation,
            keep,
            compress,
            no_compress,
            no_keep_alive,
        } => {
            commands::create::cmd_create(CreateArgs {
                name,
                command,
                rotation,
                keep,
                compress,
                no_compress,
                no_keep_alive,
            })
            .await?
        }
        Commands::List => commands::list::cmd_list().await?,
        Commands::Rm {
            name,
            delete_logs,
            keep_logs,
        } => commands::remove::cmd_remove(&name, delete_logs, keep_logs).await?,
        Commands::Stop { name } => commands::stop::cmd_stop(&name).await?,
        Commands::Restart { name } => commands::restart::cmd_restart(&name).await?,
        Commands::Edit { name } => commands::edit::cmd_edit(&name).await?,
        Commands::Logs { name, tail, lines } => commands::logs::cmd_logs(&name, tail, lines).await?,
        Commands::Completion { shell } => commands::completion::cmd_completion(shell)?,
        Commands::CompletionNames => commands::completion::cmd_completion_names()?,
    }

    Ok(())
}
