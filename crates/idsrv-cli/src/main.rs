mod cli;
mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use client::IdsrvClient;
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let format = cli.format.unwrap_or_default();
    let client = IdsrvClient::new(&cli.server, cli.api.as_deref())?;

    match &cli.command {
        Commands::Discover => commands::discover::discover(&client, format).await?,
        Commands::ClientCredentials(args) => {
            commands::grants::client_credentials(&client, args, format).await?;
        }
        Commands::Password(args) => commands::grants::password(&client, args, format).await?,
        Commands::Code(args) => commands::grants::code(&client, args, format).await?,
        Commands::CallApi(args) => commands::api::call_api(&client, &args.token, format).await?,
    }

    Ok(())
}
