mod cli;
mod commands;
mod config;
mod discord;
mod host;
mod logging;
#[cfg(test)]
mod test_helpers;

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use std::sync::Arc;
use tracing::{debug, error, info};

use cli::Cli;
use commands::{
    BuiltinCommands, CommandDispatcher, CommandRegistry, CommandScope, DispatchSettings,
    sync_structured_commands,
};
use config::{Config, LogSettings};
use discord::{DiscordRestClient, GatewayHandler};
use logging::{LogLevel, Logger};

/// The main entry point for the application
#[tokio::main]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse();
    dotenv().ok();

    // Setup logging
    let mut log_settings = LogSettings::from_env();
    if cli.debug {
        log_settings.level = LogLevel::Debug;
    }
    if let Err(e) = logging::init(Logger::new(log_settings.level, &log_settings.dir)) {
        eprintln!("Failed to install logger: {}", e);
    }
    debug!(
        "Logging at {} and above to {}",
        log_settings.level, log_settings.dir
    );

    // A panic anywhere is treated as unrecoverable
    std::panic::set_hook(Box::new(|panic| {
        error!("Uncaught exception: {}", panic);
        std::process::exit(1);
    }));

    if let Err(e) = run(cli).await {
        error!(error = ?e, "{:#}", e);
        std::process::exit(1);
    }
}

/// Load configuration and commands, then serve gateway events until the connection ends
async fn run(cli: Cli) -> Result<()> {
    info!("Loading configuration");
    let mut config = Config::from_env().context(
        "Configuration validation failed. Please check your .env file and ensure all required variables are set",
    )?;
    if let Some(prefix) = cli.prefix {
        config.set_prefix(prefix);
    }
    debug!(
        prefix = %config.prefix,
        dev_guild_id = ?config.dev_guild_id,
        "Configuration loaded"
    );

    // Set up command registry
    let registry = Arc::new(CommandRegistry::load(&BuiltinCommands));

    let rest = Arc::new(DiscordRestClient::new(config.token.clone(), config.client_id)?);

    // Push slash commands while the gateway connects
    if cli.skip_sync {
        info!("Skipping slash command registration");
    } else {
        let scope = config
            .dev_guild_id
            .map_or(CommandScope::Global, CommandScope::Guild);
        let registry = registry.clone();
        let rest = rest.clone();
        let application_id = config.client_id;
        tokio::spawn(async move {
            if let Err(e) =
                sync_structured_commands(&registry, rest.as_ref(), application_id, scope).await
            {
                error!(error = ?e, "Error registering slash commands");
            }
        });
    }

    let dispatcher = Arc::new(CommandDispatcher::new(
        rest.clone(),
        registry,
        DispatchSettings {
            prefix: config.prefix.clone(),
            embed_color: config.settings.embed_color,
            delete_command_messages: config.settings.delete_command_messages,
        },
    ));
    let handler = GatewayHandler::new(dispatcher, rest.clone(), config.settings.status_name.clone());
    info!("Event handlers registered successfully");

    discord::connect(&config.token, handler, rest)
        .await
        .context("Failed to login")
}
