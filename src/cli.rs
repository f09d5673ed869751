use clap::Parser;

/// A Discord bot with prefix and slash commands
#[derive(Parser, Debug)]
#[command(name = "command_bot")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "A Discord bot with prefix and slash commands", long_about = None)]
pub struct Cli {
    /// Enable debug logging, overriding LOG_LEVEL
    #[arg(short, long)]
    pub debug: bool,

    /// The command prefix for text commands (overrides PREFIX)
    #[arg(short, long, value_parser = clap::builder::NonEmptyStringValueParser::new())]
    pub prefix: Option<String>,

    /// Do not push slash commands to Discord on startup
    #[arg(long)]
    pub skip_sync: bool,
}
