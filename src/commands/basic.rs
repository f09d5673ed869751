use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::commands::{
    CommandDescriptor, CommandEnv, CommandSchema, DescriptorError, OptionType, StructuredCommand,
    StructuredContext, TextCommand, TextContext,
};
use crate::host::{Embed, EmbedField, EmbedFooter, ReplyContent};

/// Greets the invoker, or another user if one is given
pub struct HelloCommand;

impl HelloCommand {
    pub fn descriptor() -> Result<CommandDescriptor, DescriptorError> {
        let command = Arc::new(HelloCommand);
        CommandDescriptor::builder("hello", "Send a friendly greeting")
            .usage("[@user]")
            .structured(
                CommandSchema::new("hello", "Sends a friendly greeting!").option(
                    OptionType::User,
                    "user",
                    "User to greet",
                    false,
                ),
                command.clone(),
            )
            .text(command)
            .build()
    }
}

fn greeting(target: Option<String>, invoker: String) -> String {
    match target {
        Some(target) => format!("👋 Hello, {}! Nice to meet you!", target),
        None => format!("👋 Hello, {}! How are you doing today?", invoker),
    }
}

#[async_trait]
impl TextCommand for HelloCommand {
    async fn execute(&self, ctx: &TextContext<'_>, _args: &[String]) -> Result<()> {
        let target = ctx.message.mentions.first().map(|user| user.mention());
        ctx.reply(greeting(target, ctx.message.author.mention())).await?;
        Ok(())
    }
}

#[async_trait]
impl StructuredCommand for HelloCommand {
    async fn execute(&self, ctx: &StructuredContext<'_>) -> Result<()> {
        let target = ctx
            .invocation
            .user_option("user")
            .map(|id| format!("<@{}>", id));
        ctx.reply_quietly(greeting(target, ctx.invocation.user.mention()))
            .await
    }
}

/// Replies, then edits the reply to show round-trip and gateway latency
pub struct PingCommand;

impl PingCommand {
    pub fn descriptor() -> Result<CommandDescriptor, DescriptorError> {
        let command = Arc::new(PingCommand);
        CommandDescriptor::builder("ping", "Check bot latency")
            .structured(
                CommandSchema::new("ping", "Replies with Pong and bot latency!"),
                command.clone(),
            )
            .text(command)
            .build()
    }
}

fn pong_message(latency_ms: i64, api_latency: Option<Duration>) -> String {
    let api_latency = match api_latency {
        Some(latency) => format!("{}ms", latency.as_millis()),
        None => "n/a".to_string(),
    };
    format!(
        "🏓 Pong!\n**Latency:** {}ms\n**API Latency:** {}",
        latency_ms, api_latency
    )
}

#[async_trait]
impl TextCommand for PingCommand {
    async fn execute(&self, ctx: &TextContext<'_>, _args: &[String]) -> Result<()> {
        let sent = ctx.reply("Pinging...").await?;
        let latency = (sent.created_at - ctx.message.created_at()).num_milliseconds();
        let api_latency = ctx.env.host.gateway_latency().await;

        ctx.edit(&sent, &pong_message(latency, api_latency)).await
    }
}

#[async_trait]
impl StructuredCommand for PingCommand {
    async fn execute(&self, ctx: &StructuredContext<'_>) -> Result<()> {
        let sent = ctx.reply("Pinging...").await?;
        let latency = (sent.created_at - ctx.invocation.created_at()).num_milliseconds();
        let api_latency = ctx.env.host.gateway_latency().await;

        ctx.edit_reply(&pong_message(latency, api_latency)).await
    }
}

/// Lists every command with its description and usage
pub struct HelpCommand;

impl HelpCommand {
    pub fn descriptor() -> Result<CommandDescriptor, DescriptorError> {
        let command = Arc::new(HelpCommand);
        CommandDescriptor::builder("help", "Display help information")
            .usage("[command]")
            .structured(
                CommandSchema::new("help", "Shows all available commands and their usage").option(
                    OptionType::String,
                    "command",
                    "Show details for one command",
                    false,
                ),
                command.clone(),
            )
            .text(command)
            .build()
    }

    async fn embed(env: &CommandEnv<'_>, only: Option<&str>) -> Option<Embed> {
        let prefix = &env.settings.prefix;

        let mut fields: Vec<EmbedField> = env
            .registry
            .descriptors()
            .filter(|command| only.is_none_or(|name| command.name() == name))
            .map(|command| {
                let invocation = if command.text_handler().is_some() {
                    format!("{}{}", prefix, command.name())
                } else {
                    format!("/{}", command.name())
                };
                let usage = match command.usage() {
                    Some(usage) => format!("{} {}", invocation, usage),
                    None => invocation.clone(),
                };
                EmbedField {
                    name: invocation,
                    value: format!("{}\nUsage: `{}`", command.description(), usage),
                    inline: false,
                }
            })
            .collect();

        if fields.is_empty() {
            return None;
        }

        fields.push(EmbedField {
            name: "💡 Slash Commands".to_string(),
            value: "You can also use slash commands by typing `/` followed by the command name!"
                .to_string(),
            inline: false,
        });

        let identity = env.host.bot_identity().await;
        Some(Embed {
            title: Some("🤖 Bot Commands".to_string()),
            description: Some("Here are all the available commands:".to_string()),
            color: Some(env.settings.embed_color),
            fields,
            footer: Some(EmbedFooter {
                text: "Bot made with Rust".to_string(),
                icon_url: identity.map(|identity| identity.avatar_url),
            }),
            timestamp: Some(Utc::now()),
        })
    }
}

#[async_trait]
impl TextCommand for HelpCommand {
    async fn execute(&self, ctx: &TextContext<'_>, args: &[String]) -> Result<()> {
        let only = args.first().map(|name| name.to_lowercase());

        match Self::embed(&ctx.env, only.as_deref()).await {
            Some(embed) => ctx.reply(ReplyContent::embed(embed)).await?,
            None => {
                ctx.reply(format!(
                    "❌ Unknown command: `{}`. Use `{}help` to see available commands.",
                    only.unwrap_or_default(),
                    ctx.env.settings.prefix
                ))
                .await?
            }
        };
        Ok(())
    }
}

#[async_trait]
impl StructuredCommand for HelpCommand {
    async fn execute(&self, ctx: &StructuredContext<'_>) -> Result<()> {
        let only = ctx
            .invocation
            .string_option("command")
            .map(str::to_lowercase);

        match Self::embed(&ctx.env, only.as_deref()).await {
            Some(embed) => ctx.reply_quietly(ReplyContent::embed(embed)).await,
            None => {
                ctx.reply_quietly(
                    ReplyContent::text(format!(
                        "❌ Unknown command: `{}`.",
                        only.unwrap_or_default()
                    ))
                    .ephemeral(),
                )
                .await
            }
        }
    }
}

/// Shows how long the bot has been running
pub struct UptimeCommand {
    started_at: Instant,
}

impl UptimeCommand {
    /// Create a new uptime command, counting from now
    pub fn new() -> Self {
        UptimeCommand {
            started_at: Instant::now(),
        }
    }

    pub fn descriptor() -> Result<CommandDescriptor, DescriptorError> {
        CommandDescriptor::builder("uptime", "Show how long the bot has been running")
            .structured(
                CommandSchema::new("uptime", "Shows how long the bot has been running"),
                Arc::new(UptimeCommand::new()),
            )
            .build()
    }
}

impl Default for UptimeCommand {
    fn default() -> Self {
        Self::new()
    }
}

fn format_uptime(elapsed: Duration) -> String {
    let hours = elapsed.as_secs() / 3600;
    let minutes = (elapsed.as_secs() % 3600) / 60;
    let seconds = elapsed.as_secs() % 60;

    format!("⏱️ Bot uptime: {}h {}m {}s", hours, minutes, seconds)
}

#[async_trait]
impl StructuredCommand for UptimeCommand {
    async fn execute(&self, ctx: &StructuredContext<'_>) -> Result<()> {
        ctx.defer(false).await?;
        ctx.edit_reply(&format_uptime(self.started_at.elapsed()))
            .await
    }
}
