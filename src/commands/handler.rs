use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::commands::{CommandEnv, CommandRegistry, StructuredContext, TextContext};
use crate::host::{
    Host, InteractionResponse, InvocationKind, ReplyContent, StructuredInvocation, TextMessage,
    origin,
};

const FAILURE_MESSAGE: &str = "❌ There was an error executing this command. Please try again later.";
const NOT_TEXT_MESSAGE: &str =
    "❌ This command is not available as a text command. Please use the slash command version.";
const NOT_RECOGNIZED_MESSAGE: &str = "❌ This command is not recognized.";

/// Settings the dispatcher and commands read on every invocation
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// The command prefix (e.g., "!")
    pub prefix: String,
    pub embed_color: u32,
    pub delete_command_messages: bool,
}

/// What a dispatch call did with its event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not a command for this bot
    Ignored,
    /// No command with this name
    Unknown(String),
    /// The command exists but has no text handler
    NotAvailableAsText(String),
    Executed(String),
    /// The handler returned an error, the invoker was told
    Failed(String),
}

/// Routes inbound events to commands
///
/// Every handler runs inside the same boundary: an error is logged in full and
/// the invoker only sees a generic failure message.
pub struct CommandDispatcher {
    host: Arc<dyn Host>,
    registry: Arc<CommandRegistry>,
    settings: DispatchSettings,
}

impl CommandDispatcher {
    /// Create a new dispatcher
    ///
    /// # Arguments
    /// * `host` - The chat host for sending replies
    /// * `registry` - The registry of available commands
    /// * `settings` - Prefix and presentation settings
    pub fn new(host: Arc<dyn Host>, registry: Arc<CommandRegistry>, settings: DispatchSettings) -> Self {
        CommandDispatcher {
            host,
            registry,
            settings,
        }
    }

    fn env(&self) -> CommandEnv<'_> {
        CommandEnv {
            host: self.host.as_ref(),
            registry: &self.registry,
            settings: &self.settings,
        }
    }

    /// Process an incoming chat message
    ///
    /// # Returns
    /// What was done with the message. `Err` only when a reply could not be delivered.
    pub async fn handle_text(&self, msg: &TextMessage) -> Result<DispatchOutcome> {
        if msg.author.bot {
            return Ok(DispatchOutcome::Ignored);
        }

        let Some((command_name, args)) = parse_text_command(&self.settings.prefix, &msg.content)
        else {
            return Ok(DispatchOutcome::Ignored);
        };

        let ctx = TextContext::new(self.env(), msg);

        let Some(command) = self.registry.get_text(&command_name) else {
            ctx.reply(format!(
                "❌ Unknown command: `{}`. Use `{}help` to see available commands.",
                command_name, self.settings.prefix
            ))
            .await?;
            return Ok(DispatchOutcome::Unknown(command_name));
        };

        let Some(handler) = command.text_handler() else {
            ctx.reply(NOT_TEXT_MESSAGE).await?;
            return Ok(DispatchOutcome::NotAvailableAsText(command_name));
        };

        info!(
            "Executing command: {} by {} in {}",
            command_name,
            msg.author.tag,
            origin(msg.guild.as_ref())
        );

        match handler.execute(&ctx, &args).await {
            Ok(()) => {
                if self.settings.delete_command_messages {
                    if let Err(e) = self.host.delete_message(msg.channel_id, msg.id).await {
                        warn!(error = %e, "Failed to delete command message");
                    }
                }
                Ok(DispatchOutcome::Executed(command_name))
            }
            Err(e) => {
                error!(error = ?e, "Error executing command {}", command_name);

                if ctx.replied() {
                    ctx.follow_up(FAILURE_MESSAGE).await?;
                } else {
                    ctx.reply(FAILURE_MESSAGE).await?;
                }
                Ok(DispatchOutcome::Failed(command_name))
            }
        }
    }

    /// Process a structured command invocation
    pub async fn handle_structured(&self, invocation: &StructuredInvocation) -> Result<DispatchOutcome> {
        if invocation.kind != InvocationKind::ChatInput {
            debug!("Ignoring {:?} interaction for {}", invocation.kind, invocation.command_name);
            return Ok(DispatchOutcome::Ignored);
        }

        let command_name = invocation.command_name.clone();
        let Some(handler) = self
            .registry
            .get_structured(&command_name)
            .and_then(|command| command.structured_handler().cloned())
        else {
            self.host
                .respond(
                    invocation,
                    InteractionResponse::Message(ReplyContent::text(NOT_RECOGNIZED_MESSAGE).ephemeral()),
                )
                .await?;
            return Ok(DispatchOutcome::Unknown(command_name));
        };

        info!(
            "Executing slash command: {} by {} in {}",
            command_name,
            invocation.user.tag,
            origin(invocation.guild.as_ref())
        );

        let ctx = StructuredContext::new(self.env(), invocation);
        match handler.execute(&ctx).await {
            Ok(()) => Ok(DispatchOutcome::Executed(command_name)),
            Err(e) => {
                error!(error = ?e, "Error executing slash command {}", command_name);

                let failure = ReplyContent::text(FAILURE_MESSAGE).ephemeral();
                if ctx.responded() {
                    ctx.follow_up(failure).await?;
                } else {
                    ctx.reply_quietly(failure).await?;
                }
                Ok(DispatchOutcome::Failed(command_name))
            }
        }
    }
}

/// Split prefixed text into a lowercased command name and its arguments
///
/// Returns `None` when `content` does not start with `prefix` or nothing follows it.
/// A bare prefix is treated as ordinary chat and gets no "unknown command" reply.
pub fn parse_text_command(prefix: &str, content: &str) -> Option<(String, Vec<String>)> {
    let without_prefix = content.strip_prefix(prefix)?;
    let mut parts = without_prefix.split_whitespace();

    let command_name = parts.next()?.to_lowercase();
    let args = parts.map(str::to_string).collect();

    Some((command_name, args))
}
