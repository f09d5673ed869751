//! Gateway event handling
//!
//! serenity keeps the websocket alive and hands us events. Each one is turned
//! into a host event and passed to the dispatcher; lifecycle events are only
//! logged.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serenity::all::{
    ActivityData, Client, CommandDataOptionValue, CommandInteraction, CommandType, Context,
    EventHandler, GatewayIntents, Guild, GuildId, Interaction, Message, Ready,
    ShardStageUpdateEvent, UnavailableGuild, User,
};
use serenity::http::RatelimitInfo;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::commands::CommandDispatcher;
use crate::discord::DiscordRestClient;
use crate::host::{
    Author, BotIdentity, GuildRef, InvocationKind, OptionValue, StructuredInvocation, TextMessage,
};

const LATENCY_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Receives gateway events and forwards commands to the dispatcher
pub struct GatewayHandler {
    dispatcher: Arc<CommandDispatcher>,
    rest: Arc<DiscordRestClient>,
    /// Presence shown as "Watching ..."
    status: String,
}

impl GatewayHandler {
    pub fn new(dispatcher: Arc<CommandDispatcher>, rest: Arc<DiscordRestClient>, status: String) -> Self {
        GatewayHandler {
            dispatcher,
            rest,
            status,
        }
    }
}

fn author_from(user: &User) -> Author {
    Author {
        id: user.id.get(),
        tag: user.tag(),
        bot: user.bot,
    }
}

fn guild_from(ctx: &Context, guild_id: Option<GuildId>) -> Option<GuildRef> {
    guild_id.map(|id| GuildRef {
        id: id.get(),
        name: id.name(&ctx.cache),
    })
}

fn option_value(value: &CommandDataOptionValue) -> OptionValue {
    match value {
        CommandDataOptionValue::String(value) => OptionValue::String(value.clone()),
        CommandDataOptionValue::Integer(value) => OptionValue::Integer(*value),
        CommandDataOptionValue::Number(value) => OptionValue::Number(*value),
        CommandDataOptionValue::Boolean(value) => OptionValue::Boolean(*value),
        CommandDataOptionValue::User(id) => OptionValue::User(id.get()),
        CommandDataOptionValue::Channel(id) => OptionValue::Channel(id.get()),
        CommandDataOptionValue::Role(id) => OptionValue::Role(id.get()),
        CommandDataOptionValue::Mentionable(id) => OptionValue::Mentionable(id.get()),
        CommandDataOptionValue::Attachment(id) => OptionValue::Attachment(id.get()),
        _ => OptionValue::Unsupported,
    }
}

fn text_message(ctx: &Context, msg: &Message) -> TextMessage {
    TextMessage {
        id: msg.id.get(),
        author: author_from(&msg.author),
        content: msg.content.clone(),
        mentions: msg.mentions.iter().map(author_from).collect(),
        channel_id: msg.channel_id.get(),
        guild: guild_from(ctx, msg.guild_id),
    }
}

fn invocation(ctx: &Context, command: &CommandInteraction, kind: InvocationKind) -> StructuredInvocation {
    StructuredInvocation {
        id: command.id.get(),
        token: command.token.clone(),
        kind,
        command_name: command.data.name.clone(),
        user: author_from(&command.user),
        options: command
            .data
            .options
            .iter()
            .map(|option| (option.name.clone(), option_value(&option.value)))
            .collect(),
        channel_id: command.channel_id.get(),
        guild: guild_from(ctx, command.guild_id),
    }
}

#[async_trait]
impl EventHandler for GatewayHandler {
    async fn message(&self, ctx: Context, msg: Message) {
        let message = text_message(&ctx, &msg);
        match self.dispatcher.handle_text(&message).await {
            Ok(outcome) => debug!("Message {} dispatched: {:?}", message.id, outcome),
            Err(e) => error!(error = ?e, "Error handling message"),
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let invocation = match &interaction {
            Interaction::Command(command) => {
                let kind = if command.data.kind == CommandType::ChatInput {
                    InvocationKind::ChatInput
                } else {
                    InvocationKind::ContextMenu
                };
                invocation(&ctx, command, kind)
            }
            Interaction::Autocomplete(command) => {
                invocation(&ctx, command, InvocationKind::Autocomplete)
            }
            other => {
                debug!("Ignoring {:?} interaction", other.kind());
                return;
            }
        };

        match self.dispatcher.handle_structured(&invocation).await {
            Ok(outcome) => debug!("Interaction {} dispatched: {:?}", invocation.id, outcome),
            Err(e) => error!(error = ?e, "Error handling interaction"),
        }
    }

    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("Bot is ready! Logged in as {}", ready.user.tag());
        info!("Bot is in {} servers", ready.guilds.len());

        self.rest
            .set_identity(BotIdentity {
                id: ready.user.id.get(),
                tag: ready.user.tag(),
                avatar_url: ready.user.face(),
            })
            .await;

        ctx.set_activity(Some(ActivityData::watching(self.status.clone())));
    }

    async fn guild_create(&self, _ctx: Context, guild: Guild, is_new: Option<bool>) {
        // Guilds already joined are also sent on connect; only log real joins
        if is_new == Some(true) {
            info!(
                "Joined new guild: {} ({}) with {} members",
                guild.name, guild.id, guild.member_count
            );
        }
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, full: Option<Guild>) {
        if incomplete.unavailable {
            warn!("Guild {} became unavailable", incomplete.id);
            return;
        }
        match full {
            Some(guild) => info!("Left guild: {} ({})", guild.name, guild.id),
            None => info!("Left guild: {}", incomplete.id),
        }
    }

    async fn ratelimit(&self, data: RatelimitInfo) {
        warn!(
            path = %data.path,
            global = data.global,
            timeout_ms = data.timeout.as_millis() as u64,
            "Rate limit hit"
        );
    }

    async fn shard_stage_update(&self, _ctx: Context, event: ShardStageUpdateEvent) {
        warn!(
            shard = ?event.shard_id,
            "Shard connection stage changed: {:?} -> {:?}",
            event.old, event.new
        );
    }
}

/// Log in and serve gateway events until the connection ends
///
/// # Arguments
/// * `token` - Bot token
/// * `handler` - Receives every gateway event
/// * `rest` - Updated with the shard latency as it becomes known
///
/// # Returns
/// An error if login fails or the connection ends with a transport error
pub async fn connect(token: &str, handler: GatewayHandler, rest: Arc<DiscordRestClient>) -> Result<()> {
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(token, intents)
        .event_handler(handler)
        .await
        .map_err(|e| anyhow!("Failed to create gateway client: {}", e))?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(LATENCY_POLL_INTERVAL).await;
            let latency = {
                let runners = shard_manager.runners.lock().await;
                runners.values().find_map(|runner| runner.latency)
            };
            debug!("Gateway latency: {:?}", latency);
            rest.set_gateway_latency(latency).await;
        }
    });

    client
        .start()
        .await
        .map_err(|e| anyhow!("Gateway connection failed: {}", e))
}
