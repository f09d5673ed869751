//! Types exchanged with the chat host
//!
//! The live connection lives in `crate::discord`. Everything the dispatcher and
//! the commands need from it is expressed here: inbound events and the
//! [`Host`] trait for outbound calls.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Milliseconds between the Unix epoch and the first second of 2015
pub const DISCORD_EPOCH_MS: u64 = 1_420_070_400_000;

/// Message flag that hides a message from everyone but the invoker
pub const EPHEMERAL_FLAG: u64 = 1 << 6;

/// Creation time encoded in a snowflake id
pub fn snowflake_timestamp(id: u64) -> DateTime<Utc> {
    let millis = (id >> 22) + DISCORD_EPOCH_MS;
    DateTime::from_timestamp_millis(millis as i64).unwrap_or_default()
}

/// A user as seen in an inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: u64,
    /// Display tag, e.g. `name#1234` or just `name`
    pub tag: String,
    pub bot: bool,
}

impl Author {
    /// Mention markup for this user
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

/// The guild an event came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildRef {
    pub id: u64,
    pub name: Option<String>,
}

/// Where an event happened, for logging
pub fn origin(guild: Option<&GuildRef>) -> String {
    match guild {
        Some(GuildRef { name: Some(name), .. }) => name.clone(),
        Some(GuildRef { id, name: None }) => format!("guild {}", id),
        None => "DM".to_string(),
    }
}

/// A newly created chat message
#[derive(Debug, Clone)]
pub struct TextMessage {
    pub id: u64,
    pub author: Author,
    pub content: String,
    pub mentions: Vec<Author>,
    pub channel_id: u64,
    pub guild: Option<GuildRef>,
}

impl TextMessage {
    pub fn created_at(&self) -> DateTime<Utc> {
        snowflake_timestamp(self.id)
    }
}

/// What kind of interaction an invocation is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationKind {
    /// A slash command typed in the chat input
    ChatInput,
    /// A user or message context menu command
    ContextMenu,
    /// An autocomplete request for an option
    Autocomplete,
}

/// The value of one option in a structured invocation
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    String(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
    User(u64),
    Channel(u64),
    Role(u64),
    Mentionable(u64),
    Attachment(u64),
    Unsupported,
}

/// A structured command invocation
#[derive(Debug, Clone)]
pub struct StructuredInvocation {
    pub id: u64,
    /// Interaction token used for responses and follow-ups
    pub token: String,
    pub kind: InvocationKind,
    pub command_name: String,
    pub user: Author,
    pub options: HashMap<String, OptionValue>,
    pub channel_id: u64,
    pub guild: Option<GuildRef>,
}

impl StructuredInvocation {
    pub fn created_at(&self) -> DateTime<Utc> {
        snowflake_timestamp(self.id)
    }

    /// The user id passed for option `name`, if any
    pub fn user_option(&self, name: &str) -> Option<u64> {
        match self.options.get(name) {
            Some(OptionValue::User(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn string_option(&self, name: &str) -> Option<&str> {
        match self.options.get(name) {
            Some(OptionValue::String(value)) => Some(value),
            _ => None,
        }
    }
}

/// One field of an embed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

/// A rich embed attached to a message
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Outbound message content
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplyContent {
    pub content: Option<String>,
    pub embeds: Vec<Embed>,
    /// Visible only to the invoker. Ignored for plain channel messages.
    pub ephemeral: bool,
}

impl ReplyContent {
    pub fn text(content: impl Into<String>) -> Self {
        ReplyContent {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn embed(embed: Embed) -> Self {
        ReplyContent {
            embeds: vec![embed],
            ..Default::default()
        }
    }

    pub fn ephemeral(mut self) -> Self {
        self.ephemeral = true;
        self
    }
}

impl From<&str> for ReplyContent {
    fn from(content: &str) -> Self {
        ReplyContent::text(content)
    }
}

impl From<String> for ReplyContent {
    fn from(content: String) -> Self {
        ReplyContent::text(content)
    }
}

/// Initial response to a structured invocation
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionResponse {
    Message(ReplyContent),
    /// Acknowledge now, edit the original response later
    Defer { ephemeral: bool },
}

/// A message the host accepted
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub id: u64,
    pub channel_id: u64,
    pub created_at: DateTime<Utc>,
}

/// The bot's own account
#[derive(Debug, Clone, PartialEq)]
pub struct BotIdentity {
    pub id: u64,
    pub tag: String,
    pub avatar_url: String,
}

impl fmt::Display for BotIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag)
    }
}

/// Outbound operations on the chat host
#[async_trait]
pub trait Host: Send + Sync {
    /// Post a message to a channel, optionally as a reply to `reply_to`
    async fn send_message(
        &self,
        channel_id: u64,
        reply_to: Option<u64>,
        reply: ReplyContent,
    ) -> Result<SentMessage>;

    /// Replace the text of a message the bot sent
    async fn edit_message(&self, channel_id: u64, message_id: u64, content: &str) -> Result<()>;

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<()>;

    /// Send the initial response to an invocation
    async fn respond(
        &self,
        invocation: &StructuredInvocation,
        response: InteractionResponse,
    ) -> Result<()>;

    /// Fetch the message created by the initial response
    async fn original_response(&self, invocation: &StructuredInvocation) -> Result<SentMessage>;

    async fn edit_response(&self, invocation: &StructuredInvocation, content: &str) -> Result<()>;

    /// Send an additional message after the initial response
    async fn follow_up(
        &self,
        invocation: &StructuredInvocation,
        reply: ReplyContent,
    ) -> Result<SentMessage>;

    /// Heartbeat round-trip of the gateway connection, once known
    async fn gateway_latency(&self) -> Option<Duration>;

    /// The bot's own account, once the connection is ready
    async fn bot_identity(&self) -> Option<BotIdentity>;
}
