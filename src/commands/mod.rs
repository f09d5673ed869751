mod basic;
mod eight_ball;
mod handler;
mod registry;
mod sync;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_repr::Serialize_repr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

use crate::host::{
    Host, InteractionResponse, ReplyContent, SentMessage, StructuredInvocation, TextMessage,
};

pub use handler::{CommandDispatcher, DispatchSettings};
pub use registry::{BuiltinCommands, CommandRegistry, CommandSource};
pub use sync::{CommandEndpoint, CommandScope, sync_structured_commands};

/// Handler for commands typed as prefixed chat text
#[async_trait]
pub trait TextCommand: Send + Sync {
    /// Run the command
    ///
    /// # Arguments
    /// * `ctx` - The invocation, with reply helpers
    /// * `args` - Whitespace-separated words after the command name
    async fn execute(&self, ctx: &TextContext<'_>, args: &[String]) -> Result<()>;
}

/// Handler for structured (slash) commands
#[async_trait]
pub trait StructuredCommand: Send + Sync {
    async fn execute(&self, ctx: &StructuredContext<'_>) -> Result<()>;
}

/// Type of a structured command option, as numbered on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr)]
#[repr(u8)]
pub enum OptionType {
    String = 3,
    User = 6,
}

/// One named parameter of a structured command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionSchema {
    #[serde(rename = "type")]
    pub kind: OptionType,
    pub name: String,
    pub description: String,
    pub required: bool,
}

/// Declarative description of a structured command, serialized as sent for registration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandSchema {
    pub name: String,
    pub description: String,
    /// Always 1, a chat input command
    #[serde(rename = "type")]
    kind: u8,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionSchema>,
}

impl CommandSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        CommandSchema {
            name: name.into(),
            description: description.into(),
            kind: 1,
            options: Vec::new(),
        }
    }

    /// Append an option; options keep the order they are added in
    pub fn option(
        mut self,
        kind: OptionType,
        name: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.options.push(OptionSchema {
            kind,
            name: name.into(),
            description: description.into(),
            required,
        });
        self
    }
}

/// Which invocation styles a descriptor supports
#[derive(Clone)]
pub enum CommandKind {
    Text(Arc<dyn TextCommand>),
    Structured {
        schema: CommandSchema,
        handler: Arc<dyn StructuredCommand>,
    },
    Both {
        schema: CommandSchema,
        structured: Arc<dyn StructuredCommand>,
        text: Arc<dyn TextCommand>,
    },
}

/// Reasons a descriptor is refused
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("command name is empty")]
    EmptyName,
    #[error("command name `{0}` must be lowercase")]
    NotLowercase(String),
    #[error("command `{name}` declares structured schema `{schema}`")]
    SchemaNameMismatch { name: String, schema: String },
    #[error("command `{0}` has no handler")]
    NoHandler(String),
}

/// Static definition of one command
#[derive(Clone)]
pub struct CommandDescriptor {
    name: String,
    description: String,
    usage: Option<String>,
    kind: CommandKind,
}

impl CommandDescriptor {
    /// Start building a descriptor named `name`
    pub fn builder(name: impl Into<String>, description: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder {
            name: name.into(),
            description: description.into(),
            usage: None,
            schema: None,
            structured: None,
            text: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Arguments shown after the command name in help output
    pub fn usage(&self) -> Option<&str> {
        self.usage.as_deref()
    }

    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    pub fn schema(&self) -> Option<&CommandSchema> {
        match &self.kind {
            CommandKind::Text(_) => None,
            CommandKind::Structured { schema, .. } | CommandKind::Both { schema, .. } => {
                Some(schema)
            }
        }
    }

    pub fn text_handler(&self) -> Option<&Arc<dyn TextCommand>> {
        match &self.kind {
            CommandKind::Text(text) | CommandKind::Both { text, .. } => Some(text),
            CommandKind::Structured { .. } => None,
        }
    }

    pub fn structured_handler(&self) -> Option<&Arc<dyn StructuredCommand>> {
        match &self.kind {
            CommandKind::Structured { handler, .. } => Some(handler),
            CommandKind::Both { structured, .. } => Some(structured),
            CommandKind::Text(_) => None,
        }
    }
}

/// Builder that checks a descriptor's shape before it can exist
pub struct DescriptorBuilder {
    name: String,
    description: String,
    usage: Option<String>,
    schema: Option<CommandSchema>,
    structured: Option<Arc<dyn StructuredCommand>>,
    text: Option<Arc<dyn TextCommand>>,
}

impl DescriptorBuilder {
    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    pub fn text(mut self, handler: Arc<dyn TextCommand>) -> Self {
        self.text = Some(handler);
        self
    }

    pub fn structured(mut self, schema: CommandSchema, handler: Arc<dyn StructuredCommand>) -> Self {
        self.schema = Some(schema);
        self.structured = Some(handler);
        self
    }

    pub fn build(self) -> Result<CommandDescriptor, DescriptorError> {
        if self.name.is_empty() {
            return Err(DescriptorError::EmptyName);
        }
        if self.name != self.name.to_lowercase() {
            return Err(DescriptorError::NotLowercase(self.name));
        }

        let kind = match (self.schema.zip(self.structured), self.text) {
            (Some((schema, handler)), text) => {
                if schema.name != self.name {
                    return Err(DescriptorError::SchemaNameMismatch {
                        name: self.name,
                        schema: schema.name,
                    });
                }
                match text {
                    Some(text) => CommandKind::Both {
                        schema,
                        structured: handler,
                        text,
                    },
                    None => CommandKind::Structured { schema, handler },
                }
            }
            (None, Some(text)) => CommandKind::Text(text),
            (None, None) => return Err(DescriptorError::NoHandler(self.name)),
        };

        Ok(CommandDescriptor {
            name: self.name,
            description: self.description,
            usage: self.usage,
            kind,
        })
    }
}

/// Everything a command may read while running
pub struct CommandEnv<'a> {
    pub host: &'a dyn Host,
    pub registry: &'a CommandRegistry,
    pub settings: &'a DispatchSettings,
}

/// A text invocation in progress
pub struct TextContext<'a> {
    pub env: CommandEnv<'a>,
    pub message: &'a TextMessage,
    replied: AtomicBool,
}

impl<'a> TextContext<'a> {
    pub fn new(env: CommandEnv<'a>, message: &'a TextMessage) -> Self {
        TextContext {
            env,
            message,
            replied: AtomicBool::new(false),
        }
    }

    /// Whether a reply has already been sent for this message
    pub fn replied(&self) -> bool {
        self.replied.load(Ordering::SeqCst)
    }

    /// Reply to the invoking message
    pub async fn reply(&self, reply: impl Into<ReplyContent> + Send) -> Result<SentMessage> {
        let sent = self
            .env
            .host
            .send_message(self.message.channel_id, Some(self.message.id), reply.into())
            .await?;
        self.replied.store(true, Ordering::SeqCst);
        Ok(sent)
    }

    /// Post to the invoking channel without referencing the message
    pub async fn follow_up(&self, reply: impl Into<ReplyContent> + Send) -> Result<SentMessage> {
        self.env
            .host
            .send_message(self.message.channel_id, None, reply.into())
            .await
    }

    pub async fn edit(&self, sent: &SentMessage, content: &str) -> Result<()> {
        self.env
            .host
            .edit_message(sent.channel_id, sent.id, content)
            .await
    }
}

/// A structured invocation in progress
pub struct StructuredContext<'a> {
    pub env: CommandEnv<'a>,
    pub invocation: &'a StructuredInvocation,
    replied: AtomicBool,
    deferred: AtomicBool,
}

impl<'a> StructuredContext<'a> {
    pub fn new(env: CommandEnv<'a>, invocation: &'a StructuredInvocation) -> Self {
        StructuredContext {
            env,
            invocation,
            replied: AtomicBool::new(false),
            deferred: AtomicBool::new(false),
        }
    }

    /// Whether the initial response has been sent or deferred
    pub fn responded(&self) -> bool {
        self.replied.load(Ordering::SeqCst) || self.deferred.load(Ordering::SeqCst)
    }

    /// Send the initial response and return the message it created
    pub async fn reply(&self, reply: impl Into<ReplyContent> + Send) -> Result<SentMessage> {
        self.reply_quietly(reply).await?;
        self.env.host.original_response(self.invocation).await
    }

    /// Send the initial response without fetching the message back
    pub async fn reply_quietly(&self, reply: impl Into<ReplyContent> + Send) -> Result<()> {
        self.env
            .host
            .respond(self.invocation, InteractionResponse::Message(reply.into()))
            .await?;
        self.replied.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Acknowledge the invocation, to answer later with [`Self::edit_reply`]
    pub async fn defer(&self, ephemeral: bool) -> Result<()> {
        self.env
            .host
            .respond(self.invocation, InteractionResponse::Defer { ephemeral })
            .await?;
        self.deferred.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn edit_reply(&self, content: &str) -> Result<()> {
        self.env.host.edit_response(self.invocation, content).await
    }

    pub async fn follow_up(&self, reply: impl Into<ReplyContent> + Send) -> Result<SentMessage> {
        self.env.host.follow_up(self.invocation, reply.into()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    struct Noop;

    #[async_trait]
    impl TextCommand for Noop {
        async fn execute(&self, _ctx: &TextContext<'_>, _args: &[String]) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl StructuredCommand for Noop {
        async fn execute(&self, _ctx: &StructuredContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_builder_picks_kind() {
        let text = CommandDescriptor::builder("echo", "Echo").text(Arc::new(Noop)).build().unwrap();
        assert!(matches!(text.kind(), CommandKind::Text(_)));
        assert!(text.schema().is_none());

        let structured = CommandDescriptor::builder("echo", "Echo")
            .structured(CommandSchema::new("echo", "Echo"), Arc::new(Noop))
            .build()
            .unwrap();
        assert!(matches!(structured.kind(), CommandKind::Structured { .. }));
        assert!(structured.text_handler().is_none());

        let both = CommandDescriptor::builder("echo", "Echo")
            .structured(CommandSchema::new("echo", "Echo"), Arc::new(Noop))
            .text(Arc::new(Noop))
            .build()
            .unwrap();
        assert!(both.text_handler().is_some());
        assert!(both.structured_handler().is_some());
    }

    #[test]
    fn test_builder_rejects_malformed() {
        assert_eq!(
            CommandDescriptor::builder("", "Nothing").text(Arc::new(Noop)).build().err(),
            Some(DescriptorError::EmptyName)
        );
        assert_eq!(
            CommandDescriptor::builder("Echo", "Echo").text(Arc::new(Noop)).build().err(),
            Some(DescriptorError::NotLowercase("Echo".to_string()))
        );
        assert_eq!(
            CommandDescriptor::builder("echo", "Echo").build().err(),
            Some(DescriptorError::NoHandler("echo".to_string()))
        );
        assert_eq!(
            CommandDescriptor::builder("echo", "Echo")
                .structured(CommandSchema::new("say", "Say"), Arc::new(Noop))
                .build()
                .err(),
            Some(DescriptorError::SchemaNameMismatch {
                name: "echo".to_string(),
                schema: "say".to_string(),
            })
        );
    }

    #[test]
    fn test_schema_wire_form() {
        let schema = CommandSchema::new("hello", "Sends a friendly greeting!").option(
            OptionType::User,
            "user",
            "User to greet",
            false,
        );

        assert_json_eq!(
            serde_json::to_value(&schema).unwrap(),
            json!({
                "name": "hello",
                "description": "Sends a friendly greeting!",
                "type": 1,
                "options": [
                    {"type": 6, "name": "user", "description": "User to greet", "required": false}
                ]
            })
        );

        assert_json_eq!(
            serde_json::to_value(CommandSchema::new("ping", "Pong")).unwrap(),
            json!({"name": "ping", "description": "Pong", "type": 1})
        );
    }
}
