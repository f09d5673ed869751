#![allow(dead_code)]
/// Test helpers for unit tests
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::layer::SubscriberExt;

use crate::commands::DispatchSettings;
use crate::host::{
    Author, BotIdentity, GuildRef, Host, InteractionResponse, InvocationKind, ReplyContent,
    SentMessage, StructuredInvocation, TextMessage,
};
use crate::logging::{LogLevel, Logger, LoggerLayer};

/// An outbound call recorded by [`RecordingHost`]
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    Send {
        channel_id: u64,
        reply_to: Option<u64>,
        reply: ReplyContent,
    },
    Edit {
        channel_id: u64,
        message_id: u64,
        content: String,
    },
    Delete {
        channel_id: u64,
        message_id: u64,
    },
    Respond(InteractionResponse),
    EditResponse(String),
    FollowUp(ReplyContent),
}

/// A host that records every outbound call instead of sending it
pub struct RecordingHost {
    calls: Mutex<Vec<HostCall>>,
    next_id: AtomicU64,
}

impl RecordingHost {
    pub fn new() -> Self {
        RecordingHost {
            calls: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1000),
        }
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: HostCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn sent(&self, channel_id: u64) -> SentMessage {
        SentMessage {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            channel_id,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
impl Host for RecordingHost {
    async fn send_message(
        &self,
        channel_id: u64,
        reply_to: Option<u64>,
        reply: ReplyContent,
    ) -> Result<SentMessage> {
        self.record(HostCall::Send {
            channel_id,
            reply_to,
            reply,
        });
        Ok(self.sent(channel_id))
    }

    async fn edit_message(&self, channel_id: u64, message_id: u64, content: &str) -> Result<()> {
        self.record(HostCall::Edit {
            channel_id,
            message_id,
            content: content.to_string(),
        });
        Ok(())
    }

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<()> {
        self.record(HostCall::Delete {
            channel_id,
            message_id,
        });
        Ok(())
    }

    async fn respond(
        &self,
        _invocation: &StructuredInvocation,
        response: InteractionResponse,
    ) -> Result<()> {
        self.record(HostCall::Respond(response));
        Ok(())
    }

    async fn original_response(&self, invocation: &StructuredInvocation) -> Result<SentMessage> {
        Ok(self.sent(invocation.channel_id))
    }

    async fn edit_response(&self, _invocation: &StructuredInvocation, content: &str) -> Result<()> {
        self.record(HostCall::EditResponse(content.to_string()));
        Ok(())
    }

    async fn follow_up(
        &self,
        invocation: &StructuredInvocation,
        reply: ReplyContent,
    ) -> Result<SentMessage> {
        self.record(HostCall::FollowUp(reply));
        Ok(self.sent(invocation.channel_id))
    }

    async fn gateway_latency(&self) -> Option<Duration> {
        Some(Duration::from_millis(42))
    }

    async fn bot_identity(&self) -> Option<BotIdentity> {
        Some(BotIdentity {
            id: 1,
            tag: "TestBot#0001".to_string(),
            avatar_url: "https://cdn.example/avatar.png".to_string(),
        })
    }
}

/// A snowflake created a moment ago
fn recent_snowflake() -> u64 {
    let millis = Utc::now().timestamp_millis() as u64 - crate::host::DISCORD_EPOCH_MS;
    millis << 22
}

pub fn test_author() -> Author {
    Author {
        id: 123,
        tag: "Test_User".to_string(),
        bot: false,
    }
}

fn test_guild() -> Option<GuildRef> {
    Some(GuildRef {
        id: 456,
        name: Some("test_guild".to_string()),
    })
}

/// A message from a regular user in a guild channel
pub fn test_message(content: &str) -> TextMessage {
    TextMessage {
        id: recent_snowflake(),
        author: test_author(),
        content: content.to_string(),
        mentions: Vec::new(),
        channel_id: 789,
        guild: test_guild(),
    }
}

/// A chat input invocation of `command_name` with no options
pub fn test_invocation(command_name: &str) -> StructuredInvocation {
    StructuredInvocation {
        id: recent_snowflake(),
        token: "interaction_token".to_string(),
        kind: InvocationKind::ChatInput,
        command_name: command_name.to_string(),
        user: test_author(),
        options: HashMap::new(),
        channel_id: 789,
        guild: test_guild(),
    }
}

/// Dispatch settings with the default prefix
pub fn test_settings() -> DispatchSettings {
    DispatchSettings {
        prefix: "!".to_string(),
        embed_color: 0x0099ff,
        delete_command_messages: false,
    }
}

/// Routes `tracing` events on the current thread into a logger writing to a temp dir
pub struct LogCapture {
    file: PathBuf,
    _dir: TempDir,
    _guard: DefaultGuard,
}

impl LogCapture {
    pub fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let logger = Logger::with_console(LogLevel::Debug, dir.path(), Box::new(io::sink()));
        let file = logger.current_log_file();
        let subscriber = tracing_subscriber::registry().with(LoggerLayer::new(logger));

        LogCapture {
            file,
            _dir: dir,
            _guard: tracing::subscriber::set_default(subscriber),
        }
    }

    /// Everything written to the log file so far
    pub fn contents(&self) -> String {
        fs::read_to_string(&self.file).unwrap_or_default()
    }

    /// Record header lines at `level`
    pub fn records(&self, level: LogLevel) -> Vec<String> {
        let tag = format!("] [{}] ", level);
        self.contents()
            .lines()
            .filter(|line| line.starts_with('[') && line.contains(&tag))
            .map(str::to_string)
            .collect()
    }
}
