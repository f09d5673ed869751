//! Discord REST API client
//!
//! Replies, interaction responses and command registration all go through this
//! client. The gateway connection only delivers events.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client as HttpClient, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::commands::{CommandEndpoint, CommandScope, CommandSchema};
use crate::host::{
    BotIdentity, EPHEMERAL_FLAG, Embed, Host, InteractionResponse, ReplyContent, SentMessage,
    StructuredInvocation,
};

pub const DEFAULT_BASE_URL: &str = "https://discord.com/api/v10";
const USER_AGENT: &str = concat!(
    "DiscordBot (",
    env!("CARGO_PKG_NAME"),
    ", ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// Interaction callback type for a message response
const CALLBACK_MESSAGE: u8 = 4;
/// Interaction callback type for a deferred message response
const CALLBACK_DEFERRED: u8 = 5;

/// Body of a message create/edit or interaction message
#[derive(Debug, Default, Serialize)]
struct MessagePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    embeds: Vec<Embed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    flags: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_reference: Option<MessageReference>,
}

impl MessagePayload {
    fn from_reply(reply: ReplyContent) -> Self {
        MessagePayload {
            content: reply.content,
            embeds: reply.embeds,
            flags: reply.ephemeral.then_some(EPHEMERAL_FLAG),
            message_reference: None,
        }
    }

    fn text(content: &str) -> Self {
        MessagePayload {
            content: Some(content.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize)]
struct MessageReference {
    message_id: String,
    fail_if_not_exists: bool,
}

#[derive(Debug, Serialize)]
struct InteractionCallback {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<MessagePayload>,
}

/// The subset of a message object the bot reads back
#[derive(Debug, Deserialize)]
struct MessageResponse {
    id: String,
    channel_id: String,
    timestamp: DateTime<Utc>,
}

impl MessageResponse {
    fn into_sent(self) -> Result<SentMessage> {
        Ok(SentMessage {
            id: self.id.parse()?,
            channel_id: self.channel_id.parse()?,
            created_at: self.timestamp,
        })
    }
}

/// REST client for the Discord API
pub struct DiscordRestClient {
    /// HTTP client for API calls
    http_client: HttpClient,
    base_url: String,
    token: String,
    application_id: u64,
    /// Latest shard heartbeat latency, fed by the gateway
    gateway_latency: RwLock<Option<Duration>>,
    /// Set once the gateway reports ready
    identity: RwLock<Option<BotIdentity>>,
}

impl DiscordRestClient {
    /// Create a new client for the production API
    ///
    /// # Arguments
    /// * `token` - Bot token
    /// * `application_id` - The application the bot belongs to
    pub fn new(token: impl Into<String>, application_id: u64) -> Result<Self> {
        Self::with_base_url(token, application_id, DEFAULT_BASE_URL)
    }

    /// Create a client against another base URL, such as a mock server
    pub fn with_base_url(
        token: impl Into<String>,
        application_id: u64,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            application_id,
            gateway_latency: RwLock::new(None),
            identity: RwLock::new(None),
        })
    }

    pub async fn set_gateway_latency(&self, latency: Option<Duration>) {
        *self.gateway_latency.write().await = latency;
    }

    pub async fn set_identity(&self, identity: BotIdentity) {
        *self.identity.write().await = Some(identity);
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http_client
            .request(method, format!("{}/{}", self.base_url, path))
            .header("Authorization", format!("Bot {}", self.token))
    }

    /// Send a request and fail on any non-success status
    async fn send(&self, request: RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            error!("API error: {} {}", status, error_text);
            return Err(anyhow!("Failed to {}: {} {}", what, status, error_text));
        }

        Ok(response)
    }

    async fn send_for_message(&self, request: RequestBuilder, what: &str) -> Result<SentMessage> {
        let message: MessageResponse = self.send(request, what).await?.json().await?;
        message.into_sent()
    }
}

#[async_trait]
impl Host for DiscordRestClient {
    async fn send_message(
        &self,
        channel_id: u64,
        reply_to: Option<u64>,
        reply: ReplyContent,
    ) -> Result<SentMessage> {
        let mut payload = MessagePayload::from_reply(reply);
        // Flags such as ephemeral only apply to interaction responses
        payload.flags = None;
        payload.message_reference = reply_to.map(|id| MessageReference {
            message_id: id.to_string(),
            fail_if_not_exists: false,
        });

        debug!("Sending message to channel {}", channel_id);
        let request = self
            .request(Method::POST, &format!("channels/{}/messages", channel_id))
            .json(&payload);
        self.send_for_message(request, "send message").await
    }

    async fn edit_message(&self, channel_id: u64, message_id: u64, content: &str) -> Result<()> {
        let request = self
            .request(
                Method::PATCH,
                &format!("channels/{}/messages/{}", channel_id, message_id),
            )
            .json(&MessagePayload::text(content));
        self.send(request, "edit message").await?;
        Ok(())
    }

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<()> {
        let request = self.request(
            Method::DELETE,
            &format!("channels/{}/messages/{}", channel_id, message_id),
        );
        self.send(request, "delete message").await?;
        Ok(())
    }

    async fn respond(
        &self,
        invocation: &StructuredInvocation,
        response: InteractionResponse,
    ) -> Result<()> {
        let callback = match response {
            InteractionResponse::Message(reply) => InteractionCallback {
                kind: CALLBACK_MESSAGE,
                data: Some(MessagePayload::from_reply(reply)),
            },
            InteractionResponse::Defer { ephemeral } => InteractionCallback {
                kind: CALLBACK_DEFERRED,
                data: ephemeral.then(|| MessagePayload {
                    flags: Some(EPHEMERAL_FLAG),
                    ..Default::default()
                }),
            },
        };

        // Returns 204 No Content on success
        let request = self
            .request(
                Method::POST,
                &format!("interactions/{}/{}/callback", invocation.id, invocation.token),
            )
            .json(&callback);
        self.send(request, "respond to interaction").await?;
        Ok(())
    }

    async fn original_response(&self, invocation: &StructuredInvocation) -> Result<SentMessage> {
        let request = self.request(
            Method::GET,
            &format!(
                "webhooks/{}/{}/messages/@original",
                self.application_id, invocation.token
            ),
        );
        self.send_for_message(request, "fetch original response").await
    }

    async fn edit_response(&self, invocation: &StructuredInvocation, content: &str) -> Result<()> {
        let request = self
            .request(
                Method::PATCH,
                &format!(
                    "webhooks/{}/{}/messages/@original",
                    self.application_id, invocation.token
                ),
            )
            .json(&MessagePayload::text(content));
        self.send(request, "edit original response").await?;
        Ok(())
    }

    async fn follow_up(
        &self,
        invocation: &StructuredInvocation,
        reply: ReplyContent,
    ) -> Result<SentMessage> {
        let request = self
            .request(
                Method::POST,
                &format!("webhooks/{}/{}", self.application_id, invocation.token),
            )
            .json(&MessagePayload::from_reply(reply));
        self.send_for_message(request, "send follow-up").await
    }

    async fn gateway_latency(&self) -> Option<Duration> {
        *self.gateway_latency.read().await
    }

    async fn bot_identity(&self) -> Option<BotIdentity> {
        self.identity.read().await.clone()
    }
}

#[async_trait]
impl CommandEndpoint for DiscordRestClient {
    async fn replace_commands(
        &self,
        application_id: u64,
        scope: CommandScope,
        commands: &[CommandSchema],
    ) -> Result<()> {
        let path = match scope {
            CommandScope::Global => format!("applications/{}/commands", application_id),
            CommandScope::Guild(guild_id) => {
                format!("applications/{}/guilds/{}/commands", application_id, guild_id)
            }
        };

        let request = self.request(Method::PUT, &path).json(commands);
        self.send(request, "register commands").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{BuiltinCommands, CommandRegistry, sync_structured_commands};
    use crate::test_helpers::test_invocation;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn message_json(id: &str) -> String {
        json!({
            "id": id,
            "channel_id": "789",
            "timestamp": "2024-05-01T12:00:00.500000+00:00",
            "content": "Pinging..."
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_send_reply() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/channels/789/messages")
            .match_header("authorization", "Bot test_token")
            .match_body(Matcher::Json(json!({
                "content": "hi",
                "message_reference": {"message_id": "55", "fail_if_not_exists": false}
            })))
            .with_status(200)
            .with_body(message_json("1001"))
            .create_async()
            .await;

        let client = DiscordRestClient::with_base_url("test_token", 42, server.url()).unwrap();
        let sent = client
            .send_message(789, Some(55), ReplyContent::text("hi").ephemeral())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(sent.id, 1001);
        assert_eq!(sent.channel_id, 789);
        assert_eq!(sent.created_at.timestamp_millis(), 1714564800500);
    }

    #[tokio::test]
    async fn test_ephemeral_interaction_response() {
        let mut server = Server::new_async().await;
        let invocation = test_invocation("ping");
        let mock = server
            .mock(
                "POST",
                format!("/interactions/{}/interaction_token/callback", invocation.id).as_str(),
            )
            .match_body(Matcher::Json(json!({
                "type": 4,
                "data": {"content": "nope", "flags": 64}
            })))
            .with_status(204)
            .create_async()
            .await;

        let client = DiscordRestClient::with_base_url("test_token", 42, server.url()).unwrap();
        client
            .respond(
                &invocation,
                InteractionResponse::Message(ReplyContent::text("nope").ephemeral()),
            )
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_deferred_interaction_response() {
        let mut server = Server::new_async().await;
        let invocation = test_invocation("uptime");
        let path = format!("/interactions/{}/interaction_token/callback", invocation.id);
        let quiet = server
            .mock("POST", path.as_str())
            .match_body(Matcher::Json(json!({"type": 5, "data": {"flags": 64}})))
            .with_status(204)
            .create_async()
            .await;
        let public = server
            .mock("POST", path.as_str())
            .match_body(Matcher::Json(json!({"type": 5})))
            .with_status(204)
            .create_async()
            .await;

        let client = DiscordRestClient::with_base_url("test_token", 42, server.url()).unwrap();
        client
            .respond(&invocation, InteractionResponse::Defer { ephemeral: true })
            .await
            .unwrap();
        client
            .respond(&invocation, InteractionResponse::Defer { ephemeral: false })
            .await
            .unwrap();

        quiet.assert_async().await;
        public.assert_async().await;
    }

    #[tokio::test]
    async fn test_follow_up_and_edit_use_webhook_routes() {
        let mut server = Server::new_async().await;
        let invocation = test_invocation("ping");
        let follow_up = server
            .mock("POST", "/webhooks/42/interaction_token")
            .with_status(200)
            .with_body(message_json("2002"))
            .create_async()
            .await;
        let edit = server
            .mock("PATCH", "/webhooks/42/interaction_token/messages/@original")
            .match_body(Matcher::Json(json!({"content": "🏓 Pong!"})))
            .with_status(200)
            .with_body(message_json("2001"))
            .create_async()
            .await;

        let client = DiscordRestClient::with_base_url("test_token", 42, server.url()).unwrap();
        let sent = client
            .follow_up(&invocation, ReplyContent::text("later"))
            .await
            .unwrap();
        client.edit_response(&invocation, "🏓 Pong!").await.unwrap();

        follow_up.assert_async().await;
        edit.assert_async().await;
        assert_eq!(sent.id, 2002);
    }

    #[tokio::test]
    async fn test_api_error_is_returned() {
        let mut server = Server::new_async().await;
        server
            .mock("DELETE", "/channels/789/messages/5")
            .with_status(403)
            .with_body(r#"{"message": "Missing Permissions", "code": 50013}"#)
            .create_async()
            .await;

        let client = DiscordRestClient::with_base_url("test_token", 42, server.url()).unwrap();
        let err = client.delete_message(789, 5).await.unwrap_err();
        assert!(err.to_string().contains("Missing Permissions"));
    }

    #[tokio::test]
    async fn test_command_sync_is_full_replace_and_idempotent() {
        let mut server = Server::new_async().await;
        let registry = CommandRegistry::load(&BuiltinCommands);
        let expected: Vec<CommandSchema> = registry
            .structured()
            .filter_map(|d| d.schema().cloned())
            .collect();

        let mock = server
            .mock("PUT", "/applications/42/guilds/7/commands")
            .match_header("authorization", "Bot test_token")
            .match_body(Matcher::Json(serde_json::to_value(&expected).unwrap()))
            .with_status(200)
            .with_body("[]")
            .expect(2)
            .create_async()
            .await;

        let client = DiscordRestClient::with_base_url("test_token", 42, server.url()).unwrap();
        for _ in 0..2 {
            let pushed = sync_structured_commands(&registry, &client, 42, CommandScope::Guild(7))
                .await
                .unwrap();
            assert_eq!(pushed, 4);
        }

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_global_scope_route() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/applications/42/commands")
            .match_body(Matcher::Json(json!([])))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let client = DiscordRestClient::with_base_url("test_token", 42, server.url()).unwrap();
        client
            .replace_commands(42, CommandScope::Global, &[])
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_latency_and_identity_start_unknown() {
        let client = DiscordRestClient::new("test_token", 42).unwrap();
        assert_eq!(client.gateway_latency().await, None);
        assert_eq!(client.bot_identity().await, None);

        client.set_gateway_latency(Some(Duration::from_millis(80))).await;
        assert_eq!(client.gateway_latency().await, Some(Duration::from_millis(80)));
    }
}
