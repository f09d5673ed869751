use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use tracing::info;

use crate::commands::{CommandRegistry, CommandSchema};

/// Where registered structured commands are visible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScope {
    /// Every guild the application is in
    Global,
    /// A single guild, updated immediately. Used during development.
    Guild(u64),
}

impl fmt::Display for CommandScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandScope::Global => f.write_str("global"),
            CommandScope::Guild(id) => write!(f, "guild {}", id),
        }
    }
}

/// The remote service that publishes structured commands
#[async_trait]
pub trait CommandEndpoint: Send + Sync {
    /// Replace every command registered for `application_id` in `scope` with `commands`
    async fn replace_commands(
        &self,
        application_id: u64,
        scope: CommandScope,
        commands: &[CommandSchema],
    ) -> Result<()>;
}

/// Push every structured schema in the registry, replacing what was registered before
///
/// The push is a full overwrite, so running it again with the same registry
/// leaves the remote state unchanged.
///
/// # Returns
/// The number of commands pushed
pub async fn sync_structured_commands<E: CommandEndpoint + ?Sized>(
    registry: &CommandRegistry,
    endpoint: &E,
    application_id: u64,
    scope: CommandScope,
) -> Result<usize> {
    let schemas: Vec<CommandSchema> = registry
        .structured()
        .filter_map(|descriptor| descriptor.schema().cloned())
        .collect();

    info!("Started refreshing {} application (/) commands ({})", schemas.len(), scope);
    endpoint
        .replace_commands(application_id, scope, &schemas)
        .await?;
    info!("Successfully reloaded application (/) commands.");

    Ok(schemas.len())
}
