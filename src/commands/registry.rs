use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::commands::basic::{HelloCommand, HelpCommand, PingCommand, UptimeCommand};
use crate::commands::eight_ball::EightBallCommand;
use crate::commands::{CommandDescriptor, DescriptorError};

/// Failure to admit one command definition
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Malformed(#[from] DescriptorError),
    #[error("command name `{0}` is already registered")]
    Duplicate(String),
}

/// An enumerable provider of command definitions
pub trait CommandSource {
    /// List every definition. An `Err` means the source itself could not be read.
    fn definitions(&self) -> anyhow::Result<Vec<Result<CommandDescriptor, DescriptorError>>>;
}

/// The commands compiled into the bot
pub struct BuiltinCommands;

impl CommandSource for BuiltinCommands {
    fn definitions(&self) -> anyhow::Result<Vec<Result<CommandDescriptor, DescriptorError>>> {
        Ok(vec![
            HelloCommand::descriptor(),
            HelpCommand::descriptor(),
            PingCommand::descriptor(),
            UptimeCommand::descriptor(),
            EightBallCommand::descriptor(),
        ])
    }
}

/// Name-keyed lookup tables for both invocation styles
///
/// Built once at startup and read-only afterwards.
#[derive(Default)]
pub struct CommandRegistry {
    by_text_name: HashMap<String, Arc<CommandDescriptor>>,
    by_structured_name: HashMap<String, Arc<CommandDescriptor>>,
    /// Every admitted descriptor, in load order
    ordered: Vec<Arc<CommandDescriptor>>,
}

impl CommandRegistry {
    /// Create a new empty command registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from every definition `source` provides
    ///
    /// Rejected definitions are logged and skipped. If the source cannot be
    /// enumerated the error is logged and the registry is returned empty.
    pub fn load<S: CommandSource + ?Sized>(source: &S) -> Self {
        let mut registry = Self::new();

        match source.definitions() {
            Ok(definitions) => {
                for definition in definitions {
                    let result = definition
                        .map_err(LoadError::from)
                        .and_then(|descriptor| registry.register(descriptor));
                    if let Err(e) = result {
                        warn!(error = %e, "Skipping command definition");
                    }
                }
            }
            Err(e) => {
                error!(error = ?e, "Error loading commands");
            }
        }

        info!("Loaded {} commands successfully", registry.text_len());
        registry
    }

    /// Admit one descriptor
    ///
    /// A name already taken in either table is refused; the first definition stays.
    pub fn register(&mut self, descriptor: CommandDescriptor) -> Result<(), LoadError> {
        let name = descriptor.name().to_string();
        let structured_name = descriptor.schema().map(|schema| schema.name.clone());

        if self.by_text_name.contains_key(&name) {
            return Err(LoadError::Duplicate(name));
        }
        if let Some(structured_name) = &structured_name {
            if self.by_structured_name.contains_key(structured_name) {
                return Err(LoadError::Duplicate(structured_name.clone()));
            }
        }

        let descriptor = Arc::new(descriptor);
        self.by_text_name.insert(name, descriptor.clone());
        if let Some(structured_name) = structured_name {
            self.by_structured_name
                .insert(structured_name, descriptor.clone());
        }
        self.ordered.push(descriptor);

        Ok(())
    }

    /// Look up a command by its text name
    pub fn get_text<S: AsRef<str>>(&self, name: S) -> Option<Arc<CommandDescriptor>> {
        self.by_text_name.get(name.as_ref()).cloned()
    }

    /// Look up a command by its structured name
    pub fn get_structured<S: AsRef<str>>(&self, name: S) -> Option<Arc<CommandDescriptor>> {
        self.by_structured_name.get(name.as_ref()).cloned()
    }

    /// All descriptors in load order
    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<CommandDescriptor>> {
        self.ordered.iter()
    }

    /// Descriptors that take part in structured dispatch, in load order
    pub fn structured(&self) -> impl Iterator<Item = &Arc<CommandDescriptor>> {
        self.ordered.iter().filter(|d| d.schema().is_some())
    }

    /// Number of text-dispatchable descriptors
    pub fn text_len(&self) -> usize {
        self.by_text_name.len()
    }

    pub fn structured_len(&self) -> usize {
        self.by_structured_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}
