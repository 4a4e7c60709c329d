//! Command surface over the plumbing engine.
//!
//! The dispatcher matches command patterns and hands over pre-tokenized
//! [`CommandArgs`]. Every command is a [`Command`] in a [`CommandRegistry`]:
//!
//! ```text
//! CommandRegistry
//! ├── plumb   wire endpoints, list pipelines
//! ├── pipe    status, mode, log, via, send
//! └── clear   delete pipes and pipelines, reset pipe settings
//! ```

mod clear;
mod pipe;
mod plumb;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use plumb_types::{CommandArgs, CommandResponse, PlumbError, PlumbResult};

use crate::namespace;
use crate::plumber::Plumber;
use crate::registry::Registry;

/// Help and usage of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSchema {
    pub name: String,
    /// One-line summary.
    pub help_short: String,
    pub help_long: String,
    /// Accepted argument patterns.
    pub patterns: Vec<String>,
}

impl CommandSchema {
    pub fn new(name: impl Into<String>, help_short: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help_short: help_short.into(),
            help_long: String::new(),
            patterns: Vec::new(),
        }
    }

    pub fn long(mut self, help: impl Into<String>) -> Self {
        self.help_long = help.into();
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    /// Usage lines followed by the long help.
    pub fn render(&self) -> String {
        let mut out = format!("{} - {}\n", self.name, self.help_short);
        if !self.patterns.is_empty() {
            out.push_str("\nUsage:\n");
            for pattern in &self.patterns {
                out.push_str("  ");
                out.push_str(pattern);
                out.push('\n');
            }
        }
        if !self.help_long.is_empty() {
            out.push('\n');
            out.push_str(&self.help_long);
            if !self.help_long.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }
}

/// Caller state a command runs with.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Namespace bare pipe names are qualified into.
    pub namespace: String,
    pub plumber: Arc<Plumber>,
}

impl CommandContext {
    pub fn new(namespace: impl Into<String>, plumber: Arc<Plumber>) -> Self {
        Self {
            namespace: namespace.into(),
            plumber,
        }
    }

    pub fn registry(&self) -> &Registry {
        self.plumber.registry()
    }

    /// Qualify `name` into this context's namespace.
    pub fn qualify(&self, name: &str) -> String {
        namespace::qualify(&self.namespace, name)
    }
}

/// A command that can be executed.
#[async_trait]
pub trait Command: Send + Sync {
    /// The command's name (used for lookup).
    fn name(&self) -> &str;

    fn schema(&self) -> CommandSchema;

    async fn execute(&self, ctx: &CommandContext, args: &CommandArgs) -> PlumbResult<CommandResponse>;
}

/// Commands by name.
#[derive(Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, Arc<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in command.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        register_builtins(&mut registry);
        registry
    }

    pub fn register(&mut self, command: impl Command + 'static) {
        self.commands
            .insert(command.name().to_string(), Arc::new(command));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.commands.keys().map(String::as_str).collect()
    }

    pub fn schemas(&self) -> Vec<CommandSchema> {
        self.commands.values().map(|c| c.schema()).collect()
    }

    /// Rendered help for one command.
    pub fn help(&self, name: &str) -> Option<String> {
        self.commands.get(name).map(|c| c.schema().render())
    }

    #[tracing::instrument(level = "debug", skip(self, ctx, args), fields(namespace = %ctx.namespace), err)]
    pub async fn execute(
        &self,
        name: &str,
        ctx: &CommandContext,
        args: &CommandArgs,
    ) -> PlumbResult<CommandResponse> {
        let command = self
            .get(name)
            .ok_or_else(|| PlumbError::invalid(format!("unknown command: {name}")))?;
        command.execute(ctx, args).await
    }
}

/// Register all built-in commands with the registry.
pub fn register_builtins(registry: &mut CommandRegistry) {
    registry.register(clear::Clear);
    registry.register(pipe::Pipe);
    registry.register(plumb::Plumb);
}
