//! Pre-tokenized command arguments handed over by the dispatcher.

use std::collections::{HashMap, HashSet};

/// Arguments of one matched command.
///
/// The dispatcher has already matched the command pattern; keyword literals
/// (`mode`, `log`, `via`, `truncate`, `all`, ...) arrive as booleans, single
/// placeholders as strings, and variadic placeholders as lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandArgs {
    pub bools: HashSet<String>,
    pub strings: HashMap<String, String>,
    pub lists: HashMap<String, Vec<String>>,
}

impl CommandArgs {
    /// Create empty args.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set a boolean keyword.
    pub fn flag(mut self, name: impl Into<String>) -> Self {
        self.bools.insert(name.into());
        self
    }

    /// Builder: set a string argument.
    pub fn string(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.strings.insert(name.into(), value.into());
        self
    }

    /// Builder: set a list argument.
    pub fn list<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lists
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Whether a boolean keyword was given.
    pub fn has(&self, name: &str) -> bool {
        self.bools.contains(name)
    }

    /// Get a string argument.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.strings.get(name).map(String::as_str)
    }

    /// Get a list argument (empty when absent).
    pub fn get_list(&self, name: &str) -> &[String] {
        self.lists.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}
