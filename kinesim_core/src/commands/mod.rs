//! Text command front door.
//!
//! A command line is `<name> [args...]`, split on whitespace. The first token
//! picks a handler case-insensitively; the rest are handed to it verbatim.
//! Every outcome, including a panicking handler, comes back as a
//! [`CommandResponse`].
//!
//! # Families
//!
//! - [`control`]: process, configuration, clock and scenario control
//! - [`entity`]: entity lifecycle, detail setters and reports
//! - [`terrain`]: elevation tiles, patches and raster utilities

pub mod control;
pub mod entity;
pub mod terrain;

use crate::error::{CoreError, CoreResult};
use crate::runtime::RuntimeContext;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// A named handler invoked from the command line.
pub trait Command: Send + Sync {
    /// Lowercase name the command is registered under.
    fn name(&self) -> &str;

    /// One-line usage shown by `help`.
    fn usage(&self) -> &str;

    /// Runs the command against the runtime.
    ///
    /// # Arguments
    /// * `rt` - Runtime the command acts on
    /// * `args` - Tokens after the command name
    ///
    /// # Returns
    /// Text shown to the operator on success.
    fn execute(&self, rt: &RuntimeContext, args: &[&str]) -> CoreResult<String>;
}

/// Handler signature for table-built commands.
pub type HandlerFn = fn(&RuntimeContext, &[&str]) -> CoreResult<String>;

/// A command backed by a plain function.
#[derive(Clone, Copy)]
pub struct FnCommand {
    name: &'static str,
    usage: &'static str,
    handler: HandlerFn,
}

impl FnCommand {
    pub const fn new(name: &'static str, usage: &'static str, handler: HandlerFn) -> Self {
        Self { name, usage, handler }
    }
}

impl Command for FnCommand {
    fn name(&self) -> &str {
        self.name
    }

    fn usage(&self) -> &str {
        self.usage
    }

    fn execute(&self, rt: &RuntimeContext, args: &[&str]) -> CoreResult<String> {
        (self.handler)(rt, args)
    }
}

/// Outcome of one command line or inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    pub text: String,
}

impl CommandResponse {
    pub fn ok(text: impl Into<String>) -> Self {
        Self { success: true, text: text.into() }
    }

    pub fn fail(text: impl Into<String>) -> Self {
        Self { success: false, text: text.into() }
    }
}

impl From<CoreResult<String>> for CommandResponse {
    fn from(result: CoreResult<String>) -> Self {
        match result {
            Ok(text) => Self::ok(text),
            Err(e) => Self::fail(e.to_string()),
        }
    }
}

/// Table of registered commands keyed by lowercase name.
#[derive(Default)]
pub struct CommandDispatcher {
    commands: BTreeMap<String, Arc<dyn Command>>,
}

impl CommandDispatcher {
    /// Empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher holding every built-in command family.
    pub fn with_builtin() -> CoreResult<Self> {
        let mut dispatcher = Self::new();
        for table in [control::COMMANDS, entity::COMMANDS, terrain::COMMANDS] {
            for command in table {
                dispatcher.register(Arc::new(*command))?;
            }
        }
        Ok(dispatcher)
    }

    /// Adds a command. A name already taken is a configuration error.
    pub fn register(&mut self, command: Arc<dyn Command>) -> CoreResult<()> {
        let key = command.name().to_ascii_lowercase();
        if self.commands.contains_key(&key) {
            return Err(CoreError::DuplicateCommand(key));
        }
        self.commands.insert(key, command);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(&name.to_ascii_lowercase()).cloned()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.commands.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Tokenizes `line` and runs the matching handler.
    pub fn execute(&self, rt: &RuntimeContext, line: &str) -> CommandResponse {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((name, args)) = tokens.split_first() else {
            return CommandResponse::fail(CoreError::EmptyCommand.to_string());
        };
        let Some(command) = self.get(name) else {
            return CommandResponse::fail(CoreError::UnknownCommand(name.to_string()).to_string());
        };

        debug!("Executing {} {:?}", command.name(), args);
        match catch_unwind(AssertUnwindSafe(|| command.execute(rt, args))) {
            Ok(result) => result.into(),
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                CommandResponse::fail(format!("Command '{}' panicked: {}", command.name(), reason))
            }
        }
    }
}

/// Required positional argument.
pub(crate) fn arg<'a>(args: &[&'a str], index: usize, name: &'static str) -> CoreResult<&'a str> {
    args.get(index).copied().ok_or(CoreError::MissingArgument(name))
}

/// Numbers accepted as command arguments.
pub(crate) trait Number: FromStr {
    /// False for NaN and infinities.
    fn is_finite(&self) -> bool {
        true
    }
}

impl Number for usize {}

impl Number for f32 {
    fn is_finite(&self) -> bool {
        f32::is_finite(*self)
    }
}

impl Number for f64 {
    fn is_finite(&self) -> bool {
        f64::is_finite(*self)
    }
}

/// Required positional argument parsed as a finite number.
pub(crate) fn num<T: Number>(args: &[&str], index: usize, name: &'static str) -> CoreResult<T> {
    let raw = arg(args, index, name)?;
    parse_num(raw, name)
}

/// Optional positional argument parsed as a finite number.
pub(crate) fn opt_num<T: Number>(args: &[&str], index: usize, name: &'static str) -> CoreResult<Option<T>> {
    args.get(index).map(|raw| parse_num(raw, name)).transpose()
}

fn parse_num<T: Number>(raw: &str, name: &'static str) -> CoreResult<T> {
    let invalid = || CoreError::InvalidNumber { value: raw.to_string(), context: name };
    let value: T = raw.parse().map_err(|_| invalid())?;
    if !value.is_finite() {
        return Err(invalid());
    }
    Ok(value)
}
