//! Command model: named command specs built from the registry and the
//! concrete instances rendered from them.
//!
//! A [`CommandSpec`] is the immutable description of one named command
//! (`volume`, `tone_control`, `zone2_power`). Rendering it with a value, a
//! query or as a bare trigger produces a [`CommandInstance`] carrying the
//! exact wire line and its QoS.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::codec;
use crate::error::{Error, Result};
use crate::registry::{Choice, CommandEntry, CommandTable};
use crate::types::{CommandValue, ValueBounds, retry_budget};

/// Carriage return terminating every line in both directions.
pub const TERMINATOR: u8 = b'\r';

/// Value that turns a command into a query.
pub const QUERY: &str = "?";

/// Pad width used by level commands that do not declare one.
pub const DEFAULT_DIGITS: usize = 2;

/// The accepted values of a command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueDomain<'a> {
    /// A fixed set of wire strings.
    Enumerated(&'a [Choice]),
    /// A numeric range, in user units.
    Numeric(ValueBounds),
    /// Any string.
    Free,
}

/// What a rendered instance asks the receiver to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// Set the command to a value.
    Set(CommandValue),
    /// Ask for the current value.
    Query,
    /// Send the prefix alone (`MVUP`).
    Trigger,
}

/// Immutable description of one named command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    name: String,
    wire_prefix: String,
    separator: &'static str,
    bounds: Option<ValueBounds>,
    choices: Vec<Choice>,
    level: bool,
    zero: Option<i32>,
    digits: usize,
    strings: Vec<String>,
}

impl CommandSpec {
    fn from_entry(
        name: &str,
        wire_prefix: String,
        separator: &'static str,
        category: &CommandEntry,
        sub: Option<&CommandEntry>,
    ) -> Self {
        let eff = category.effective(sub);
        let zero = eff.zero;
        let bounds = eff.range.map(|(min, max)| {
            let convert = |raw: i32| {
                if eff.level {
                    codec::num_to_db(&raw.to_string(), zero.unwrap_or(codec::DEFAULT_ZERO))
                        .unwrap_or(f64::from(raw))
                } else {
                    f64::from(raw)
                }
            };
            ValueBounds::new(convert(min), convert(max))
        });

        CommandSpec {
            name: name.to_string(),
            wire_prefix,
            separator,
            bounds,
            choices: eff.entry.choice_list().to_vec(),
            level: eff.level,
            zero,
            digits: eff.digits.unwrap_or(DEFAULT_DIGITS),
            strings: eff.strings.to_vec(),
        }
    }

    /// The semantic name (`volume`, `tone_control`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Category plus sub-parameter (`MV`, `PSTONE CTRL`). This is the
    /// coalescing and correlation identity of every instance.
    pub fn wire_prefix(&self) -> &str {
        &self.wire_prefix
    }

    /// Separator between prefix and value: empty, or a single space for
    /// sub-parameter commands.
    pub fn separator(&self) -> &str {
        self.separator
    }

    /// Zero point for level commands.
    pub fn zero(&self) -> Option<i32> {
        self.zero
    }

    /// Whether values go through the level codec.
    pub fn is_level(&self) -> bool {
        self.level
    }

    /// Numeric bounds, if the command has a range.
    pub fn bounds(&self) -> Option<ValueBounds> {
        self.bounds
    }

    /// The accepted values.
    pub fn domain(&self) -> ValueDomain<'_> {
        if let Some(bounds) = self.bounds {
            ValueDomain::Numeric(bounds)
        } else if !self.choices.is_empty() {
            ValueDomain::Enumerated(&self.choices)
        } else {
            ValueDomain::Free
        }
    }

    /// Resolve a user-facing alias (`"low"`, `"lit"`) to its wire string.
    pub fn value_for(&self, alias: &str) -> Result<&str> {
        self.choices
            .iter()
            .find(|c| c.matches(alias))
            .map(|c| c.wire.as_str())
            .ok_or_else(|| {
                Error::InvalidParameter(format!("{alias:?} is not a value of {}", self.name))
            })
    }

    /// Encode a value into its wire form, without prefix or separator.
    pub fn encode_value(&self, value: &CommandValue) -> Result<String> {
        match value {
            CommandValue::Bool(b) => {
                let wire = self
                    .choices
                    .iter()
                    .find(|c| c.value == Some(CommandValue::Bool(*b)))
                    .map(|c| c.wire.clone());
                Ok(wire.unwrap_or_else(|| if *b { "ON" } else { "OFF" }.to_string()))
            }
            CommandValue::Text(s) => {
                if let Some(c) = self.choices.iter().find(|c| c.matches(s)) {
                    return Ok(c.wire.clone());
                }
                if let Some(known) = self.strings.iter().find(|k| k.eq_ignore_ascii_case(s)) {
                    return Ok(known.clone());
                }
                if self.bounds.is_some() || self.level {
                    if let Ok(n) = s.trim().parse::<f64>() {
                        return self.encode_number(n);
                    }
                }
                match self.domain() {
                    ValueDomain::Free => Ok(s.to_uppercase()),
                    _ => Err(Error::InvalidParameter(format!(
                        "{s:?} is not a value of {}",
                        self.name
                    ))),
                }
            }
            CommandValue::Number(n) => {
                let hit = self
                    .choices
                    .iter()
                    .find(|c| c.value == Some(CommandValue::Number(*n)));
                if let Some(c) = hit {
                    return Ok(c.wire.clone());
                }
                self.encode_number(*n)
            }
        }
    }

    fn encode_number(&self, n: f64) -> Result<String> {
        if let Some(bounds) = self.bounds {
            if !bounds.contains(n) {
                return Err(Error::InvalidParameter(format!(
                    "{n} outside {}..={} for {}",
                    bounds.min, bounds.max, self.name
                )));
            }
        }
        if self.level {
            let zero = self.zero.unwrap_or(codec::DEFAULT_ZERO);
            return Ok(codec::level_to_wire(n, zero, self.digits));
        }
        let wire = CommandValue::Number(n).to_string();
        match self.domain() {
            ValueDomain::Enumerated(choices) if !choices.iter().any(|c| c.wire == wire) => Err(
                Error::InvalidParameter(format!("{n} is not a value of {}", self.name)),
            ),
            _ => Ok(wire),
        }
    }

    /// Render a set command.
    pub fn set(self: &Arc<Self>, value: impl Into<CommandValue>, qos: u8) -> Result<CommandInstance> {
        let value = value.into();
        let encoded = self.encode_value(&value)?;
        let body = format!("{}{}{}", self.wire_prefix, self.separator, encoded);
        Ok(CommandInstance::new(self.clone(), Intent::Set(value), body, qos))
    }

    /// Render a query (`PW?`, `PSTONE CTRL ?`).
    pub fn query(self: &Arc<Self>, qos: u8) -> CommandInstance {
        let body = format!("{}{}{}", self.wire_prefix, self.separator, QUERY);
        CommandInstance::new(self.clone(), Intent::Query, body, qos)
    }

    /// Render the bare prefix (`MVUP`).
    pub fn trigger(self: &Arc<Self>, qos: u8) -> CommandInstance {
        CommandInstance::new(self.clone(), Intent::Trigger, self.wire_prefix.clone(), qos)
    }
}

/// A rendered command ready to be queued.
///
/// The sequence number is assigned when the instance is submitted to a
/// connection; two instances are the same submission only if they share
/// both group key and sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandInstance {
    spec: Arc<CommandSpec>,
    intent: Intent,
    body: String,
    qos: u8,
    sequence: u64,
    retry_budget: u8,
}

impl CommandInstance {
    fn new(spec: Arc<CommandSpec>, intent: Intent, body: String, qos: u8) -> Self {
        CommandInstance {
            spec,
            intent,
            body,
            qos,
            sequence: 0,
            retry_budget: retry_budget(qos),
        }
    }

    /// The spec this instance was rendered from.
    pub fn spec(&self) -> &Arc<CommandSpec> {
        &self.spec
    }

    /// Semantic name of the command.
    pub fn name(&self) -> &str {
        self.spec.name()
    }

    /// Coalescing identity: the wire prefix including any sub-parameter.
    pub fn group_key(&self) -> &str {
        self.spec.wire_prefix()
    }

    /// What the instance asks for.
    pub fn intent(&self) -> &Intent {
        &self.intent
    }

    /// The line without its terminator.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// The full wire line, terminator included.
    pub fn message(&self) -> String {
        let mut line = self.body.clone();
        line.push(TERMINATOR as char);
        line
    }

    /// Current QoS tier.
    pub fn qos(&self) -> u8 {
        self.qos
    }

    /// Raise the QoS by one tier, saturating at the top of `levels` tiers.
    pub fn raise_qos(&mut self, levels: u8) {
        if self.qos + 1 < levels {
            self.qos += 1;
        }
    }

    /// Submission sequence number (0 until submitted).
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Stamp the submission sequence number.
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Retries allowed, fixed from the QoS the instance was rendered with.
    pub fn retry_budget(&self) -> u8 {
        self.retry_budget
    }
}

impl fmt::Display for CommandInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.body)
    }
}

/// Semantic name to command spec.
#[derive(Debug, Clone, Default)]
pub struct CommandLookup {
    commands: HashMap<String, Arc<CommandSpec>>,
}

impl CommandLookup {
    /// Build the lookup from a registry.
    ///
    /// Categories without sub-parameters yield one command per name (the
    /// entry name, each variant name, or the prefix itself). Categories with
    /// sub-parameters yield the category command when it is named, plus one
    /// command per sub-parameter, named after the sub-parameter entry, the
    /// category name with a lowercase suffix, or `PREFIX_PARAM`. Prefixes
    /// are visited in order, and a name already taken is not replaced.
    pub fn from_table(table: &CommandTable) -> Self {
        let mut commands = HashMap::new();
        // First declaration wins when two prefixes share a name.
        let mut add = |spec: CommandSpec| {
            commands
                .entry(spec.name.clone())
                .or_insert_with(|| Arc::new(spec));
        };

        for (prefix, entry) in table.iter() {
            if !entry.has_params() {
                let names: Vec<String> = match entry.display_name() {
                    Some(name) => vec![name.to_string()],
                    None => {
                        let mut variants: Vec<String> = Vec::new();
                        for name in entry.variant_names() {
                            if !variants.iter().any(|v| v == name) {
                                variants.push(name.to_string());
                            }
                        }
                        if variants.is_empty() {
                            vec![prefix.to_string()]
                        } else {
                            variants
                        }
                    }
                };
                for name in names {
                    add(CommandSpec::from_entry(&name, prefix.to_string(), "", entry, None));
                }
                continue;
            }

            if let Some(name) = entry.display_name() {
                add(CommandSpec::from_entry(name, prefix.to_string(), "", entry, None));
            }

            for (param, sub) in entry.params() {
                let name = match (sub.display_name(), entry.display_name()) {
                    (Some(sub_name), _) => sub_name.to_string(),
                    (None, Some(cat_name)) => format!("{cat_name}_{}", param.to_lowercase()),
                    (None, None) => format!("{prefix}_{param}"),
                };
                add(CommandSpec::from_entry(
                    &name,
                    format!("{prefix}{param}"),
                    " ",
                    entry,
                    Some(sub),
                ));
            }
        }

        CommandLookup { commands }
    }

    /// Look up a command by name.
    pub fn get(&self, name: &str) -> Option<&Arc<CommandSpec>> {
        self.commands.get(name)
    }

    /// Look up a command by name, failing with [`Error::UnknownCommand`].
    pub fn command(&self, name: &str) -> Result<&Arc<CommandSpec>> {
        self.get(name)
            .ok_or_else(|| Error::UnknownCommand(name.to_string()))
    }

    /// All command names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the lookup is empty.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
