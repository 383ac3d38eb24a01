//! Incoming line tokenizer and decoder.
//!
//! A report line such as `PSTONE CTRL ON` or `Z2PSBAS 51` is split into a
//! category (`PS`, `Z2PS`), an optional sub-parameter (`TONE CTRL`, `BAS`)
//! and a raw value, using the command registry to find the boundaries. The
//! raw value is then decoded and given the attribute key that state updates
//! are stored under.
//!
//! Lines that do not match the registry are still split (on the last space)
//! and produce a [`SuggestedCommand`] so new firmware commands can be
//! learned.

use std::fmt;

use tracing::{debug, info};

use avrctl_core::codec::{self, DEFAULT_ZERO};
use avrctl_core::error::Result;
use avrctl_core::{CommandEntry, CommandTable, CommandValue, StateUpdate};

/// A command seen on the wire that the registry does not describe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SuggestedCommand {
    /// Category (or the whole unmatched command).
    pub category: String,
    /// Sub-parameter, when the category takes them.
    pub sub_parameter: Option<String>,
    /// Value that followed.
    pub value: Option<String>,
}

/// The three parts of a line, plus a suggestion when the split was guessed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokens {
    /// Category (`PW`, `Z2PS`).
    pub category: String,
    /// Sub-parameter (`MAX`, `TONE CTRL`).
    pub sub_parameter: Option<String>,
    /// Raw value text.
    pub raw_value: Option<String>,
    /// Set when part of the line was not found in the registry.
    pub suggestion: Option<SuggestedCommand>,
}

impl Tokens {
    fn matched(category: &str, sub: Option<&str>, raw: Option<&str>) -> Self {
        Tokens {
            category: category.to_string(),
            sub_parameter: non_empty(sub),
            raw_value: non_empty(raw),
            suggestion: None,
        }
    }

    fn guessed(category: &str, sub: Option<&str>, raw: Option<&str>) -> Self {
        let mut tokens = Self::matched(category, sub, raw);
        tokens.suggestion = Some(SuggestedCommand {
            category: tokens.category.clone(),
            sub_parameter: tokens.sub_parameter.clone(),
            value: tokens.raw_value.clone(),
        });
        tokens
    }

    /// Category plus sub-parameter: the key responses are correlated by.
    pub fn group_key(&self) -> String {
        match &self.sub_parameter {
            Some(sub) => format!("{}{sub}", self.category),
            None => self.category.clone(),
        }
    }
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.chars().all(char::is_numeric)
}

/// Split at the last space into `(head, tail)`, both trimmed.
fn split_last_space(s: &str) -> Option<(&str, &str)> {
    s.rsplit_once(' ')
        .map(|(head, tail)| (head.trim(), tail.trim()))
}

/// Split a line into category, sub-parameter and raw value.
///
/// Candidate categories are tried from the longest strict prefix of the
/// line down to its first character. Inside a category the remainder is
/// matched, in order, against enumerated values and sub-parameter keys,
/// a numeric range, and finally sub-parameter prefixes from the whole
/// remainder down to one character.
pub fn tokenize(line: &str, table: &CommandTable) -> Tokens {
    for end in (1..line.len()).rev() {
        if !line.is_char_boundary(end) {
            continue;
        }
        let prefix = &line[..end];
        if let Some(entry) = table.get(prefix) {
            return tokenize_entry(prefix, entry, &line[end..]);
        }
    }

    match split_last_space(line) {
        Some((head, tail)) => {
            debug!(command = head, value = tail, "unknown command");
            Tokens::guessed(head, None, Some(tail))
        }
        None => {
            debug!(line, "unparsable line");
            Tokens::guessed(line, None, None)
        }
    }
}

fn tokenize_entry(category: &str, entry: &CommandEntry, rem: &str) -> Tokens {
    if entry.contains_key(rem) {
        return Tokens::matched(category, None, Some(rem));
    }

    if entry.raw_range().is_some() && is_numeric(rem) {
        return Tokens::matched(category, None, Some(rem));
    }

    if entry.has_params() {
        for end in (1..=rem.len()).rev() {
            if !rem.is_char_boundary(end) {
                continue;
            }
            let sub = &rem[..end];
            if entry.get_param(sub).is_some() {
                return Tokens::matched(category, Some(sub), Some(&rem[end..]));
            }
        }

        return match split_last_space(rem) {
            Some((sub, value)) => Tokens::guessed(category, Some(sub), Some(value)),
            None => Tokens::guessed(category, Some(rem), None),
        };
    }

    Tokens::guessed(category, None, Some(rem))
}

/// Decode a raw value for `category`/`sub_parameter`.
///
/// Enumerated wire strings map to their typed value. Level commands pass
/// their declared strings through and decode everything else with the
/// level codec; a codec failure is returned as
/// [`avrctl_core::Error::UnparsableValue`]. Anything else is returned as
/// text.
pub fn decode(
    table: &CommandTable,
    category: &str,
    sub_parameter: Option<&str>,
    raw: Option<&str>,
) -> Result<Option<CommandValue>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let Some(entry) = table.get(category) else {
        return Ok(Some(CommandValue::from(raw)));
    };

    let sub = sub_parameter.and_then(|s| entry.get_param(s));
    let eff = entry.effective(sub);

    if let Some(choice) = eff.entry.get_choice(raw) {
        return Ok(Some(choice.decoded()));
    }

    if eff.level {
        if eff.strings.iter().any(|s| s == raw) {
            return Ok(Some(CommandValue::from(raw)));
        }
        let db = codec::num_to_db(raw, eff.zero.unwrap_or(DEFAULT_ZERO))?;
        return Ok(Some(CommandValue::Number(db)));
    }

    Ok(Some(CommandValue::from(raw)))
}

/// Attribute key a parsed line's value is stored under.
///
/// In order: the sub-parameter's own name; for categories that name their
/// attribute by value kind, the variant for `"number"`, the raw value, or
/// `"other"`; the category name, suffixed with the lowercase sub-parameter
/// if there is one; and finally `CATEGORY` or `CATEGORY_SUB`.
pub fn attribute_key(
    table: &CommandTable,
    category: &str,
    sub_parameter: Option<&str>,
    raw: Option<&str>,
    value: Option<&CommandValue>,
) -> String {
    let fallback = || match sub_parameter {
        Some(sub) => format!("{category}_{sub}"),
        None => category.to_string(),
    };

    let Some(entry) = table.get(category) else {
        return fallback();
    };

    if let Some(name) = sub_parameter
        .and_then(|s| entry.get_param(s))
        .and_then(CommandEntry::display_name)
    {
        return name.to_string();
    }

    if entry.variant_names().next().is_some() {
        let kind = match value {
            Some(CommandValue::Number(_)) => "number",
            _ => raw.unwrap_or("other"),
        };
        if let Some(name) = entry.variant_name(kind) {
            return name.to_string();
        }
    }

    match (entry.display_name(), sub_parameter) {
        (Some(name), Some(sub)) => format!("{name}_{}", sub.to_lowercase()),
        (Some(name), None) => name.to_string(),
        (None, _) => fallback(),
    }
}

/// A fully parsed report line.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    message: String,
    tokens: Tokens,
    value: Option<CommandValue>,
    attribute: String,
    unparsable: bool,
}

impl ParsedMessage {
    /// Tokenize, decode and name a line.
    pub fn parse(line: &str, table: &CommandTable) -> Self {
        let tokens = tokenize(line, table);
        let sub = tokens.sub_parameter.as_deref();
        let raw = tokens.raw_value.as_deref();

        let (value, unparsable) = match decode(table, &tokens.category, sub, raw) {
            Ok(value) => (value, false),
            Err(e) => {
                debug!(line, error = %e, "dropping unparsable value");
                (None, true)
            }
        };
        let attribute = attribute_key(table, &tokens.category, sub, raw, value.as_ref());

        if let Some(suggestion) = &tokens.suggestion {
            info!(
                category = %suggestion.category,
                sub_parameter = ?suggestion.sub_parameter,
                value = ?suggestion.value,
                "learned new command"
            );
        }

        ParsedMessage {
            message: line.to_string(),
            tokens,
            value,
            attribute,
            unparsable,
        }
    }

    /// The line as received.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Category (`PW`, `Z2PS`).
    pub fn category(&self) -> &str {
        &self.tokens.category
    }

    /// Sub-parameter, if any.
    pub fn sub_parameter(&self) -> Option<&str> {
        self.tokens.sub_parameter.as_deref()
    }

    /// Raw value text, if any.
    pub fn raw_value(&self) -> Option<&str> {
        self.tokens.raw_value.as_deref()
    }

    /// Decoded value, if any.
    pub fn value(&self) -> Option<&CommandValue> {
        self.value.as_ref()
    }

    /// State-update key.
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Suggestion for a command the registry does not know.
    pub fn suggested_command(&self) -> Option<&SuggestedCommand> {
        self.tokens.suggestion.as_ref()
    }

    /// Category plus sub-parameter, matched against command group keys.
    pub fn group_key(&self) -> String {
        self.tokens.group_key()
    }

    /// The state update this line produces; `None` if the value could not
    /// be decoded.
    pub fn state_update(&self) -> Option<StateUpdate> {
        if self.unparsable {
            return None;
        }
        Some(StateUpdate {
            attribute: self.attribute.clone(),
            value: self.value.clone(),
        })
    }
}

impl fmt::Display for ParsedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
