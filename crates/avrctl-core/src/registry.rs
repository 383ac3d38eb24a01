//! The command registry: a nested, read-only description of a receiver's
//! command grammar.
//!
//! Every top-level key is a wire prefix (`PW`, `MV`, `Z2PS`). An entry can
//! enumerate the values it accepts, declare a table of sub-parameters
//! (`PSBAS`, `PSTONE CTRL`), carry a raw numeric range, or mark itself as a
//! volume-style level decoded relative to a zero point.

use std::collections::BTreeMap;

use crate::types::CommandValue;

/// One enumerated wire value and its typed meaning.
///
/// `value` is `None` when the wire string is itself the meaning (source
/// names, for instance).
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    /// Exact string sent and received on the wire.
    pub wire: String,
    /// Decoded value, if different from the wire string.
    pub value: Option<CommandValue>,
}

impl Choice {
    /// Whether `alias` names this choice, by wire string or text value,
    /// ignoring case.
    pub fn matches(&self, alias: &str) -> bool {
        if self.wire.eq_ignore_ascii_case(alias) {
            return true;
        }
        matches!(&self.value, Some(CommandValue::Text(t)) if t.eq_ignore_ascii_case(alias))
    }

    /// The decoded value, falling back to the wire string.
    pub fn decoded(&self) -> CommandValue {
        self.value
            .clone()
            .unwrap_or_else(|| CommandValue::Text(self.wire.clone()))
    }
}

/// A single registry entry (a category or one of its sub-parameters).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandEntry {
    name: Option<String>,
    variant_names: Vec<(String, String)>,
    params: Option<Vec<(String, CommandEntry)>>,
    range: Option<(i32, i32)>,
    level: bool,
    zero: Option<i32>,
    strings: Vec<String>,
    choices: Vec<Choice>,
    digits: Option<usize>,
}

impl CommandEntry {
    /// An empty entry: no name, no values, no sub-parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the attribute / command name for this entry.
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Choose the attribute name by value kind.
    ///
    /// `kind` is `"number"` for numeric values, a specific wire string, or
    /// `"other"` as the catch-all.
    pub fn variant(mut self, kind: &str, name: &str) -> Self {
        self.variant_names.push((kind.to_string(), name.to_string()));
        self
    }

    /// Declare that this entry has sub-parameters, even if none are known.
    pub fn with_params(mut self) -> Self {
        self.params.get_or_insert_with(Vec::new);
        self
    }

    /// Add a sub-parameter.
    pub fn param(mut self, key: &str, entry: CommandEntry) -> Self {
        self.params
            .get_or_insert_with(Vec::new)
            .push((key.to_string(), entry));
        self
    }

    /// Raw wire range, inclusive.
    pub fn range(mut self, min: i32, max: i32) -> Self {
        self.range = Some((min, max));
        self
    }

    /// Decode and encode values with the volume-style level codec.
    pub fn level(mut self) -> Self {
        self.level = true;
        self
    }

    /// Zero point for the level codec.
    pub fn zero(mut self, zero: i32) -> Self {
        self.zero = Some(zero);
        self
    }

    /// Minimum digits the level codec pads whole-step output to.
    pub fn digits(mut self, digits: usize) -> Self {
        self.digits = Some(digits);
        self
    }

    /// Strings that pass through a level entry without numeric decoding.
    pub fn strings(mut self, strings: &[&str]) -> Self {
        self.strings
            .extend(strings.iter().map(|s| s.to_string()));
        self
    }

    /// Enumerate a wire string with a typed meaning.
    pub fn choice(mut self, wire: &str, value: impl Into<CommandValue>) -> Self {
        self.choices.push(Choice {
            wire: wire.to_string(),
            value: Some(value.into()),
        });
        self
    }

    /// Enumerate wire strings that decode to themselves.
    pub fn choices(mut self, wires: &[&str]) -> Self {
        self.choices.extend(wires.iter().map(|w| Choice {
            wire: w.to_string(),
            value: None,
        }));
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The declared name, if any.
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Attribute name for a value kind, falling back to `"other"`.
    pub fn variant_name(&self, kind: &str) -> Option<&str> {
        let find = |k: &str| {
            self.variant_names
                .iter()
                .find(|(kind, _)| kind == k)
                .map(|(_, name)| name.as_str())
        };
        find(kind).or_else(|| find("other"))
    }

    /// All variant names, in declaration order.
    pub fn variant_names(&self) -> impl Iterator<Item = &str> {
        self.variant_names.iter().map(|(_, name)| name.as_str())
    }

    /// Whether the entry declares a sub-parameter table.
    pub fn has_params(&self) -> bool {
        self.params.is_some()
    }

    /// Sub-parameters, in declaration order.
    pub fn params(&self) -> impl Iterator<Item = (&str, &CommandEntry)> {
        self.params
            .iter()
            .flatten()
            .map(|(key, entry)| (key.as_str(), entry))
    }

    /// Look up a sub-parameter by its exact key.
    pub fn get_param(&self, key: &str) -> Option<&CommandEntry> {
        self.params
            .iter()
            .flatten()
            .find(|(k, _)| k == key)
            .map(|(_, entry)| entry)
    }

    /// Look up an enumerated value by its exact wire string.
    pub fn get_choice(&self, wire: &str) -> Option<&Choice> {
        self.choices.iter().find(|c| c.wire == wire)
    }

    /// Whether `key` is one of this entry's enumerated values or
    /// sub-parameters.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get_choice(key).is_some() || self.get_param(key).is_some()
    }

    /// Raw wire range.
    pub fn raw_range(&self) -> Option<(i32, i32)> {
        self.range
    }

    /// Whether the level codec applies to this entry.
    pub fn is_level(&self) -> bool {
        self.level
    }

    /// Declared zero point.
    pub fn zero_point(&self) -> Option<i32> {
        self.zero
    }

    /// Declared pad width.
    pub fn pad_digits(&self) -> Option<usize> {
        self.digits
    }

    /// Pass-through strings.
    pub fn pass_strings(&self) -> &[String] {
        &self.strings
    }

    /// Enumerated values.
    pub fn choice_list(&self) -> &[Choice] {
        &self.choices
    }

    /// Resolve the effective properties of `sub` under this category.
    ///
    /// Sub-parameters inherit the range, codec, zero point, pad width and
    /// pass-through strings of their category unless they declare their own.
    pub fn effective<'a>(&'a self, sub: Option<&'a CommandEntry>) -> Effective<'a> {
        let own = sub.unwrap_or(self);
        let strings = if own.strings.is_empty() {
            &self.strings
        } else {
            &own.strings
        };
        Effective {
            entry: own,
            range: own.range.or(self.range),
            level: own.level || self.level,
            zero: own.zero.or(self.zero),
            digits: own.digits.or(self.digits),
            strings,
        }
    }
}

/// Properties of an entry after inheritance from its category.
#[derive(Debug, Clone, Copy)]
pub struct Effective<'a> {
    /// The most specific entry (sub-parameter if present, else category).
    pub entry: &'a CommandEntry,
    /// Raw wire range.
    pub range: Option<(i32, i32)>,
    /// Whether the level codec applies.
    pub level: bool,
    /// Zero point for the level codec.
    pub zero: Option<i32>,
    /// Pad width for the level codec.
    pub digits: Option<usize>,
    /// Pass-through strings.
    pub strings: &'a [String],
}

/// The full registry: wire prefix to entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandTable {
    entries: BTreeMap<String, CommandEntry>,
}

impl CommandTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a top-level entry, builder style.
    pub fn with(mut self, prefix: &str, entry: CommandEntry) -> Self {
        self.insert(prefix, entry);
        self
    }

    /// Add (or replace) a top-level entry.
    pub fn insert(&mut self, prefix: &str, entry: CommandEntry) {
        self.entries.insert(prefix.to_string(), entry);
    }

    /// Look up a top-level entry by its exact prefix.
    pub fn get(&self, prefix: &str) -> Option<&CommandEntry> {
        self.entries.get(prefix)
    }

    /// Whether `prefix` is a known category.
    pub fn contains(&self, prefix: &str) -> bool {
        self.entries.contains_key(prefix)
    }

    /// All entries, ordered by prefix.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CommandEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of top-level entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
