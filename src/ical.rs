//! Minimal iCalendar (RFC 5545) content-line codec.
//!
//! Parses a calendar object into a tree of [`Component`]s holding raw
//! [`Property`] values, and serialises it back with CRLF line endings and
//! 75-octet folding. Properties the caller never touches are written back
//! unchanged, parameters included.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;

const FOLD_LIMIT: usize = 75;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IcalError {
    #[error("line {line}: expected NAME:VALUE, found `{content}`")]
    InvalidContentLine { line: usize, content: String },

    #[error("line {line}: property outside of any component")]
    PropertyOutsideComponent { line: usize },

    #[error("line {line}: END:{found} without matching BEGIN")]
    UnexpectedEnd { line: usize, found: String },

    #[error("line {line}: END:{found} does not close BEGIN:{expected}")]
    MismatchedEnd {
        line: usize,
        expected: String,
        found: String,
    },

    #[error("component {0} is never closed")]
    Unterminated(String),

    #[error("no component found")]
    Empty,
}

/// One content line: `NAME;PARAM=value:VALUE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub params: Vec<(String, String)>,
    /// Raw (still escaped) value.
    pub value: String,
}

impl Property {
    pub fn new(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_ascii_uppercase(),
            params: Vec::new(),
            value: value.into(),
        }
    }

    /// A TEXT property; `value` is escaped.
    pub fn text(name: &str, value: &str) -> Self {
        Self::new(name, escape_text(value))
    }

    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.params
            .push((name.to_ascii_uppercase(), value.to_string()));
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The unescaped TEXT value.
    pub fn unescaped(&self) -> String {
        unescape_text(&self.value)
    }

    fn to_line(&self) -> String {
        let mut line = self.name.clone();
        for (name, value) in &self.params {
            line.push(';');
            line.push_str(name);
            line.push('=');
            if value.contains([':', ';', ',']) {
                line.push('"');
                line.push_str(value);
                line.push('"');
            } else {
                line.push_str(value);
            }
        }
        line.push(':');
        line.push_str(&self.value);
        line
    }
}

/// A `BEGIN:NAME` ... `END:NAME` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub name: String,
    pub properties: Vec<Property>,
    pub components: Vec<Component>,
}

impl Component {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_ascii_uppercase(),
            properties: Vec::new(),
            components: Vec::new(),
        }
    }

    /// Parse the first top-level component of `text`.
    pub fn parse(text: &str) -> Result<Component, IcalError> {
        let mut stack: Vec<Component> = Vec::new();
        let mut top: Option<Component> = None;

        for (index, line) in unfold_lines(text).iter().enumerate() {
            let number = index + 1;
            if line.trim().is_empty() {
                continue;
            }
            let property = parse_content_line(line, number)?;
            match property.name.as_str() {
                "BEGIN" => stack.push(Component::new(property.value.trim())),
                "END" => {
                    let found = property.value.trim().to_ascii_uppercase();
                    let Some(done) = stack.pop() else {
                        return Err(IcalError::UnexpectedEnd {
                            line: number,
                            found,
                        });
                    };
                    if done.name != found {
                        return Err(IcalError::MismatchedEnd {
                            line: number,
                            expected: done.name,
                            found,
                        });
                    }
                    match stack.last_mut() {
                        Some(parent) => parent.components.push(done),
                        None => {
                            if top.is_none() {
                                top = Some(done);
                            }
                        }
                    }
                }
                _ => match stack.last_mut() {
                    Some(current) => current.properties.push(property),
                    None => return Err(IcalError::PropertyOutsideComponent { line: number }),
                },
            }
        }

        if let Some(open) = stack.pop() {
            return Err(IcalError::Unterminated(open.name));
        }
        top.ok_or(IcalError::Empty)
    }

    /// Serialise with CRLF line endings and folding.
    pub fn to_ical(&self) -> String {
        let mut out = String::new();
        self.write(&mut out);
        out
    }

    fn write(&self, out: &mut String) {
        fold_line(&format!("BEGIN:{}", self.name), out);
        for property in &self.properties {
            fold_line(&property.to_line(), out);
        }
        for component in &self.components {
            component.write(out);
        }
        fold_line(&format!("END:{}", self.name), out);
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn has(&self, name: &str) -> bool {
        self.property(name).is_some()
    }

    /// Unescaped TEXT value of the first `name` property.
    pub fn text(&self, name: &str) -> Option<String> {
        self.property(name).map(Property::unescaped)
    }

    /// Raw value of the first `name` property.
    pub fn raw(&self, name: &str) -> Option<&str> {
        self.property(name).map(|p| p.value.as_str())
    }

    pub fn date(&self, name: &str) -> Option<DateValue> {
        self.property(name).and_then(DateValue::parse)
    }

    /// Replace every `name` property with `property`, keeping the position of
    /// the first one.
    pub fn set(&mut self, property: Property) {
        let name = property.name.clone();
        match self
            .properties
            .iter()
            .position(|p| p.name.eq_ignore_ascii_case(&name))
        {
            Some(index) => {
                self.properties[index] = property;
                let mut seen = 0;
                self.properties.retain(|p| {
                    if p.name.eq_ignore_ascii_case(&name) {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
            }
            None => self.properties.push(property),
        }
    }

    pub fn set_text(&mut self, name: &str, value: &str) {
        self.set(Property::text(name, value));
    }

    pub fn set_raw(&mut self, name: &str, value: impl Into<String>) {
        self.set(Property::new(name, value));
    }

    /// Remove every `name` property. Returns whether any existed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.properties.len();
        self.properties.retain(|p| !p.name.eq_ignore_ascii_case(name));
        before != self.properties.len()
    }

    /// All categories across every CATEGORIES property.
    pub fn categories(&self) -> Vec<String> {
        let mut result: Vec<String> = Vec::new();
        for property in self
            .properties
            .iter()
            .filter(|p| p.name.eq_ignore_ascii_case("CATEGORIES"))
        {
            for raw in split_unescaped(&property.value, ',') {
                let category = unescape_text(raw).trim().to_string();
                if !category.is_empty() && !result.contains(&category) {
                    result.push(category);
                }
            }
        }
        result
    }

    /// Store `categories` as a single CATEGORIES property, or none if empty.
    pub fn set_categories(&mut self, categories: &[String]) {
        if categories.is_empty() {
            self.remove("CATEGORIES");
            return;
        }
        let value = categories
            .iter()
            .map(|c| escape_text(c))
            .collect::<Vec<_>>()
            .join(",");
        self.set_raw("CATEGORIES", value);
    }

    pub fn find(&self, name: &str) -> Option<&Component> {
        self.components
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Component> {
        self.components
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// A DATE or DATE-TIME value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateValue {
    Date(NaiveDate),
    /// Local wall-clock time; TZID-qualified values are read this way too.
    Floating(NaiveDateTime),
    Utc(DateTime<Utc>),
}

impl DateValue {
    pub fn parse(property: &Property) -> Option<Self> {
        let raw = property.value.trim();
        let is_date = property
            .param("VALUE")
            .is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
            || raw.len() == 8;
        if is_date {
            return NaiveDate::parse_from_str(raw, "%Y%m%d")
                .ok()
                .map(DateValue::Date);
        }
        if let Some(stripped) = raw.strip_suffix('Z') {
            return NaiveDateTime::parse_from_str(stripped, "%Y%m%dT%H%M%S")
                .ok()
                .map(|naive| DateValue::Utc(DateTime::from_naive_utc_and_offset(naive, Utc)));
        }
        NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%S")
            .ok()
            .map(DateValue::Floating)
    }

    /// Calendar day in the local time zone.
    pub fn local_date(&self) -> NaiveDate {
        match self {
            DateValue::Date(date) => *date,
            DateValue::Floating(datetime) => datetime.date(),
            DateValue::Utc(datetime) => datetime.with_timezone(&Local).date_naive(),
        }
    }

    /// Human-readable form used on nodes.
    pub fn display(&self) -> String {
        match self {
            DateValue::Date(date) => date.format("%Y-%m-%d").to_string(),
            DateValue::Floating(datetime) => datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
            DateValue::Utc(datetime) => datetime
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
        }
    }
}

/// Format a UTC timestamp as a DATE-TIME value.
pub fn utc_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn escape_text(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\r', "")
        .replace('\n', "\\n")
        .replace(';', "\\;")
        .replace(',', "\\,")
}

pub fn unescape_text(raw: &str) -> String {
    let mut output = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            output.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => output.push('\n'),
            Some(next) => output.push(next),
            None => output.push('\\'),
        }
    }
    output
}

/// Join folded lines. A continuation line loses exactly its first character.
fn unfold_lines(raw: &str) -> Vec<String> {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines: Vec<String> = Vec::new();
    for line in normalized.split('\n') {
        if let Some(rest) = line.strip_prefix([' ', '\t']) {
            if let Some(last) = lines.last_mut() {
                last.push_str(rest);
                continue;
            }
        }
        lines.push(line.to_string());
    }
    lines
}

/// Append `line` to `out`, folded at 75 octets on char boundaries.
fn fold_line(line: &str, out: &mut String) {
    let mut start = 0;
    let mut limit = FOLD_LIMIT;
    while line.len() - start > limit {
        let mut end = start + limit;
        while !line.is_char_boundary(end) {
            end -= 1;
        }
        out.push_str(&line[start..end]);
        out.push_str("\r\n ");
        start = end;
        // The leading space counts towards the next line.
        limit = FOLD_LIMIT - 1;
    }
    out.push_str(&line[start..]);
    out.push_str("\r\n");
}

fn parse_content_line(line: &str, number: usize) -> Result<Property, IcalError> {
    let invalid = || IcalError::InvalidContentLine {
        line: number,
        content: line.to_string(),
    };

    let mut in_quotes = false;
    let mut colon = None;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ':' if !in_quotes => {
                colon = Some(index);
                break;
            }
            _ => {}
        }
    }
    let colon = colon.ok_or_else(invalid)?;
    let (head, value) = (&line[..colon], &line[colon + 1..]);

    let mut parts = split_unquoted(head, ';').into_iter();
    let name = parts.next().unwrap_or_default().trim();
    if name.is_empty() {
        return Err(invalid());
    }

    let mut property = Property::new(name, value);
    for part in parts {
        let (key, raw) = part.split_once('=').unwrap_or((part, ""));
        property
            .params
            .push((key.trim().to_ascii_uppercase(), raw.trim_matches('"').to_string()));
    }
    Ok(property)
}

fn split_unquoted(s: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (index, ch) in s.char_indices() {
        if ch == '"' {
            in_quotes = !in_quotes;
        } else if ch == separator && !in_quotes {
            parts.push(&s[start..index]);
            start = index + ch.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Split on `separator` unless it is backslash-escaped.
fn split_unescaped(s: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut escaped = false;
    let mut start = 0;
    for (index, ch) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == separator {
            parts.push(&s[start..index]);
            start = index + ch.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}
