//! Redaction of sensitive values
//!
//! Anything wrapped in [`Sensitive`] prints as `(sensitive)` through both
//! `Debug` and `Display`, so it cannot leak through `tracing` fields or
//! terminal output by accident. The inner value is reachable only through
//! [`Sensitive::expose`].

use std::fmt;

/// Placeholder printed instead of a sensitive value
pub const REDACTED: &str = "(sensitive)";

/// Placeholder for values only known once the provider has created a resource
pub const KNOWN_AFTER_APPLY: &str = "(known after apply)";

#[derive(Clone, PartialEq)]
pub struct Sensitive<T>(T);

impl<T> Sensitive<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T> fmt::Debug for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T> fmt::Display for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

/// A value that is redacted only when flagged sensitive
pub enum MaybeSensitive<'a> {
    Plain(&'a serde_json::Value),
    Hidden(Sensitive<&'a serde_json::Value>),
}

impl<'a> MaybeSensitive<'a> {
    pub fn new(value: &'a serde_json::Value, sensitive: bool) -> Self {
        if sensitive {
            MaybeSensitive::Hidden(Sensitive::new(value))
        } else {
            MaybeSensitive::Plain(value)
        }
    }

    /// The underlying value, whether hidden or not
    pub fn expose(&self) -> &'a serde_json::Value {
        match self {
            MaybeSensitive::Plain(value) => *value,
            MaybeSensitive::Hidden(hidden) => *hidden.expose(),
        }
    }
}

impl fmt::Display for MaybeSensitive<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaybeSensitive::Plain(value) => write!(f, "{}", format_value(value)),
            MaybeSensitive::Hidden(hidden) => write!(f, "{}", hidden),
        }
    }
}

impl fmt::Debug for MaybeSensitive<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Strings print bare, everything else as compact JSON
pub fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
