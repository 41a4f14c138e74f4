//! Resolution of attribute values against recorded state
//!
//! At apply time every reference must already have a recorded value,
//! because dependencies are created first. At plan time unknown values are
//! shown as `(known after apply)` and sensitive ones as `(sensitive)`.

use crate::error::{CloudError, Result};
use crate::provider::Attributes;
use crate::sensitive::{KNOWN_AFTER_APPLY, REDACTED, format_value};
use crate::state::GlobalState;
use skyform_core::validate::is_sensitive;
use skyform_core::{Reference, ResourceNode, TemplatePart, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Apply,
    Preview,
}

/// Turns document values into JSON using recorded state
pub struct Resolver<'a> {
    state: &'a GlobalState,
    mode: Mode,
}

impl<'a> Resolver<'a> {
    /// Every reference must resolve; nothing is redacted
    pub fn apply(state: &'a GlobalState) -> Self {
        Self {
            state,
            mode: Mode::Apply,
        }
    }

    /// Missing values become placeholders; sensitive values are redacted
    pub fn preview(state: &'a GlobalState) -> Self {
        Self {
            state,
            mode: Mode::Preview,
        }
    }

    /// Resolve all arguments of a resource
    pub fn resolve_node(&self, node: &ResourceNode) -> Result<Attributes> {
        node.attributes
            .iter()
            .map(|(name, value)| -> Result<(String, serde_json::Value)> {
                Ok((name.clone(), self.resolve(&node.address.to_string(), value)?))
            })
            .collect()
    }

    /// Resolve one value; `owner` names the resource or output for errors
    pub fn resolve(&self, owner: &str, value: &Value) -> Result<serde_json::Value> {
        Ok(match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Reference(reference) => self.reference(owner, reference)?,
            Value::Template(parts) => {
                let mut rendered = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Literal(text) => rendered.push_str(text),
                        TemplatePart::Reference(reference) => {
                            rendered.push_str(&format_value(&self.reference(owner, reference)?))
                        }
                    }
                }
                serde_json::Value::String(rendered)
            }
            Value::List(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|item| self.resolve(owner, item))
                    .collect::<Result<_>>()?,
            ),
            Value::Block(block) => serde_json::Value::Object(
                block
                    .iter()
                    .map(|(key, item)| -> Result<(String, serde_json::Value)> {
                        Ok((key.clone(), self.resolve(owner, item)?))
                    })
                    .collect::<Result<_>>()?,
            ),
        })
    }

    fn reference(&self, owner: &str, reference: &Reference) -> Result<serde_json::Value> {
        if self.mode == Mode::Preview && is_sensitive(reference) {
            return Ok(serde_json::Value::String(REDACTED.to_string()));
        }
        match self.state.attribute(reference) {
            Some(value) => Ok(value.clone()),
            None if self.mode == Mode::Preview => {
                Ok(serde_json::Value::String(KNOWN_AFTER_APPLY.to_string()))
            }
            None => Err(CloudError::UnresolvedValue {
                address: owner.to_string(),
                reference: reference.to_string(),
            }),
        }
    }
}
