//! variable / output ノードのパース

use super::value::{first_string, kdl_to_json, parse_attribute, positional, property};
use crate::error::{FlowError, Result};
use crate::model::{OutputValue, Value, Variable};
use kdl::{KdlNode, KdlValue};

/// variable ノードをパース
///
/// ```kdl
/// variable "project_name" {
///     default "debian-web"
///     description "Project tag value"
/// }
/// ```
pub fn parse_variable(node: &KdlNode) -> Result<Variable> {
    let name = first_string(node)
        .ok_or_else(|| FlowError::InvalidConfig("variable requires a name".to_string()))?
        .to_string();

    let mut variable = Variable {
        name,
        ..Default::default()
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "default" => {
                    variable.default = positional(child)
                        .first()
                        .map(|entry| kdl_to_json(entry.value()));
                }
                "description" => {
                    variable.description = first_string(child).map(|s| s.to_string());
                }
                other => {
                    tracing::warn!(
                        variable = %variable.name,
                        key = %other,
                        "Unknown variable setting ignored"
                    );
                }
            }
        }
    }

    Ok(variable)
}

/// output ノードをパース
///
/// `sensitive` はプロパティ (`sensitive=#true`) と子ノードのどちらでも指定可能
pub fn parse_output(node: &KdlNode) -> Result<OutputValue> {
    let name = first_string(node)
        .ok_or_else(|| FlowError::InvalidConfig("output requires a name".to_string()))?
        .to_string();

    let mut sensitive = matches!(property(node, "sensitive"), Some(KdlValue::Bool(true)));
    let mut value = None;
    let mut description = None;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "value" => value = Some(parse_attribute(child)?),
                "sensitive" => {
                    sensitive = matches!(
                        positional(child).first().map(|e| e.value()),
                        Some(KdlValue::Bool(true))
                    );
                }
                "description" => description = first_string(child).map(|s| s.to_string()),
                other => {
                    return Err(FlowError::InvalidConfig(format!(
                        "output '{}': unknown setting '{}'",
                        name, other
                    )));
                }
            }
        }
    }

    let value = value
        .filter(|v| *v != Value::Null)
        .ok_or_else(|| FlowError::InvalidConfig(format!("output '{}' requires a value", name)))?;

    Ok(OutputValue {
        name,
        value,
        sensitive,
        description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Reference;

    #[test]
    fn test_parse_variable_with_default() {
        let doc: kdl::KdlDocument = r#"
            variable "project_name" {
                default "debian-web"
                description "Project tag"
            }
        "#
        .parse()
        .unwrap();

        let variable = parse_variable(&doc.nodes()[0]).unwrap();
        assert_eq!(variable.name, "project_name");
        assert_eq!(variable.default, Some(serde_json::json!("debian-web")));
        assert_eq!(variable.description.as_deref(), Some("Project tag"));
    }

    #[test]
    fn test_parse_variable_without_default() {
        let doc: kdl::KdlDocument = r#"variable "candidate_name""#.parse().unwrap();
        let variable = parse_variable(&doc.nodes()[0]).unwrap();
        assert!(variable.default.is_none());
    }

    #[test]
    fn test_parse_sensitive_output_property() {
        let doc: kdl::KdlDocument = r#"
            output "private_key_pem" sensitive=#true {
                value "${tls_private_key.ssh.private_key_pem}"
            }
        "#
        .parse()
        .unwrap();

        let output = parse_output(&doc.nodes()[0]).unwrap();
        assert!(output.sensitive);
        assert_eq!(
            output.value,
            Value::Reference(Reference::parse("tls_private_key.ssh.private_key_pem").unwrap())
        );
    }

    #[test]
    fn test_parse_sensitive_output_child() {
        let doc: kdl::KdlDocument = r#"
            output "public_ip" {
                value "${aws_instance.web.public_ip}"
                sensitive #false
            }
        "#
        .parse()
        .unwrap();

        let output = parse_output(&doc.nodes()[0]).unwrap();
        assert!(!output.sensitive);
    }

    #[test]
    fn test_output_requires_value() {
        let doc: kdl::KdlDocument = r#"output "empty" { description "nothing" }"#.parse().unwrap();
        assert!(parse_output(&doc.nodes()[0]).is_err());
    }
}
