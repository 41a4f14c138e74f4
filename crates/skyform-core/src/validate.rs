//! ドキュメントの検証
//!
//! プロバイダーを呼び出す前に、以下を検証します:
//! - リソースタイプと引数がスキーマに存在すること
//! - すべての参照が存在するリソースの存在する属性を指すこと
//! - taggable なリソースが必須タグ (Owner / Project / Environment) を持つこと
//! - sensitive な属性を公開する output に sensitive が付いていること
//! - セキュリティグループの ingress が単一ホストからの SSH のみであること

use crate::error::{FlowError, Result};
use crate::model::{Address, Document, REQUIRED_TAGS, Reference, ResourceNode, Value};
use crate::schema::{self, ResourceSchema};
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// 検証で見つかった問題
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    #[error("{address}: 未対応のリソースタイプです")]
    UnknownResourceType { address: Address },

    #[error("{address}: 不明な引数 '{argument}'")]
    UnknownArgument { address: Address, argument: String },

    #[error("{address}: 必須引数 '{argument}' がありません")]
    MissingArgument { address: Address, argument: String },

    #[error("{from}: 未定義のリソースを参照しています: {target}")]
    UnresolvedReference { from: String, target: String },

    #[error("{from}: {reference} は {} に存在しない属性です", .reference.target.resource_type)]
    UnknownAttribute { from: String, reference: Reference },

    #[error("{address}: 必須タグ '{tag}' がありません")]
    MissingTag { address: Address, tag: String },

    #[error("{address}: このリソースタイプは tags をサポートしていません")]
    TagsNotSupported { address: Address },

    #[error("output '{output}': sensitive な属性 {reference} を公開するには sensitive=#true が必要です")]
    SensitiveOutput { output: String, reference: Reference },

    #[error("{0}")]
    Policy(PolicyDeviation),
}

/// SSH ingress ポリシーからの逸脱
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDeviation {
    pub address: Address,
    /// ingress ブロックの位置（0 始まり）
    pub rule: usize,
    pub kind: DeviationKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviationKind {
    /// ポート範囲が 22-22 ではない
    PortRange { from: Option<i64>, to: Option<i64> },
    /// プロトコルが tcp ではない
    Protocol(String),
    /// CIDR が1つではない
    CidrCount(usize),
    /// 0.0.0.0/0 に開放されている
    OpenToWorld,
    /// /32 ではない CIDR
    NotSingleHost(String),
    /// IPv6 からの ingress
    Ipv6Ingress,
    /// CIDR 以外の送信元（security_groups / self）
    ExtraSource(String),
    /// 静的に検証できない値（参照など）
    Unverifiable(String),
}

impl fmt::Display for DeviationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviationKind::PortRange { from, to } => write!(
                f,
                "ポート範囲 {}-{} は 22 のみではありません",
                from.map_or("?".to_string(), |p| p.to_string()),
                to.map_or("?".to_string(), |p| p.to_string())
            ),
            DeviationKind::Protocol(p) => write!(f, "プロトコル '{}' は tcp ではありません", p),
            DeviationKind::CidrCount(n) => {
                write!(f, "cidr_blocks は1つだけ指定してください（{} 個）", n)
            }
            DeviationKind::OpenToWorld => write!(f, "0.0.0.0/0 に開放されています"),
            DeviationKind::NotSingleHost(c) => write!(f, "{} は単一ホスト (/32) ではありません", c),
            DeviationKind::Ipv6Ingress => write!(f, "IPv6 の ingress は許可されていません"),
            DeviationKind::ExtraSource(s) => write!(f, "CIDR 以外の送信元 '{}' があります", s),
            DeviationKind::Unverifiable(field) => {
                write!(f, "{} はリテラルで指定してください", field)
            }
        }
    }
}

impl fmt::Display for PolicyDeviation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ingress[{}]: {}", self.address, self.rule, self.kind)
    }
}

/// すべての検証を実行し、問題があれば [`FlowError::Validation`] を返す
#[tracing::instrument(skip(document), fields(project = %document.name))]
pub fn validate_document(document: &Document) -> Result<()> {
    let mut issues = validate_structure(document);
    issues.extend(
        check_ssh_only_ingress(document)
            .into_iter()
            .map(ValidationIssue::Policy),
    );

    debug!(issues = issues.len(), "Validation finished");
    if issues.is_empty() {
        Ok(())
    } else {
        Err(FlowError::Validation(issues))
    }
}

/// スキーマ・参照・タグ・output の検証
pub fn validate_structure(document: &Document) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for node in document.resources.values() {
        let Some(schema) = schema::lookup(node.address.mode, &node.address.resource_type) else {
            issues.push(ValidationIssue::UnknownResourceType {
                address: node.address.clone(),
            });
            continue;
        };
        check_arguments(node, schema, &mut issues);
        check_tags(document, node, schema, &mut issues);

        let from = node.address.to_string();
        for reference in node.references() {
            check_reference(document, &from, reference, &mut issues);
        }
        for target in &node.depends_on {
            if document.resource(target).is_none() {
                issues.push(ValidationIssue::UnresolvedReference {
                    from: from.clone(),
                    target: target.to_string(),
                });
            }
        }
    }

    for output in document.outputs.values() {
        let from = format!("output.{}", output.name);
        for reference in output.value.references() {
            if check_reference(document, &from, reference, &mut issues)
                && !output.sensitive
                && is_sensitive(reference)
            {
                issues.push(ValidationIssue::SensitiveOutput {
                    output: output.name.clone(),
                    reference: reference.clone(),
                });
            }
        }
    }

    issues
}

/// 参照先が sensitive な属性か
pub fn is_sensitive(reference: &Reference) -> bool {
    schema::lookup(reference.target.mode, &reference.target.resource_type)
        .is_some_and(|s| s.is_sensitive(&reference.attribute))
}

fn check_arguments(
    node: &ResourceNode,
    schema: &ResourceSchema,
    issues: &mut Vec<ValidationIssue>,
) {
    for (name, value) in &node.attributes {
        if !schema.accepts_argument(name) {
            issues.push(ValidationIssue::UnknownArgument {
                address: node.address.clone(),
                argument: name.clone(),
            });
            continue;
        }
        let Some(block_schema) = schema.block(name) else {
            continue;
        };
        for item in value.items() {
            let Some(block) = item.as_block() else {
                issues.push(ValidationIssue::UnknownArgument {
                    address: node.address.clone(),
                    argument: name.clone(),
                });
                continue;
            };
            for key in block.keys().filter(|k| !block_schema.accepts(k)) {
                issues.push(ValidationIssue::UnknownArgument {
                    address: node.address.clone(),
                    argument: format!("{}.{}", name, key),
                });
            }
            for required in block_schema.required {
                if !has_value(block.get(*required)) {
                    issues.push(ValidationIssue::MissingArgument {
                        address: node.address.clone(),
                        argument: format!("{}.{}", name, required),
                    });
                }
            }
        }
    }

    for required in schema.required {
        if !has_value(node.get(required)) {
            issues.push(ValidationIssue::MissingArgument {
                address: node.address.clone(),
                argument: required.to_string(),
            });
        }
    }
}

fn has_value(value: Option<&Value>) -> bool {
    !matches!(value, None | Some(Value::Null))
}

fn check_tags(
    document: &Document,
    node: &ResourceNode,
    schema: &ResourceSchema,
    issues: &mut Vec<ValidationIssue>,
) {
    if !schema.taggable {
        if !node.tags.is_empty() {
            issues.push(ValidationIssue::TagsNotSupported {
                address: node.address.clone(),
            });
        }
        return;
    }

    let tags = document.effective_tags(node);
    for tag in REQUIRED_TAGS {
        if tags.get(tag).is_none_or(|v| v.trim().is_empty()) {
            issues.push(ValidationIssue::MissingTag {
                address: node.address.clone(),
                tag: tag.to_string(),
            });
        }
    }
}

/// 参照を検証。参照先・属性ともに存在すれば true
fn check_reference(
    document: &Document,
    from: &str,
    reference: &Reference,
    issues: &mut Vec<ValidationIssue>,
) -> bool {
    if document.resource(&reference.target).is_none() {
        issues.push(ValidationIssue::UnresolvedReference {
            from: from.to_string(),
            target: reference.target.to_string(),
        });
        return false;
    }
    // 未対応タイプは UnknownResourceType として別途報告される
    let Some(schema) = schema::lookup(reference.target.mode, &reference.target.resource_type)
    else {
        return false;
    };
    if !schema.has_attribute(&reference.attribute) {
        issues.push(ValidationIssue::UnknownAttribute {
            from: from.to_string(),
            reference: reference.clone(),
        });
        return false;
    }
    true
}

/// セキュリティグループの ingress が「単一 /32 からの tcp/22」のみか検査
///
/// アドレス部分が実在するかは検査しない（運用者が指定する値のため）。
pub fn check_ssh_only_ingress(document: &Document) -> Vec<PolicyDeviation> {
    let mut deviations = Vec::new();

    for node in document.by_type("aws_security_group") {
        let Some(ingress) = node.get("ingress") else {
            continue;
        };
        for (rule, item) in ingress.items().into_iter().enumerate() {
            let Some(block) = item.as_block() else {
                continue;
            };
            let mut push = |kind| {
                deviations.push(PolicyDeviation {
                    address: node.address.clone(),
                    rule,
                    kind,
                })
            };

            let from = block.get("from_port").and_then(Value::as_integer);
            let to = block.get("to_port").and_then(Value::as_integer);
            if from != Some(22) || to != Some(22) {
                push(DeviationKind::PortRange { from, to });
            }

            match block.get("protocol") {
                Some(Value::String(p)) if p == "tcp" || p == "6" => {}
                Some(Value::String(p)) => push(DeviationKind::Protocol(p.clone())),
                Some(Value::Integer(6)) => {}
                Some(other) if !other.references().is_empty() => {
                    push(DeviationKind::Unverifiable("protocol".to_string()))
                }
                other => push(DeviationKind::Protocol(
                    other.map(|v| format!("{:?}", v)).unwrap_or_default(),
                )),
            }

            let cidrs = block.get("cidr_blocks").map(Value::items).unwrap_or_default();
            if cidrs.len() != 1 {
                push(DeviationKind::CidrCount(cidrs.len()));
            }
            for cidr in cidrs {
                match cidr.as_str() {
                    Some(c) if c.trim() == "0.0.0.0/0" => push(DeviationKind::OpenToWorld),
                    Some(c) if !c.trim().ends_with("/32") => {
                        push(DeviationKind::NotSingleHost(c.to_string()))
                    }
                    Some(_) => {}
                    None => push(DeviationKind::Unverifiable("cidr_blocks".to_string())),
                }
            }

            if block
                .get("ipv6_cidr_blocks")
                .is_some_and(|v| !v.items().is_empty())
            {
                push(DeviationKind::Ipv6Ingress);
            }
            for source in ["security_groups", "self"] {
                if block
                    .get(source)
                    .is_some_and(|v| !matches!(v, Value::Null | Value::Bool(false)))
                {
                    push(DeviationKind::ExtraSource(source.to_string()));
                }
            }
        }
    }

    deviations
}
