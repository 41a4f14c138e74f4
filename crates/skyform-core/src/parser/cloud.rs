//! provider / resource / data ノードのパース

use super::value::{first_string, insert_attribute, parse_attribute, string_args};
use crate::error::{FlowError, Result};
use crate::model::{Address, ProviderConfig, ResourceMode, ResourceNode, Value};
use kdl::KdlNode;
use std::collections::BTreeMap;

/// provider ノードをパース
pub fn parse_provider(node: &KdlNode) -> Result<ProviderConfig> {
    let name = first_string(node)
        .ok_or_else(|| FlowError::InvalidConfig("provider requires a name".to_string()))?
        .to_string();

    let mut provider = ProviderConfig {
        name,
        ..Default::default()
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "region" => {
                    provider.region = first_string(child).map(|s| s.to_string());
                }
                "default_tags" | "default-tags" => {
                    provider.default_tags = parse_tags(child)?;
                }
                // 追加設定はconfigに保存
                other => {
                    if let Some(value) = first_string(child) {
                        provider.config.insert(other.to_string(), value.to_string());
                    }
                }
            }
        }
    }

    Ok(provider)
}

/// resource / data ノードをパース
///
/// ```kdl
/// resource "aws_subnet" "public" {
///     vpc_id "${aws_vpc.main.id}"
///     cidr_block "10.0.1.0/24"
///     tags { Name "web-subnet" }
/// }
/// ```
pub fn parse_resource(node: &KdlNode, mode: ResourceMode) -> Result<ResourceNode> {
    let (resource_type, name) = match string_args(node).as_slice() {
        [resource_type, name] => (resource_type.to_string(), name.to_string()),
        _ => {
            return Err(FlowError::InvalidConfig(format!(
                "{} requires a type and a name",
                mode
            )));
        }
    };

    let address = Address {
        mode,
        resource_type,
        name,
    };
    let mut resource = ResourceNode::new(address);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "tags" => {
                    resource.tags = parse_tags(child)?;
                }
                "depends_on" | "depends-on" => {
                    for target in string_args(child) {
                        let address = target
                            .parse::<Address>()
                            .map_err(|_| FlowError::InvalidReference(target.to_string()))?;
                        resource.depends_on.push(address);
                    }
                }
                other => {
                    let value = if other == "user_data" && is_inline_script(child) {
                        // シェルの ${VAR} は参照ではない
                        Value::String(first_string(child).unwrap_or_default().to_string())
                    } else {
                        parse_attribute(child)?
                    };
                    insert_attribute(
                        &mut resource.attributes,
                        other.to_string(),
                        value,
                        child.children().is_some(),
                    )
                    .map_err(|e| match e {
                        FlowError::InvalidConfig(msg) => {
                            FlowError::InvalidConfig(format!("{}: {}", resource.address, msg))
                        }
                        other => other,
                    })?;
                }
            }
        }
    }

    Ok(resource)
}

/// `user_data "#!/bin/bash ..."` のように文字列1つだけを持つノード
fn is_inline_script(node: &KdlNode) -> bool {
    node.children().is_none() && node.entries().len() == 1 && first_string(node).is_some()
}

/// タグブロックをパース
///
/// タグの値は文字列リテラルのみ（参照は不可）
pub fn parse_tags(node: &KdlNode) -> Result<BTreeMap<String, String>> {
    let mut tags = BTreeMap::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            let key = child.name().value().to_string();
            let value = first_string(child).ok_or_else(|| {
                FlowError::InvalidConfig(format!("タグ '{}' の値は文字列である必要があります", key))
            })?;
            if value.contains("${") {
                return Err(FlowError::InvalidConfig(format!(
                    "タグ '{}' に参照は使用できません",
                    key
                )));
            }
            tags.insert(key, value.to_string());
        }
    }
    Ok(tags)
}
