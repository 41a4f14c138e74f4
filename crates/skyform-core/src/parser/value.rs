//! 属性値のパース
//!
//! KDLノードを [`Value`] に変換します。
//! - 子ブロックを持つノード (`ingress { ... }`) は繰り返し可能で、リストに集約
//! - プロパティのみのノード (`user_data file="bootstrap.sh"`) は単一ブロック
//! - 引数1つはスカラー、複数はリスト
//! - 文字列中の `${type.name.attr}` は参照として解釈

use crate::error::{FlowError, Result};
use crate::model::{Reference, TemplatePart, Value};
use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// 位置引数のみを返す
pub(crate) fn positional(node: &KdlNode) -> Vec<&KdlEntry> {
    node.entries().iter().filter(|e| e.name().is_none()).collect()
}

/// 位置引数の文字列を列挙
pub(crate) fn string_args(node: &KdlNode) -> Vec<&str> {
    positional(node)
        .into_iter()
        .filter_map(|e| e.value().as_string())
        .collect()
}

/// 最初の位置引数の文字列
pub(crate) fn first_string(node: &KdlNode) -> Option<&str> {
    string_args(node).into_iter().next()
}

/// 名前付きプロパティの値
pub(crate) fn property<'a>(node: &'a KdlNode, key: &str) -> Option<&'a KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().map(|n| n.value()) == Some(key))
        .map(|e| e.value())
}

/// KDLノードを属性値に変換
pub(crate) fn parse_attribute(node: &KdlNode) -> Result<Value> {
    if let Some(children) = node.children() {
        return Ok(Value::Block(parse_block(children)?));
    }

    let args = positional(node);
    if args.is_empty() {
        let mut block = BTreeMap::new();
        for entry in node.entries() {
            if let Some(key) = entry.name() {
                block.insert(key.value().to_string(), kdl_to_value(entry.value())?);
            }
        }
        return Ok(if block.is_empty() {
            Value::Null
        } else {
            Value::Block(block)
        });
    }

    if args.len() == 1 {
        return kdl_to_value(args[0].value());
    }

    let items = args
        .into_iter()
        .map(|e| kdl_to_value(e.value()))
        .collect::<Result<Vec<_>>>()?;
    Ok(Value::List(items))
}

/// 子ノード群をブロックとしてパース
pub(crate) fn parse_block(doc: &KdlDocument) -> Result<BTreeMap<String, Value>> {
    let mut block = BTreeMap::new();
    for child in doc.nodes() {
        let value = parse_attribute(child)?;
        insert_attribute(
            &mut block,
            child.name().value().to_string(),
            value,
            child.children().is_some(),
        )?;
    }
    Ok(block)
}

/// 属性を挿入
///
/// ブロックは同名で繰り返し宣言できるためリストに追加する。
/// スカラー属性の重複はエラー。
pub(crate) fn insert_attribute(
    attributes: &mut BTreeMap<String, Value>,
    name: String,
    value: Value,
    is_block: bool,
) -> Result<()> {
    match attributes.entry(name) {
        Entry::Vacant(slot) => {
            slot.insert(if is_block {
                Value::List(vec![value])
            } else {
                value
            });
            Ok(())
        }
        Entry::Occupied(mut slot) => {
            if is_block && let Value::List(items) = slot.get_mut() {
                items.push(value);
                return Ok(());
            }
            Err(FlowError::InvalidConfig(format!(
                "属性 '{}' が重複しています",
                slot.key()
            )))
        }
    }
}

/// KDL値を属性値に変換
pub(crate) fn kdl_to_value(value: &KdlValue) -> Result<Value> {
    match value {
        KdlValue::String(s) => parse_interpolated(s),
        KdlValue::Integer(i) => i64::try_from(*i)
            .map(Value::Integer)
            .map_err(|_| FlowError::InvalidConfig(format!("整数値が範囲外です: {}", i))),
        KdlValue::Float(f) => Ok(Value::Float(*f)),
        KdlValue::Bool(b) => Ok(Value::Bool(*b)),
        KdlValue::Null => Ok(Value::Null),
    }
}

/// KDL値をJSON値に変換（変数のデフォルト値用）
pub(crate) fn kdl_to_json(value: &KdlValue) -> serde_json::Value {
    match value {
        KdlValue::String(s) => serde_json::Value::String(s.clone()),
        KdlValue::Integer(i) => i64::try_from(*i)
            .map(serde_json::Value::from)
            .unwrap_or_else(|_| serde_json::Value::String(i.to_string())),
        KdlValue::Float(f) => serde_json::Value::from(*f),
        KdlValue::Bool(b) => serde_json::Value::Bool(*b),
        KdlValue::Null => serde_json::Value::Null,
    }
}

/// `${...}` を含む文字列をパース
///
/// 参照1つだけの文字列は [`Value::Reference`]、
/// リテラルと混在する場合は [`Value::Template`] になる。
pub fn parse_interpolated(s: &str) -> Result<Value> {
    if !s.contains("${") {
        return Ok(Value::String(s.to_string()));
    }

    let mut parts = Vec::new();
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        if start > 0 {
            parts.push(TemplatePart::Literal(rest[..start].to_string()));
        }
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| FlowError::InvalidReference(s.to_string()))?;
        let expr = &after[..end];
        let reference =
            Reference::parse(expr).ok_or_else(|| FlowError::InvalidReference(expr.to_string()))?;
        parts.push(TemplatePart::Reference(reference));
        rest = &after[end + 1..];
    }
    if !rest.is_empty() {
        parts.push(TemplatePart::Literal(rest.to_string()));
    }

    if let [TemplatePart::Reference(reference)] = parts.as_slice() {
        return Ok(Value::Reference(reference.clone()));
    }
    Ok(Value::Template(parts))
}
