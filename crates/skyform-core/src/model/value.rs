//! 属性値と参照
//!
//! 属性値はリテラル・参照・テンプレート・リスト・ネストブロックのいずれか。
//! 参照 (`${aws_vpc.main.id}`) が依存グラフの辺になります。

use super::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 他リソースの属性への参照
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reference {
    /// 参照先リソース
    pub target: Address,
    /// 参照先の属性名
    pub attribute: String,
}

impl Reference {
    pub fn new(target: Address, attribute: impl Into<String>) -> Self {
        Self {
            target,
            attribute: attribute.into(),
        }
    }

    /// `type.name.attr` / `data.type.name.attr` 形式をパース
    pub fn parse(expr: &str) -> Option<Self> {
        let expr = expr.trim();
        let (address, attribute) = expr.rsplit_once('.')?;
        if attribute.is_empty() {
            return None;
        }
        let target = address.parse::<Address>().ok()?;
        Some(Self::new(target, attribute))
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.target, self.attribute)
    }
}

/// テンプレート文字列の構成要素
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplatePart {
    Literal(String),
    Reference(Reference),
}

/// 属性値
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Reference(Reference),
    Template(Vec<TemplatePart>),
    List(Vec<Value>),
    Block(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Block(block) => Some(block),
            _ => None,
        }
    }

    /// リストならその要素、単一値なら自身のみを返す
    pub fn items(&self) -> Vec<&Value> {
        match self {
            Value::List(items) => items.iter().collect(),
            Value::Null => Vec::new(),
            other => vec![other],
        }
    }

    /// 文字列リテラルを列挙（単一値もリスト扱い）
    pub fn strings(&self) -> Vec<&str> {
        self.items().into_iter().filter_map(Value::as_str).collect()
    }

    /// 値に含まれるすべての参照（ネストを含む）
    pub fn references(&self) -> Vec<&Reference> {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        match self {
            Value::Reference(r) => out.push(r),
            Value::Template(parts) => {
                for part in parts {
                    if let TemplatePart::Reference(r) = part {
                        out.push(r);
                    }
                }
            }
            Value::List(items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            Value::Block(block) => {
                for value in block.values() {
                    value.collect_references(out);
                }
            }
            _ => {}
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<Reference> for Value {
    fn from(r: Reference) -> Self {
        Value::Reference(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_parse() {
        let r = Reference::parse("aws_vpc.main.id").unwrap();
        assert_eq!(r.target, Address::managed("aws_vpc", "main"));
        assert_eq!(r.attribute, "id");

        let r = Reference::parse("data.aws_ami.debian.id").unwrap();
        assert!(r.target.is_data());
        assert_eq!(r.to_string(), "data.aws_ami.debian.id");

        assert!(Reference::parse("aws_vpc.main").is_none());
        assert!(Reference::parse("var.project").is_none());
    }

    #[test]
    fn test_nested_references() {
        let vpc = Reference::parse("aws_vpc.main.id").unwrap();
        let igw = Reference::parse("aws_internet_gateway.main.id").unwrap();

        let mut route = BTreeMap::new();
        route.insert("cidr_block".to_string(), Value::from("0.0.0.0/0"));
        route.insert("gateway_id".to_string(), Value::Reference(igw.clone()));

        let value = Value::List(vec![
            Value::Reference(vpc.clone()),
            Value::Block(route),
            Value::Template(vec![
                TemplatePart::Literal("prefix-".to_string()),
                TemplatePart::Reference(vpc.clone()),
            ]),
        ]);

        let refs = value.references();
        assert_eq!(refs.len(), 3);
        assert!(refs.contains(&&igw));
    }

    #[test]
    fn test_strings_single_and_list() {
        assert_eq!(Value::from("a").strings(), vec!["a"]);
        let list = Value::List(vec![Value::from("a"), Value::from(1_i64), Value::from("b")]);
        assert_eq!(list.strings(), vec!["a", "b"]);
        assert!(Value::Null.strings().is_empty());
    }
}
