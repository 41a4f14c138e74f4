//! リソースノード定義

use super::{Address, Reference, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// 宣言されたリソース（data を含む）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    /// リソースアドレス
    pub address: Address,

    /// 属性（名前 -> 値または参照）
    pub attributes: BTreeMap<String, Value>,

    /// リソース固有のタグ（provider の default_tags とは別）
    pub tags: BTreeMap<String, String>,

    /// 明示的な依存関係 (depends_on)
    pub depends_on: Vec<Address>,
}

impl ResourceNode {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            attributes: BTreeMap::new(),
            tags: BTreeMap::new(),
            depends_on: Vec::new(),
        }
    }

    /// 属性を追加（ビルダー形式）
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// タグを追加（ビルダー形式）
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.attributes.get(attribute)
    }

    pub fn is_data(&self) -> bool {
        self.address.is_data()
    }

    /// 属性に含まれるすべての参照
    pub fn references(&self) -> Vec<&Reference> {
        self.attributes
            .values()
            .flat_map(|value| value.references())
            .collect()
    }

    /// このリソースが依存するアドレス（参照 + depends_on、重複なし）
    pub fn dependencies(&self) -> BTreeSet<Address> {
        self.references()
            .into_iter()
            .map(|r| r.target.clone())
            .chain(self.depends_on.iter().cloned())
            .collect()
    }
}
