//! ドキュメント（宣言ファイル全体）の定義

use super::{Address, ResourceNode, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// すべての taggable リソースが持つべき必須タグ
pub const REQUIRED_TAGS: [&str; 3] = ["Owner", "Project", "Environment"];

/// プロバイダー設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// プロバイダー名（aws など）
    pub name: String,

    /// リージョン（ap-northeast-1 など）
    pub region: Option<String>,

    /// すべての taggable リソースに付与されるタグ
    pub default_tags: BTreeMap<String, String>,

    /// 追加設定（プロバイダー固有）
    pub config: HashMap<String, String>,
}

/// 入力変数
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,

    /// デフォルト値（None の場合は外部からの指定が必須）
    pub default: Option<serde_json::Value>,

    pub description: Option<String>,
}

/// プロビジョニング後に公開される値
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputValue {
    pub name: String,

    /// 値（通常は参照）
    pub value: Value,

    /// sensitive な値は平文でログ・画面に出さない
    pub sensitive: bool,

    pub description: Option<String>,
}

/// 宣言ドキュメント
#[derive(Debug, Clone, Default)]
pub struct Document {
    /// プロジェクト名
    pub name: String,

    /// プロバイダー設定
    pub provider: Option<ProviderConfig>,

    /// 入力変数
    pub variables: BTreeMap<String, Variable>,

    /// リソース（data を含む）
    pub resources: BTreeMap<Address, ResourceNode>,

    /// 出力値
    pub outputs: BTreeMap<String, OutputValue>,
}

impl Document {
    pub fn resource(&self, address: &Address) -> Option<&ResourceNode> {
        self.resources.get(address)
    }

    pub fn resource_mut(&mut self, address: &Address) -> Option<&mut ResourceNode> {
        self.resources.get_mut(address)
    }

    /// 管理対象リソース（data を除く）
    pub fn managed_resources(&self) -> impl Iterator<Item = &ResourceNode> {
        self.resources.values().filter(|r| !r.is_data())
    }

    /// data ソース
    pub fn data_sources(&self) -> impl Iterator<Item = &ResourceNode> {
        self.resources.values().filter(|r| r.is_data())
    }

    /// 指定タイプのリソース
    pub fn by_type<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = &'a ResourceNode> {
        self.resources
            .values()
            .filter(move |r| r.address.resource_type == resource_type)
    }

    /// provider の default_tags とリソース固有タグをマージ（リソース側が優先）
    pub fn effective_tags(&self, node: &ResourceNode) -> BTreeMap<String, String> {
        let mut tags = self
            .provider
            .as_ref()
            .map(|p| p.default_tags.clone())
            .unwrap_or_default();
        tags.extend(node.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        tags
    }

    pub fn region(&self) -> Option<&str> {
        self.provider.as_ref().and_then(|p| p.region.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_tags_resource_overrides_default() {
        let mut default_tags = BTreeMap::new();
        default_tags.insert("Owner".to_string(), "alice".to_string());
        default_tags.insert("Environment".to_string(), "test".to_string());

        let doc = Document {
            name: "demo".to_string(),
            provider: Some(ProviderConfig {
                name: "aws".to_string(),
                default_tags,
                ..Default::default()
            }),
            ..Default::default()
        };

        let node = ResourceNode::new(Address::managed("aws_vpc", "main"))
            .with_tag("Environment", "prod")
            .with_tag("Name", "demo-vpc");

        let tags = doc.effective_tags(&node);
        assert_eq!(tags.get("Owner"), Some(&"alice".to_string()));
        assert_eq!(tags.get("Environment"), Some(&"prod".to_string()));
        assert_eq!(tags.get("Name"), Some(&"demo-vpc".to_string()));
    }

    #[test]
    fn test_effective_tags_without_provider() {
        let doc = Document::default();
        let node = ResourceNode::new(Address::managed("aws_vpc", "main")).with_tag("Name", "x");
        assert_eq!(doc.effective_tags(&node).len(), 1);
    }
}
