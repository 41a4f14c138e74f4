//! KDLパーサー
//!
//! skyform の宣言ドキュメント (skyform.kdl) をパースします。
//! 各ノードタイプのパース処理はモジュールに分離されています。

mod cloud;
mod value;
mod variable;

// 外部クレートから再利用可能なパース関数
pub use cloud::{parse_provider, parse_resource, parse_tags};
pub use value::parse_interpolated;
pub use variable::{parse_output, parse_variable};

use crate::error::{FlowError, Result};
use crate::model::{Document, ResourceMode};
use kdl::KdlDocument;
use std::fs;
use std::path::Path;

/// KDLファイルをパースしてDocumentを生成
///
/// テンプレート展開は行わない（展開が必要な場合は [`crate::loader`] を使用）
pub fn parse_kdl_file<P: AsRef<Path>>(path: P) -> Result<Document> {
    let content = fs::read_to_string(path.as_ref())?;
    let name = path
        .as_ref()
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();
    parse_kdl_string(&content, name)
}

/// KDL文字列をパース
pub fn parse_kdl_string(content: &str, default_name: String) -> Result<Document> {
    let doc: KdlDocument = content.parse()?;

    let mut document = Document {
        name: default_name,
        ..Default::default()
    };

    for node in doc.nodes() {
        match node.name().value() {
            "project" => {
                // projectノードから名前を取得
                if let Some(project_name) = value::first_string(node) {
                    document.name = project_name.to_string();
                }
            }
            "provider" => {
                if document.provider.is_some() {
                    return Err(FlowError::InvalidConfig(
                        "provider は1つだけ宣言できます".to_string(),
                    ));
                }
                document.provider = Some(parse_provider(node)?);
            }
            "variable" => {
                let variable = parse_variable(node)?;
                document.variables.insert(variable.name.clone(), variable);
            }
            "resource" | "data" => {
                let mode = if node.name().value() == "data" {
                    ResourceMode::Data
                } else {
                    ResourceMode::Managed
                };
                let resource = parse_resource(node, mode)?;
                if document.resources.contains_key(&resource.address) {
                    return Err(FlowError::DuplicateResource(resource.address.to_string()));
                }
                document
                    .resources
                    .insert(resource.address.clone(), resource);
            }
            "output" => {
                let output = parse_output(node)?;
                if document.outputs.contains_key(&output.name) {
                    return Err(FlowError::DuplicateOutput(output.name));
                }
                document.outputs.insert(output.name.clone(), output);
            }
            other => {
                return Err(FlowError::UnknownNode(other.to_string()));
            }
        }
    }

    Ok(document)
}

#[cfg(test)]
mod tests;
