//! skyform core
//!
//! 宣言ドキュメント (skyform.kdl) のモデル、KDLパーサー、テンプレート展開、
//! リソーススキーマ、依存グラフ、検証を提供します。
//! プロバイダーの呼び出しは skyform-cloud が担当します。

pub mod discovery;
pub mod error;
pub mod graph;
pub mod loader;
pub mod model;
pub mod parser;
pub mod schema;
pub mod scripts;
pub mod template;
pub mod validate;

pub use discovery::{DiscoveredFiles, discover_files, find_project_root, find_project_root_from};
pub use error::{FlowError, Result};
pub use graph::{DependencyGraph, GraphError};
pub use loader::{
    LoadOptions, load_document_file, load_document_str, load_project, load_project_from_root,
};
pub use model::*;
pub use parser::{parse_kdl_file, parse_kdl_string};
pub use schema::ResourceSchema;
pub use template::{TemplateProcessor, Variables};
pub use validate::{
    DeviationKind, PolicyDeviation, ValidationIssue, check_ssh_only_ingress, validate_document,
};
