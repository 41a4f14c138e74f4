use crate::graph::GraphError;
use crate::validate::ValidationIssue;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("KDLパースエラー: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO エラー: {path}\n理由: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("無効な設定: {0}")]
    InvalidConfig(String),

    #[error("テンプレートエラー: {file}\n理由: {message}")]
    TemplateError { file: PathBuf, message: String },

    #[error("テンプレート展開エラー: {0}")]
    TemplateRenderError(String),

    #[error(
        "プロジェクトルートが見つかりません\n探索開始位置: {0}\nヒント: skyform.kdl ファイルを含むディレクトリで実行してください"
    )]
    ProjectRootNotFound(PathBuf),

    #[error(
        "不明なトップレベルノード: {0}\nヒント: project / provider / variable / resource / data / output が使用できます"
    )]
    UnknownNode(String),

    #[error("無効な参照式: {0}")]
    InvalidReference(String),

    #[error("リソースが重複しています: {0}")]
    DuplicateResource(String),

    #[error("output が重複しています: {0}")]
    DuplicateOutput(String),

    #[error("変数 '{0}' に値がありません（default を設定するか --var で指定してください）")]
    MissingVariable(String),

    #[error("未宣言の変数が指定されました: {0}")]
    UndeclaredVariable(String),

    #[error("組み込みスクリプトが見つかりません: {0}")]
    UnknownBuiltinScript(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("検証エラー ({} 件):\n{}", .0.len(), format_issues(.0))]
    Validation(Vec<ValidationIssue>),
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("  - {}", issue))
        .collect::<Vec<_>>()
        .join("\n")
}

pub type Result<T> = std::result::Result<T, FlowError>;
