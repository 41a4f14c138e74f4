//! テンプレート展開機能
//!
//! Teraを使用してKDLファイルの `{{ 変数 }}` を展開します。
//! リソース参照 `${type.name.attr}` は展開対象外で、そのままパーサーに渡ります。

use crate::error::{FlowError, Result};
use crate::model::Variable;
use crate::parser::parse_variable;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tera::{Context, Tera};
use tracing::{debug, info};

/// 環境変数から変数を上書きする際のプレフィックス
pub const ENV_VAR_PREFIX: &str = "SKYFORM_VAR_";

/// 変数コンテキスト
pub type Variables = HashMap<String, serde_json::Value>;

/// テンプレートプロセッサ
pub struct TemplateProcessor {
    tera: Tera,
    context: Context,
}

impl TemplateProcessor {
    /// 新しいテンプレートプロセッサを作成
    pub fn new() -> Self {
        Self {
            tera: Tera::default(),
            context: Context::new(),
        }
    }

    /// 変数を追加
    pub fn add_variable(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.context.insert(key.into(), &value);
    }

    /// 複数の変数を追加
    pub fn add_variables(&mut self, variables: Variables) {
        for (key, value) in variables {
            self.context.insert(key, &value);
        }
    }

    /// 文字列をテンプレートとして展開
    pub fn render_str(&mut self, template: &str) -> Result<String> {
        self.tera
            .render_str(template, &self.context)
            .map_err(|e| FlowError::TemplateRenderError(extract_tera_error_detail(&e)))
    }

    /// ファイルを読み込んでテンプレート展開
    pub fn render_file(&mut self, path: &Path) -> Result<String> {
        let content = std::fs::read_to_string(path).map_err(|e| FlowError::IoError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        self.render_str(&content).map_err(|e| {
            // TemplateRenderErrorをより詳細なTemplateErrorに変換
            if let FlowError::TemplateRenderError(msg) = e {
                FlowError::TemplateError {
                    file: path.to_path_buf(),
                    message: msg,
                }
            } else {
                e
            }
        })
    }
}

impl Default for TemplateProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// `SKYFORM_VAR_<name>` 形式の環境変数を収集
///
/// プレフィックスを除いた名前をキーとして返します。
#[tracing::instrument]
pub fn env_overrides() -> HashMap<String, String> {
    let overrides: HashMap<String, String> = std::env::vars()
        .filter_map(|(key, value)| {
            key.strip_prefix(ENV_VAR_PREFIX)
                .filter(|name| !name.is_empty())
                .map(|name| (name.to_string(), value))
        })
        .collect();

    info!(
        env_var_count = overrides.len(),
        "Collected variable overrides from environment"
    );
    overrides
}

/// KDLファイルから variable 宣言を抽出
///
/// テンプレート展開前のファイルはKDLとして不正な場合があるため、
/// 正規表現で variable ブロックだけを切り出してパースします。
pub fn extract_variables(kdl_content: &str) -> Result<BTreeMap<String, Variable>> {
    use regex::Regex;

    let re = Regex::new(r#"(?m)^\s*variable\s+"[^"]+"\s*(\{)?"#)
        .map_err(|e| FlowError::InvalidConfig(format!("正規表現のコンパイルエラー: {}", e)))?;

    let mut variables = BTreeMap::new();

    for cap in re.captures_iter(kdl_content) {
        let Some(whole) = cap.get(0) else {
            continue;
        };
        let start = whole.start();
        let end = match cap.get(1) {
            // ブロック付き: 対応する閉じ括弧まで
            Some(open) => find_matching_brace(kdl_content, open.start()).ok_or_else(|| {
                FlowError::InvalidConfig("variable ブロックが閉じられていません".to_string())
            })? + 1,
            None => whole.end(),
        };

        let snippet = &kdl_content[start..end];
        let doc: kdl::KdlDocument = snippet.parse().map_err(|e| {
            FlowError::InvalidConfig(format!("KDL パースエラー (変数抽出ブロック): {}", e))
        })?;

        if let Some(node) = doc.nodes().first() {
            let variable = parse_variable(node)?;
            debug!(variable = %variable.name, "Extracted variable declaration");
            variables.insert(variable.name.clone(), variable);
        }
    }

    Ok(variables)
}

/// 対応する閉じ波括弧の位置を見つける
fn find_matching_brace(content: &str, open_pos: usize) -> Option<usize> {
    let bytes = content.as_bytes();
    if open_pos >= bytes.len() || bytes[open_pos] != b'{' {
        return None;
    }

    let mut depth = 1;
    let mut pos = open_pos + 1;
    let mut in_string = false;
    let mut escape_next = false;

    while pos < bytes.len() && depth > 0 {
        let c = bytes[pos];

        if escape_next {
            escape_next = false;
            pos += 1;
            continue;
        }

        if c == b'\\' {
            escape_next = true;
            pos += 1;
            continue;
        }

        if c == b'"' {
            in_string = !in_string;
        } else if !in_string {
            if c == b'{' {
                depth += 1;
            } else if c == b'}' {
                depth -= 1;
            }
        }

        pos += 1;
    }

    if depth == 0 { Some(pos - 1) } else { None }
}

/// Teraエラーから詳細情報を抽出
///
/// Teraのエラーメッセージを解析して、未定義変数などの具体的な情報を取得します。
fn extract_tera_error_detail(e: &tera::Error) -> String {
    use std::error::Error;

    let mut details = vec![e.to_string()];
    let mut source = e.source();
    while let Some(err) = source {
        details.push(err.to_string());
        source = err.source();
    }

    let full_error = details.join(" | ");

    // 変数名を抽出: "Variable `xxx` not found in context"
    if full_error.contains("not found in context")
        && let Some(start) = full_error.find("Variable `")
        && let Some(end) = full_error[start..].find("` not found")
    {
        let var_name = &full_error[start + 10..start + end];
        return format!(
            "未定義の変数: `{}`\nヒント: variable \"{}\" を宣言してください",
            var_name, var_name
        );
    }

    full_error
}
