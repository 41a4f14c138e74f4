//! 統合ローダー
//!
//! ファイル発見、変数解決、テンプレート展開、パースを統合

use crate::discovery::{LOCAL_OVERRIDE_FILE, discover_files, find_project_root};
use crate::error::{FlowError, Result};
use crate::model::{Document, Value, Variable};
use crate::parser::parse_kdl_string;
use crate::scripts;
use crate::template::{TemplateProcessor, Variables, env_overrides, extract_variables};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// ロード時のオプション
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// コマンドラインから指定された変数（最優先）
    pub overrides: HashMap<String, String>,
    /// `SKYFORM_VAR_*` 環境変数を読むかどうか
    pub include_env: bool,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self {
            overrides: HashMap::new(),
            include_env: true,
        }
    }

    pub fn with_override(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(name.into(), value.into());
        self
    }
}

/// プロジェクト全体をロードしてDocumentを生成
///
/// 以下の処理を実行:
/// 1. プロジェクトルートの検出
/// 2. ファイルの自動発見
/// 3. 変数の解決
/// 4. テンプレート展開
/// 5. KDLパース
/// 6. user_data の解決
#[instrument(skip(options))]
pub fn load_project(options: &LoadOptions) -> Result<Document> {
    info!("Starting project load");
    let project_root = find_project_root()?;
    load_project_from_root(&project_root, options)
}

/// 指定されたルートディレクトリからプロジェクトをロード
#[instrument(skip(project_root, options), fields(project_root = %project_root.display()))]
pub fn load_project_from_root(project_root: &Path, options: &LoadOptions) -> Result<Document> {
    debug!("Step 1: Discovering files");
    let discovered = discover_files(project_root)?;
    let root_file = discovered
        .root
        .ok_or_else(|| FlowError::ProjectRootNotFound(project_root.to_path_buf()))?;

    let mut options = options.clone();
    if let Some(local) = &discovered.local_override {
        debug!(file = %local.display(), "Applying local variable overrides");
        merge_local_defaults(local, &root_file, &mut options)?;
    }

    load_document_file(&root_file, &options)
}

/// 単一のドキュメントファイルをロード
#[instrument(skip(options), fields(path = %path.display()))]
pub fn load_document_file(path: &Path, options: &LoadOptions) -> Result<Document> {
    let content = read_file(path)?;
    let base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let name = base_dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();

    load_document_str(&content, &base_dir, name, options).map_err(|e| match e {
        FlowError::TemplateRenderError(message) => FlowError::TemplateError {
            file: path.to_path_buf(),
            message,
        },
        other => other,
    })
}

/// 文字列からドキュメントをロード
///
/// `base_dir` は `user_data file="..."` の相対パス解決に使用します。
pub fn load_document_str(
    content: &str,
    base_dir: &Path,
    default_name: String,
    options: &LoadOptions,
) -> Result<Document> {
    // 1. 変数宣言の抽出
    debug!("Step 1: Extracting variable declarations");
    let declared = extract_variables(content)?;

    // 2. 変数値の解決
    debug!("Step 2: Resolving variable values");
    let env = if options.include_env {
        env_overrides()
    } else {
        HashMap::new()
    };
    let values = resolve_variables(&declared, &env, &options.overrides)?;

    // 3. テンプレート展開
    debug!("Step 3: Expanding templates");
    let mut processor = TemplateProcessor::new();
    processor.add_variables(values);
    let expanded = processor.render_str(content)?;

    // 4. KDLパース
    debug!("Step 4: Parsing KDL");
    let mut document = parse_kdl_string(&expanded, default_name)?;

    // 5. user_data の解決
    debug!("Step 5: Resolving user_data");
    resolve_user_data(&mut document, base_dir)?;

    info!(
        project = %document.name,
        resources = document.resources.len(),
        outputs = document.outputs.len(),
        "Document loaded successfully"
    );
    Ok(document)
}

/// 変数値を解決
///
/// 優先順位: default < 環境変数 (`SKYFORM_VAR_*`) < コマンドライン。
/// 宣言されていない変数をコマンドラインで指定した場合はエラー。
/// 環境変数側の未宣言変数は無視します。
pub fn resolve_variables(
    declared: &BTreeMap<String, Variable>,
    env: &HashMap<String, String>,
    overrides: &HashMap<String, String>,
) -> Result<Variables> {
    if let Some(unknown) = overrides.keys().find(|k| !declared.contains_key(*k)) {
        return Err(FlowError::UndeclaredVariable(unknown.clone()));
    }

    let mut values = Variables::new();
    for (name, variable) in declared {
        let value = if let Some(v) = overrides.get(name) {
            debug!(variable = %name, source = "cli", "Variable resolved");
            serde_json::Value::String(v.clone())
        } else if let Some(v) = env.get(name) {
            debug!(variable = %name, source = "env", "Variable resolved");
            serde_json::Value::String(v.clone())
        } else if let Some(default) = &variable.default {
            default.clone()
        } else {
            return Err(FlowError::MissingVariable(name.clone()));
        };
        values.insert(name.clone(), value);
    }
    Ok(values)
}

/// ローカルオーバーライドの default をオプションにマージ
///
/// 既にコマンドラインで指定されている変数は上書きしない。
fn merge_local_defaults(local: &Path, root_file: &Path, options: &mut LoadOptions) -> Result<()> {
    let declared = extract_variables(&read_file(root_file)?)?;
    let local_vars = extract_variables(&read_file(local)?)?;

    for (name, variable) in local_vars {
        if !declared.contains_key(&name) {
            return Err(FlowError::InvalidConfig(format!(
                "{} に未宣言の変数があります: {}",
                LOCAL_OVERRIDE_FILE, name
            )));
        }
        let Some(default) = variable.default else {
            continue;
        };
        let value = match default {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        options.overrides.entry(name).or_insert(value);
    }
    Ok(())
}

/// `user_data` ブロックをスクリプト文字列に置き換える
///
/// - `user_data file="bootstrap.sh"`: base_dir からの相対パスを読み込む
/// - `user_data builtin="debian-apache"`: 組み込みスクリプト
fn resolve_user_data(document: &mut Document, base_dir: &Path) -> Result<()> {
    for node in document.resources.values_mut() {
        let Some(Value::Block(block)) = node.attributes.get("user_data") else {
            continue;
        };

        let script = if let Some(file) = block.get("file").and_then(Value::as_str) {
            read_file(&base_dir.join(file))?
        } else if let Some(name) = block.get("builtin").and_then(Value::as_str) {
            scripts::builtin(name)
                .ok_or_else(|| FlowError::UnknownBuiltinScript(name.to_string()))?
                .to_string()
        } else {
            return Err(FlowError::InvalidConfig(format!(
                "{}: user_data には file または builtin を指定してください",
                node.address
            )));
        };

        debug!(resource = %node.address, bytes = script.len(), "Resolved user_data");
        node.attributes
            .insert("user_data".to_string(), Value::String(script));
    }
    Ok(())
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| FlowError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
