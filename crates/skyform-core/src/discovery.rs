//! ファイル自動発見機能
//!
//! プロジェクトルートと、ルートドキュメント・ローカル変数オーバーライドを発見します。

use crate::error::{FlowError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// ルートドキュメントのファイル名
pub const ROOT_FILE: &str = "skyform.kdl";
/// ローカル変数オーバーライドのファイル名
pub const LOCAL_OVERRIDE_FILE: &str = "skyform.local.kdl";
/// プロジェクト作業ディレクトリ
pub const WORK_DIR: &str = ".skyform";

/// 発見されたファイル群
#[derive(Debug, Clone, Default)]
pub struct DiscoveredFiles {
    /// ルートファイル (skyform.kdl)
    pub root: Option<PathBuf>,
    /// ローカルオーバーライドファイル (skyform.local.kdl)
    ///
    /// variable 宣言のみを読み取り、default 値を上書きします。
    pub local_override: Option<PathBuf>,
}

/// プロジェクトルートを検出
///
/// 以下の優先順位で検索:
/// 1. 環境変数 SKYFORM_PROJECT_ROOT
/// 2. カレントディレクトリから上に向かって以下を探す:
///    - skyform.kdl
///    - .skyform/skyform.kdl
#[tracing::instrument]
pub fn find_project_root() -> Result<PathBuf> {
    if let Ok(root) = std::env::var("SKYFORM_PROJECT_ROOT") {
        let path = PathBuf::from(&root);
        debug!(env_root = %root, "Checking SKYFORM_PROJECT_ROOT");
        if has_root_file(&path) {
            info!(project_root = %path.display(), "Found project root from environment variable");
            return Ok(path);
        }
    }

    let start_dir = std::env::current_dir()?;
    find_project_root_from(&start_dir)
}

/// 指定ディレクトリから上に向かってプロジェクトルートを探す
pub fn find_project_root_from(start_dir: &Path) -> Result<PathBuf> {
    let mut current = start_dir.to_path_buf();
    debug!(start_dir = %start_dir.display(), "Searching for project root");

    loop {
        if has_root_file(&current) {
            info!(project_root = %current.display(), "Found project root");
            return Ok(current);
        }

        // 親ディレクトリへ
        if !current.pop() {
            break;
        }
    }

    warn!(start_dir = %start_dir.display(), "Project root not found");
    Err(FlowError::ProjectRootNotFound(start_dir.to_path_buf()))
}

fn has_root_file(dir: &Path) -> bool {
    dir.join(ROOT_FILE).exists() || dir.join(WORK_DIR).join(ROOT_FILE).exists()
}

/// プロジェクトルートからファイルを自動発見
#[tracing::instrument(skip(project_root), fields(project_root = %project_root.display()))]
pub fn discover_files(project_root: &Path) -> Result<DiscoveredFiles> {
    let mut discovered = DiscoveredFiles::default();

    // skyform.kdl または .skyform/skyform.kdl
    discovered.root = first_existing(&[
        project_root.join(ROOT_FILE),
        project_root.join(WORK_DIR).join(ROOT_FILE),
    ]);

    // skyform.local.kdl または .skyform/skyform.local.kdl
    discovered.local_override = first_existing(&[
        project_root.join(LOCAL_OVERRIDE_FILE),
        project_root.join(WORK_DIR).join(LOCAL_OVERRIDE_FILE),
    ]);

    debug!(
        root = ?discovered.root,
        local_override = ?discovered.local_override,
        "File discovery complete"
    );
    Ok(discovered)
}

fn first_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|p| p.exists()).cloned()
}
