use colored::Colorize;
use skyform_cloud::{
    Action, ActionType, ApplyResult, Engine, OutputState, Plan, RetryConfig, StateManager,
    format_value,
};
use skyform_cloud_sandbox::{ACCOUNT_FILE, SandboxProvider};
use skyform_config::Settings;
use skyform_core::discovery::{LOCAL_OVERRIDE_FILE, ROOT_FILE, WORK_DIR};
use skyform_core::{Document, LoadOptions};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// サンドボックスで失敗させるアドレス（カンマ区切り、テスト用）
pub const SANDBOX_FAIL_ENV: &str = "SKYFORM_SANDBOX_FAIL";

/// コマンド共通の入力（--file と --var）
pub struct Context {
    pub file: Option<PathBuf>,
    pub overrides: HashMap<String, String>,
}

impl Context {
    pub fn new(file: Option<PathBuf>, vars: &[String]) -> anyhow::Result<Self> {
        Ok(Self {
            file,
            overrides: parse_vars(vars)?,
        })
    }

    /// プロジェクトルート
    ///
    /// --file 指定時はそのディレクトリ（.skyform/ 内なら一つ上）
    pub fn project_root(&self) -> anyhow::Result<PathBuf> {
        match &self.file {
            Some(file) => Ok(root_for_file(file)),
            None => Ok(skyform_core::find_project_root()?),
        }
    }

    /// ドキュメントをロード（変数展開・user_data 解決済み）
    pub fn load_document(&self) -> anyhow::Result<Document> {
        let mut options = LoadOptions::new();
        options.overrides = self.overrides.clone();

        let document = match &self.file {
            Some(file) => skyform_core::load_document_file(file, &options)?,
            None => {
                let root = skyform_core::find_project_root()?;
                skyform_core::load_project_from_root(&root, &options)?
            }
        };
        Ok(document)
    }

    /// 読み込むドキュメントファイルを表示
    pub fn print_sources(&self) {
        match &self.file {
            Some(file) => {
                println!("📄 読み込んだドキュメント:");
                println!("  • {}", file.display().to_string().cyan());
            }
            None => {
                if let Ok(root) = skyform_core::find_project_root() {
                    print_loaded_files(&root);
                }
            }
        }
    }

    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings = skyform_config::load_settings()?;
        settings.validate()?;
        Ok(settings)
    }

    /// 設定に従ってエンジンを組み立てる
    pub async fn engine(&self) -> anyhow::Result<Engine> {
        let root = self.project_root()?;
        let settings = self.settings()?;

        let state = StateManager::new(&root)
            .with_state_dir(settings.state_dir.clone())
            .with_lock_timeout(Duration::from_secs(settings.lock_timeout_secs));

        let mut provider = if settings.sandbox.persist {
            SandboxProvider::open(state.state_dir().join(ACCOUNT_FILE)).await?
        } else {
            SandboxProvider::new()
        };
        if let Ok(addresses) = std::env::var(SANDBOX_FAIL_ENV) {
            for address in addresses.split(',').map(str::trim).filter(|a| !a.is_empty()) {
                provider = provider.with_failure(address);
            }
        }

        let retry = RetryConfig {
            max_attempts: settings.retry.max_attempts,
            initial_delay: Duration::from_millis(settings.retry.initial_delay_ms),
            max_delay: Duration::from_millis(settings.retry.max_delay_ms),
            ..RetryConfig::default()
        };
        Ok(Engine::new(Arc::new(provider), state).with_retry(retry))
    }
}

/// `KEY=VALUE` の列をパース
pub fn parse_vars(vars: &[String]) -> anyhow::Result<HashMap<String, String>> {
    let mut parsed = HashMap::new();
    for var in vars {
        let (key, value) = var
            .split_once('=')
            .filter(|(key, _)| !key.trim().is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!("--var は KEY=VALUE 形式で指定してください: {}", var)
            })?;
        parsed.insert(key.trim().to_string(), value.to_string());
    }
    Ok(parsed)
}

fn root_for_file(file: &Path) -> PathBuf {
    let dir = file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    if dir.file_name().is_some_and(|name| name == WORK_DIR) {
        dir.parent().unwrap_or(Path::new(".")).to_path_buf()
    } else {
        dir.to_path_buf()
    }
}

/// 読み込んだドキュメントファイルを表示
pub fn print_loaded_files(project_root: &Path) {
    println!("📄 読み込んだドキュメント:");

    for candidate in [
        project_root.join(ROOT_FILE),
        project_root.join(WORK_DIR).join(ROOT_FILE),
    ] {
        if candidate.exists() {
            println!("  • {}", candidate.display().to_string().cyan());
            break;
        }
    }

    let local = project_root.join(LOCAL_OVERRIDE_FILE);
    if local.exists() {
        println!(
            "  • {} (ローカル変数オーバーライド)",
            local.display().to_string().cyan()
        );
    }
}

/// 確認プロンプト。y 以外はキャンセル
pub fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{} [y/N]: ", prompt);
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// 表示用に値を1行へ縮める
pub fn summarize(value: &serde_json::Value) -> String {
    let text = format_value(value);
    match text.lines().count() {
        0 | 1 => text,
        n => format!(
            "{} … ({} 行, {} バイト)",
            text.lines().next().unwrap_or_default(),
            n,
            text.len()
        ),
    }
}

fn print_action(action: &Action) {
    let (symbol, address) = match action.action_type {
        ActionType::Create => ("+".green().bold(), action.address.to_string().green()),
        ActionType::Delete => ("-".red().bold(), action.address.to_string().red()),
        ActionType::Read => ("<=".cyan().bold(), action.address.to_string().cyan()),
        ActionType::NoOp => return,
    };
    println!("  {} {}", symbol, address);
    for (key, value) in &action.details {
        println!("      {} = {}", key.dimmed(), summarize(value));
    }
}

pub fn print_plan(plan: &Plan) {
    for action in &plan.actions {
        print_action(action);
    }
    let unchanged = plan.actions_by_type(ActionType::NoOp);
    if !unchanged.is_empty() {
        println!(
            "  {}",
            format!("({} 件は変更なし)", unchanged.len()).dimmed()
        );
    }
    println!();
    println!("{} {}", "Plan:".bold(), plan.summary());
}

pub fn print_result(result: &ApplyResult) {
    for ok in &result.succeeded {
        println!("  {} {} {}", "✓".green(), ok.address.cyan(), ok.message.dimmed());
    }
    for failed in &result.failed {
        println!(
            "  {} {} {}",
            "✗".red(),
            failed.address.red(),
            failed.error.as_deref().unwrap_or_default()
        );
    }
    for skipped in &result.skipped {
        println!("  {} {} (未実行)", "-".yellow(), skipped.yellow());
    }
    println!(
        "{}",
        format!("  所要時間: {} ms", result.duration_ms).dimmed()
    );
}

/// output 一覧。sensitive な値は常に伏せる
pub fn print_outputs(outputs: &BTreeMap<String, OutputState>) {
    if outputs.is_empty() {
        return;
    }
    println!("{}", "Outputs:".bold());
    for (name, output) in outputs {
        println!("  {} = {}", name.cyan(), output.display());
    }
}
