//! skyform のユーザー設定
//!
//! `settings.yaml` から state ディレクトリ名・ロックのタイムアウト・
//! リトライ回数などを読み込みます。ファイルが無ければデフォルト値を使います。

pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// 設定ファイル名
pub const SETTINGS_FILE: &str = "settings.yaml";

/// 設定ファイルパスを直接指定する環境変数
pub const SETTINGS_PATH_ENV: &str = "SKYFORM_SETTINGS_PATH";

/// ユーザー設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// プロジェクトルートからの state ディレクトリ
    pub state_dir: String,

    /// この秒数より古いロックは放棄されたものとみなす
    pub lock_timeout_secs: u64,

    /// プロバイダー呼び出しのリトライ
    pub retry: RetrySettings,

    /// サンドボックスプロバイダー
    pub sandbox: SandboxSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_dir: ".skyform".to_string(),
            lock_timeout_secs: 3600,
            retry: RetrySettings::default(),
            sandbox: SandboxSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    /// サンドボックスのリソースを state ディレクトリに永続化する
    pub persist: bool,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self { persist: true }
    }
}

impl Settings {
    /// 値の整合性を検証
    pub fn validate(&self) -> Result<()> {
        if self.state_dir.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "state_dir を空にはできません".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "retry.max_attempts は 1 以上を指定してください".to_string(),
            ));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::InvalidValue(
                "retry.initial_delay_ms は retry.max_delay_ms 以下にしてください".to_string(),
            ));
        }
        Ok(())
    }

    /// プロジェクトルートからの state ディレクトリ
    pub fn state_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.state_dir)
    }
}

/// skyform のグローバル設定ディレクトリを取得
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("skyform");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// 設定ファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 SKYFORM_SETTINGS_PATH (直接パス指定、存在しなければエラー)
/// 2. ./.skyform/settings.yaml
/// 3. ~/.config/skyform/settings.yaml (グローバル設定)
///
/// どれも無ければ `Ok(None)`
pub fn find_settings_file() -> Result<Option<PathBuf>> {
    // 1. 環境変数で直接指定
    if let Ok(settings_path) = std::env::var(SETTINGS_PATH_ENV) {
        let path = PathBuf::from(settings_path);
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(ConfigError::SettingsFileNotFound(path));
    }

    // 2. プロジェクトローカル
    let local = std::env::current_dir()?.join(".skyform").join(SETTINGS_FILE);
    if local.exists() {
        return Ok(Some(local));
    }

    // 3. グローバル設定ファイル
    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("skyform").join(SETTINGS_FILE);
        if global.exists() {
            return Ok(Some(global));
        }
    }

    Ok(None)
}

/// 設定を読み込む（見つからなければデフォルト）
pub fn load_settings() -> Result<Settings> {
    match find_settings_file()? {
        Some(path) => load_settings_from(&path),
        None => {
            debug!("No settings file found, using defaults");
            Ok(Settings::default())
        }
    }
}

/// 指定したファイルから設定を読み込む
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)?;
    // 空ファイルはデフォルト扱い
    let settings: Settings = if content.trim().is_empty() {
        Settings::default()
    } else {
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?
    };
    settings.validate()?;
    debug!(path = %path.display(), "Loaded settings");
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.state_dir, ".skyform");
        assert_eq!(settings.lock_timeout_secs, 3600);
        assert_eq!(settings.retry.max_attempts, 3);
        assert!(settings.sandbox.persist);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(SETTINGS_FILE);
        fs::write(&path, "retry:\n  max_attempts: 5\n").unwrap();

        let settings = load_settings_from(&path).unwrap();
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.retry.initial_delay_ms, 1000);
        assert_eq!(settings.state_dir, ".skyform");
    }

    #[test]
    fn test_invalid_values() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(SETTINGS_FILE);
        fs::write(&path, "retry:\n  max_attempts: 0\n").unwrap();
        assert!(matches!(
            load_settings_from(&path),
            Err(ConfigError::InvalidValue(_))
        ));

        fs::write(&path, "state_dir: [1, 2]\n").unwrap();
        assert!(matches!(
            load_settings_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_empty_file_is_default() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(SETTINGS_FILE);
        fs::write(&path, "").unwrap();
        assert_eq!(load_settings_from(&path).unwrap(), Settings::default());
    }

    #[test]
    #[serial]
    fn test_find_settings_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("custom.yaml");
        fs::write(&path, "lock_timeout_secs: 60\n").unwrap();

        temp_env::with_var(SETTINGS_PATH_ENV, Some(path.as_os_str()), || {
            assert_eq!(find_settings_file().unwrap(), Some(path.clone()));
            assert_eq!(load_settings().unwrap().lock_timeout_secs, 60);
        });
    }

    #[test]
    #[serial]
    fn test_find_settings_file_env_var_missing() {
        temp_env::with_var(SETTINGS_PATH_ENV, Some("/nonexistent/settings.yaml"), || {
            assert!(matches!(
                find_settings_file(),
                Err(ConfigError::SettingsFileNotFound(_))
            ));
        });
    }

    #[test]
    #[serial]
    fn test_find_settings_file_in_project_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        let work_dir = temp_dir.path().join(".skyform");
        fs::create_dir(&work_dir).unwrap();
        fs::write(work_dir.join(SETTINGS_FILE), "state_dir: .state\n").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();

        temp_env::with_var_unset(SETTINGS_PATH_ENV, || {
            let found = find_settings_file().unwrap().unwrap();
            assert!(found.ends_with(".skyform/settings.yaml"));
            assert_eq!(load_settings().unwrap().state_dir, ".state");
        });

        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    fn test_state_path() {
        let settings = Settings::default();
        assert_eq!(
            settings.state_path(Path::new("/work")),
            PathBuf::from("/work/.skyform")
        );
    }
}
