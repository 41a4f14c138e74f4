use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// SSH を許可するテスト用の単一ホスト
pub const OPERATOR_CIDR: &str = "ssh_ingress_cidr=203.0.113.10/32";

pub struct TestProject {
    pub root: TempDir,
    home: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
            home: tempfile::tempdir().unwrap(),
        }
    }

    /// 同梱の Debian web スタックを skyform.kdl として置く
    #[allow(dead_code)]
    pub fn with_golden_stack() -> Self {
        let project = Self::new();
        project.write_skyform_kdl(skyform_core::scripts::DEBIAN_WEB_STACK);
        project
    }

    pub fn write_skyform_kdl(&self, content: &str) {
        fs::write(self.root.path().join("skyform.kdl"), content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    /// プロジェクトで実行する skyform（グローバル設定は読まない）
    pub fn skyform(&self) -> Command {
        let mut cmd = Command::cargo_bin("skyform").unwrap();
        cmd.current_dir(self.path())
            .env("HOME", self.home.path())
            .env("XDG_CONFIG_HOME", self.home.path())
            .env_remove("SKYFORM_SETTINGS_PATH")
            .env_remove("SKYFORM_FILE")
            .env_remove("SKYFORM_PROJECT_ROOT")
            .env_remove("SKYFORM_SANDBOX_FAIL")
            .env_remove("RUST_LOG")
            .env("NO_COLOR", "1");
        cmd
    }
}
