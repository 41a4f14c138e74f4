//! 初回起動時の組み込みスクリプト
//!
//! `user_data builtin="<name>"` で参照される組み込みスクリプト。
//! プロビジョニング側では中身を解釈せず、文字列属性として扱います。

/// Debian 12 + Apache
///
/// パッケージを更新し、apache2 をインストールして有効化する
pub const DEBIAN_APACHE: &str = r#"#!/bin/bash
set -e

export DEBIAN_FRONTEND=noninteractive

apt-get update -y
apt-get upgrade -y
apt-get install -y apache2

systemctl enable apache2
systemctl start apache2
"#;

/// `skyform init` が書き出すスターター用ドキュメント
pub const DEBIAN_WEB_STACK: &str = include_str!("../stacks/debian-web.kdl");

/// 組み込みスクリプトを名前で取得
pub fn builtin(name: &str) -> Option<&'static str> {
    match name {
        "debian-apache" => Some(DEBIAN_APACHE),
        _ => None,
    }
}
