//! モデル定義
//!
//! skyform の宣言ドキュメントを表すデータモデルを定義します。
//! 各モデルは機能ごとにモジュールに分離されています。

mod address;
mod document;
mod resource;
mod value;

// Re-exports
pub use address::*;
pub use document::*;
pub use resource::*;
pub use value::*;
