mod commands;
mod utils;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "skyform")]
#[command(about = "宣言したとおりに、依存順で。AWS スタックを KDL で。", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 変数を上書き (KEY=VALUE, 複数指定可)
    #[arg(long = "var", value_name = "KEY=VALUE", global = true)]
    vars: Vec<String>,

    /// ドキュメントファイル（省略時は skyform.kdl を自動検索）
    #[arg(short = 'f', long, env = "SKYFORM_FILE", global = true)]
    file: Option<PathBuf>,

    /// ログを詳細に出力 (-v: info, -vv: debug, -vvv: trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// 作業ディレクトリとスターター用ドキュメントを作成
    Init {
        /// 既存の skyform.kdl を上書きする
        #[arg(long)]
        force: bool,
    },
    /// ドキュメントを検証
    Validate,
    /// 実行される変更を表示（副作用なし）
    Plan,
    /// 依存順にリソースを作成
    Apply {
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
    },
    /// state に記録されたリソースを逆順に削除
    Destroy {
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
    },
    /// output の値を表示
    Output {
        /// output 名（省略時は全件）
        name: Option<String>,
        /// sensitive な値を平文で表示（NAME の指定が必要）
        #[arg(long)]
        show_sensitive: bool,
    },
    /// 依存グラフを表示
    Graph {
        /// Graphviz DOT 形式で出力
        #[arg(long)]
        dot: bool,
    },
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ログは stderr へ。RUST_LOG が優先
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let context = utils::Context::new(cli.file, &cli.vars)?;

    match cli.command {
        Commands::Init { force } => commands::init::handle(&context, force)?,
        Commands::Validate => commands::validate::handle(&context)?,
        Commands::Plan => commands::plan::handle(&context).await?,
        Commands::Apply { yes } => commands::apply::handle(&context, yes).await?,
        Commands::Destroy { yes } => commands::destroy::handle(&context, yes).await?,
        Commands::Output {
            name,
            show_sensitive,
        } => commands::output::handle(&context, name.as_deref(), show_sensitive).await?,
        Commands::Graph { dot } => commands::graph::handle(&context, dot)?,
        Commands::Version => {
            println!("skyform {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
