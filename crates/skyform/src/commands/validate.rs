use crate::utils::Context;
use colored::Colorize;
use skyform_cloud::Engine;

pub fn handle(context: &Context) -> anyhow::Result<()> {
    println!("{}", "ドキュメントを検証中...".blue());
    context.print_sources();

    let document = match context.load_document() {
        Ok(document) => document,
        Err(e) => fail(&e.to_string()),
    };
    let graph = match Engine::prepare(&document) {
        Ok(graph) => graph,
        Err(e) => fail(&e.to_string()),
    };
    let levels = graph.levels()?;

    println!("{}", "✓ ドキュメントは正常です".green().bold());
    println!();
    println!("サマリー:");
    if let Some(region) = document.region() {
        println!("  リージョン: {}", region.cyan());
    }
    println!(
        "  リソース: {}個 (data: {}個)",
        document.managed_resources().count(),
        document.data_sources().count()
    );
    println!("  output: {}個", document.outputs.len());
    println!("  適用順:");
    for (i, wave) in levels.iter().enumerate() {
        let names: Vec<String> = wave.iter().map(|a| a.to_string()).collect();
        println!("    {}. {}", i + 1, names.join(", ").cyan());
    }
    Ok(())
}

fn fail(message: &str) -> ! {
    eprintln!();
    eprintln!("{}", "✗ 検証エラー".red().bold());
    eprintln!("  {}", message);
    std::process::exit(1);
}
