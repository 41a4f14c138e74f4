use crate::utils::{self, Context};
use colored::Colorize;

pub async fn handle(context: &Context, yes: bool) -> anyhow::Result<()> {
    let engine = context.engine().await?;
    let state = engine.state_manager().load().await?;

    if state.is_empty() {
        println!("{}", "削除するリソースはありません。".green());
        return Ok(());
    }

    println!("{}", "以下のリソースを削除します:".bold());
    for address in state.destroy_order()?.iter().filter(|a| !a.is_data()) {
        println!("  {} {}", "-".red().bold(), address.to_string().red());
    }
    println!();

    if !yes && !utils::confirm("削除しますか？")? {
        println!("{}", "キャンセルしました".yellow());
        return Ok(());
    }

    let result = engine.destroy().await?;
    utils::print_result(&result);
    println!();

    if !result.is_success() {
        anyhow::bail!(
            "{} 件のリソースを削除できませんでした",
            result.failed.len()
        );
    }
    println!(
        "{}",
        format!("✓ 削除完了: {} 件", result.succeeded.len())
            .green()
            .bold()
    );
    Ok(())
}
