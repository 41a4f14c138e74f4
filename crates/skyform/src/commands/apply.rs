use crate::utils::{self, Context};
use colored::Colorize;

pub async fn handle(context: &Context, yes: bool) -> anyhow::Result<()> {
    context.print_sources();
    let document = context.load_document()?;
    let engine = context.engine().await?;

    let plan = engine.plan(&document).await?;
    utils::print_plan(&plan);
    println!();

    if !plan.has_changes {
        println!("{}", "変更はありません。".green());
        return Ok(());
    }
    if !yes && !utils::confirm("適用しますか？")? {
        println!("{}", "キャンセルしました".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("{} に適用中...", engine.provider().display_name()).blue()
    );
    let result = engine.apply(&document).await?;
    utils::print_result(&result);
    println!();

    if !result.is_success() {
        anyhow::bail!(
            "{} 件のリソースで失敗しました。作成済みのリソースは state に記録されています。修正後に再度 apply してください",
            result.failed.len()
        );
    }

    println!(
        "{}",
        format!("✓ 適用完了: {} 件", result.succeeded.len())
            .green()
            .bold()
    );
    let outputs = engine.outputs().await?;
    if !outputs.is_empty() {
        println!();
        utils::print_outputs(&outputs);
    }
    Ok(())
}
