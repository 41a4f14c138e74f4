use crate::utils::{self, Context};
use colored::Colorize;

pub async fn handle(context: &Context) -> anyhow::Result<()> {
    context.print_sources();
    let document = context.load_document()?;
    let engine = context.engine().await?;

    println!("{}", "プランを作成中...".blue());
    let plan = engine.plan(&document).await?;
    println!();

    if !plan.has_changes {
        println!("{}", "変更はありません。state はドキュメントと一致しています。".green());
    }
    utils::print_plan(&plan);
    Ok(())
}
