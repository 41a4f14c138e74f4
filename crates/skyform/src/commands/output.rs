use crate::utils::{self, Context};

/// output を表示
///
/// sensitive な値は NAME を指定して --show-sensitive を付けた場合のみ平文で出す
pub async fn handle(
    context: &Context,
    name: Option<&str>,
    show_sensitive: bool,
) -> anyhow::Result<()> {
    let engine = context.engine().await?;
    let outputs = engine.outputs().await?;

    let Some(name) = name else {
        if show_sensitive {
            anyhow::bail!("--show-sensitive には output 名の指定が必要です");
        }
        if outputs.is_empty() {
            println!("output はありません。先に apply を実行してください");
        }
        utils::print_outputs(&outputs);
        return Ok(());
    };

    let output = outputs
        .get(name)
        .ok_or_else(|| anyhow::anyhow!("output '{}' は state にありません", name))?;
    if show_sensitive {
        println!("{}", skyform_cloud::format_value(output.reveal()));
    } else {
        println!("{}", output.display());
    }
    Ok(())
}
