use crate::utils::Context;
use colored::Colorize;
use skyform_cloud::Engine;

pub fn handle(context: &Context, dot: bool) -> anyhow::Result<()> {
    let document = context.load_document()?;
    let graph = Engine::prepare(&document)?;

    if dot {
        print!("{}", graph.to_dot());
        return Ok(());
    }

    for (i, wave) in graph.levels()?.iter().enumerate() {
        println!("{}", format!("wave {}", i + 1).bold());
        for address in wave {
            let deps: Vec<String> = graph.dependencies(address).map(|d| d.to_string()).collect();
            if deps.is_empty() {
                println!("  {}", address.to_string().cyan());
            } else {
                println!(
                    "  {} {} {}",
                    address.to_string().cyan(),
                    "←".dimmed(),
                    deps.join(", ").dimmed()
                );
            }
        }
    }
    Ok(())
}
