use crate::utils::Context;
use colored::Colorize;
use skyform_core::discovery::{ROOT_FILE, WORK_DIR};
use skyform_core::scripts::DEBIAN_WEB_STACK;

/// state は秘密鍵を含むので作業ディレクトリごと無視させる
const WORK_DIR_GITIGNORE: &str = "*\n";

pub fn handle(context: &Context, force: bool) -> anyhow::Result<()> {
    let root = match &context.file {
        Some(_) => context.project_root()?,
        None => std::env::current_dir()?,
    };

    let work_dir = root.join(WORK_DIR);
    std::fs::create_dir_all(&work_dir)?;
    let gitignore = work_dir.join(".gitignore");
    if !gitignore.exists() {
        std::fs::write(&gitignore, WORK_DIR_GITIGNORE)?;
    }
    println!("  {} {}", "✓".green(), work_dir.display().to_string().cyan());

    let document = match &context.file {
        Some(file) => file.clone(),
        None => root.join(ROOT_FILE),
    };
    if document.exists() && !force {
        println!(
            "  {} {} は既に存在します（上書きするには --force）",
            "-".yellow(),
            document.display()
        );
    } else {
        std::fs::write(&document, DEBIAN_WEB_STACK)?;
        println!("  {} {}", "✓".green(), document.display().to_string().cyan());
    }

    println!();
    println!("{}", "次のステップ:".bold());
    println!("  skyform plan --var ssh_ingress_cidr=<YOUR_IP>/32 --var candidate_name=<NAME>");
    Ok(())
}
