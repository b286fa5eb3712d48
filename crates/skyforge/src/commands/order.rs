use super::Session;
use colored::Colorize;
use skyforge_core::Lifecycle;
use std::path::Path;

pub fn handle(session: &Session, manifest: &Path) -> anyhow::Result<()> {
    let loaded = session.load(manifest)?;
    let ordered = loaded.graph.ordered()?;

    println!(
        "{}",
        format!("Task order for {} ({} tasks):", loaded.cluster, ordered.len()).bold()
    );
    for (i, task) in ordered.iter().enumerate() {
        let lifecycle = task.lifecycle();
        if lifecycle == Lifecycle::Sync {
            println!("  {:>3}. {}", i + 1, task.key().to_string().cyan());
        } else {
            println!(
                "  {:>3}. {} [{}]",
                i + 1,
                task.key().to_string().cyan(),
                lifecycle.to_string().yellow()
            );
        }
    }

    Ok(())
}
