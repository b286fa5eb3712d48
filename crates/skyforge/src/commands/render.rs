use super::{Session, cancel_on_ctrl_c};
use colored::Colorize;
use skyforge_core::{Executor, RenderTarget, TargetKind};
use std::path::Path;

pub async fn handle(
    session: &Session,
    manifest: &Path,
    target: Option<TargetKind>,
    out: Option<&Path>,
) -> anyhow::Result<()> {
    let kind = target.unwrap_or(session.settings().target);
    if kind == TargetKind::DirectApply {
        anyhow::bail!("render needs an emit target: terraform or cloudformation");
    }

    let loaded = session.load(manifest)?;
    let cloud = session.cloud(&loaded.cluster);
    let mut target = RenderTarget::for_kind(kind);

    let report = Executor::with_cancellation(cancel_on_ctrl_c())
        .run(&cloud, &loaded.graph, &mut target)
        .await?;

    let Some(document) = target.render_document()? else {
        anyhow::bail!("{kind} target produced no document");
    };
    match out {
        Some(path) => {
            std::fs::write(path, format!("{document}\n"))?;
            eprintln!(
                "{} {} ({})",
                "✓ wrote".green(),
                path.display().to_string().cyan(),
                report.summary()
            );
        }
        None => println!("{document}"),
    }

    Ok(())
}
