use clap::Args;

use crate::cli::GlobalFlags;

#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Volumes to reconcile (default: all)
    pub targets: Vec<String>,
}

pub async fn execute(args: ReconcileArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let session = global.open().await?;
    let targets = if args.targets.is_empty() {
        session.driver.list().into_iter().map(|v| v.name).collect()
    } else {
        args.targets
    };

    let mut errors = Vec::new();
    for target in &targets {
        match session.driver.reconcile(target).await {
            Ok(volume) => println!("{}\t{} mounts", volume.name, volume.mount_count),
            Err(e) => {
                eprintln!("Error reconciling volume '{}': {}", target, e);
                errors.push(format!("{}: {}", target, e));
            }
        }
    }
    session.close().await?;

    if !errors.is_empty() {
        anyhow::bail!(
            "Failed to reconcile {} of {} volume(s)\nErrors:\n  {}",
            errors.len(),
            targets.len(),
            errors.join("\n  ")
        );
    }
    Ok(())
}
