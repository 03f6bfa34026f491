use clap::Args;
use glusterblock::BlockVolume;

use crate::cli::GlobalFlags;

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Name of the volume(s) to inspect
    #[arg(required = true, num_args = 1..)]
    pub targets: Vec<String>,
}

pub async fn execute(args: InspectArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let session = global.open().await?;

    let mut found: Vec<BlockVolume> = Vec::new();
    let mut missing = Vec::new();
    for target in &args.targets {
        match session.driver.get(target) {
            Ok(volume) => found.push(volume),
            Err(e) => {
                eprintln!("Error: {}", e);
                missing.push(target.as_str());
            }
        }
    }
    session.close().await?;

    println!("{}", serde_json::to_string_pretty(&found)?);
    if !missing.is_empty() {
        anyhow::bail!("No such volume(s): {}", missing.join(", "));
    }
    Ok(())
}
