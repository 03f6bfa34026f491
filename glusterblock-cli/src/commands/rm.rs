use clap::Args;

use crate::cli::GlobalFlags;

#[derive(Args, Debug)]
pub struct RmArgs {
    /// Name of the volume(s) to remove
    #[arg(required = true, num_args = 1..)]
    pub targets: Vec<String>,
}

pub async fn execute(args: RmArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let session = global.open().await?;

    let mut active_error = false;
    for target in args.targets {
        if let Err(e) = session.driver.remove(&target).await {
            eprintln!("Error removing volume '{}': {}", target, e);
            active_error = true;
        } else {
            println!("{}", target);
        }
    }
    session.close().await?;

    if active_error {
        anyhow::bail!("Some volumes could not be removed");
    }
    Ok(())
}
