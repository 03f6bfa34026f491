use clap::Args;

use super::DEFAULT_MOUNT_ID;
use crate::cli::GlobalFlags;

#[derive(Args, Debug)]
pub struct MountArgs {
    /// Volume name
    pub name: String,

    /// Caller identifier, only used in logs
    #[arg(long, default_value = DEFAULT_MOUNT_ID)]
    pub id: String,
}

pub async fn execute(args: MountArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let session = global.open().await?;
    let result = session.driver.mount(&args.name, &args.id).await;
    session.close().await?;

    println!("{}", result?.display());
    Ok(())
}
