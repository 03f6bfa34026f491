use clap::Args;

use super::DEFAULT_MOUNT_ID;
use crate::cli::GlobalFlags;

#[derive(Args, Debug)]
pub struct UnmountArgs {
    /// Volume name
    pub name: String,

    /// Caller identifier, only used in logs
    #[arg(long, default_value = DEFAULT_MOUNT_ID)]
    pub id: String,
}

pub async fn execute(args: UnmountArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let session = global.open().await?;
    let result = session.driver.unmount(&args.name, &args.id).await;
    session.close().await?;

    result?;
    println!("{}", args.name);
    Ok(())
}
