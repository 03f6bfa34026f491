use clap::Args;

use crate::cli::GlobalFlags;

#[derive(Args, Debug)]
pub struct PathArgs {
    /// Volume name
    pub name: String,
}

/// Prints nothing for a volume that is not mounted.
pub async fn execute(args: PathArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let session = global.open().await?;
    let path = session.driver.path(&args.name);
    session.close().await?;

    if let Some(path) = path? {
        println!("{}", path.display());
    }
    Ok(())
}
