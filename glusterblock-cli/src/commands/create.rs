use std::collections::HashMap;

use clap::Args;

use crate::cli::{GlobalFlags, parse_key_val};

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Volume name
    pub name: String,

    /// Backing file size (e.g. 512M, 10G)
    #[arg(long)]
    pub size: Option<String>,

    /// Filesystem to format the backing file with
    #[arg(long)]
    pub filesystem: Option<String>,

    /// Backing file name template containing {name}
    #[arg(long)]
    pub filename_format: Option<String>,

    /// Create option as key=value (repeatable)
    #[arg(id = "opt", short = 'o', long = "opt", value_parser = parse_key_val)]
    pub options: Vec<(String, String)>,
}

impl CreateArgs {
    fn into_options(self) -> (String, HashMap<String, String>) {
        let mut options: HashMap<String, String> = self.options.into_iter().collect();
        for (key, value) in [
            ("size", self.size),
            ("filesystem", self.filesystem),
            ("filename-format", self.filename_format),
        ] {
            if let Some(value) = value {
                options.insert(key.to_string(), value);
            }
        }
        (self.name, options)
    }
}

pub async fn execute(args: CreateArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let session = global.open().await?;
    let (name, options) = args.into_options();

    let result = session.driver.create(&name, &options).await;
    session.close().await?;

    let volume = result?;
    println!("{}", volume.name);
    Ok(())
}
