use chrono::Local;
use clap::{Args, ValueEnum};
use comfy_table::presets::NOTHING;
use comfy_table::{Cell, Table};
use glusterblock::BlockVolume;

use crate::cli::GlobalFlags;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only display volume names
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

pub async fn execute(args: ListArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let session = global.open().await?;
    let volumes = session.driver.list();
    session.close().await?;

    if args.quiet {
        for volume in &volumes {
            println!("{}", volume.name);
        }
        return Ok(());
    }

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&volumes)?),
        OutputFormat::Table => println!("{}", render_table(&volumes)),
    }
    Ok(())
}

fn render_table(volumes: &[BlockVolume]) -> Table {
    let mut table = Table::new();
    table.load_preset(NOTHING).set_header(vec![
        "NAME",
        "FILESYSTEM",
        "SIZE",
        "MOUNTS",
        "MOUNT POINT",
        "CREATED",
    ]);

    for volume in volumes {
        let mount_point = volume
            .active_mount_point()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(&volume.name),
            Cell::new(volume.filesystem),
            Cell::new(volume.size_bytes),
            Cell::new(volume.mount_count),
            Cell::new(mount_point),
            Cell::new(
                volume
                    .created_at
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M:%S"),
            ),
        ]);
    }
    table
}
