//! `rfetch pause <id>` – pause a running download.

use anyhow::Result;
use rfetch_core::manager::DownloadManager;

pub fn run_pause(manager: &DownloadManager, id: &str) -> Result<()> {
    manager.pause_task(id)?;
    println!("Paused task {id}");
    Ok(())
}
