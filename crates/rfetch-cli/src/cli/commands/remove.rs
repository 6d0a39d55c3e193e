//! `rfetch remove <id>` – cancel and deregister a download.

use anyhow::{bail, Result};
use rfetch_core::manager::DownloadManager;

pub fn run_remove(manager: &DownloadManager, id: &str) -> Result<()> {
    if !manager.cancel_task(id) {
        bail!("no such task: {id}");
    }
    println!("Removed task {id}");
    Ok(())
}
