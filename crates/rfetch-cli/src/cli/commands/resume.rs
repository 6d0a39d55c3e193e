//! `rfetch resume <id>` – resume a paused download.

use anyhow::Result;
use rfetch_core::manager::DownloadManager;

pub fn run_resume(manager: &DownloadManager, id: &str) -> Result<()> {
    manager.resume_task(id)?;
    println!("Resumed task {id}");
    Ok(())
}
