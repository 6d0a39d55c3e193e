//! `rfetch add <url>` – register a new download.

use anyhow::Result;
use rfetch_core::manager::DownloadManager;
use std::path::PathBuf;

#[allow(clippy::too_many_arguments)]
pub fn run_add(
    manager: &DownloadManager,
    url: String,
    filename: Option<String>,
    threads: Option<usize>,
    download_dir: Option<PathBuf>,
    use_proxy: bool,
    start: bool,
) -> Result<()> {
    let id = manager.add_task(url.clone(), filename, threads, download_dir, use_proxy, None, None)?;
    println!("Added task {id} for URL: {url}");

    if start {
        manager.start_task(&id)?;
        println!("Started task {id}");
    }
    Ok(())
}
