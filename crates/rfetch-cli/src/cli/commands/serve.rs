//! `rfetch serve` – run the local HTTP intake endpoint in the foreground.

use std::sync::Arc;

use anyhow::Result;
use rfetch_core::http_endpoint;
use rfetch_core::manager::DownloadManager;

pub fn run_serve(manager: &Arc<DownloadManager>) -> Result<()> {
    let port = manager.http_endpoint_port();
    println!("Listening for download requests on http://0.0.0.0:{port}");
    http_endpoint::serve(Arc::clone(manager), port)?;
    Ok(())
}
