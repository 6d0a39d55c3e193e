//! `rfetch status` – show status of all registered downloads.

use anyhow::Result;
use rfetch_core::manager::DownloadManager;

pub fn run_status(manager: &DownloadManager) -> Result<()> {
    let mut tasks = manager.get_all_tasks();
    if tasks.is_empty() {
        println!("No tasks registered.");
        return Ok(());
    }
    tasks.sort_by(|a, b| a.0.cmp(&b.0));

    println!(
        "{:<24} {:<12} {:>7} {:>10} {:>6}",
        "ID", "STATUS", "PCT", "SPEED", "THREADS"
    );
    for (id, progress) in tasks {
        let speed_mib = progress.speed / 1_048_576.0;
        println!(
            "{:<24} {:<12} {:>6.1}% {:>7.2} MiB/s {:>6}",
            id,
            format!("{:?}", progress.status).to_lowercase(),
            progress.percentage,
            speed_mib,
            progress.thread_count,
        );
        if let Some(msg) = &progress.error_message {
            println!("  error: {msg}");
        }
    }
    Ok(())
}
