//! `rfetch run` – start every registered download and report progress until done.

use std::thread;
use std::time::Duration;

use anyhow::Result;
use rfetch_core::checkpoint::TaskStatus;
use rfetch_core::manager::DownloadManager;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub fn run_run(manager: &DownloadManager) -> Result<()> {
    let mut started = 0u32;
    for (id, progress) in manager.get_all_tasks() {
        if matches!(progress.status, TaskStatus::Initialized | TaskStatus::Paused) {
            manager.start_task(&id)?;
            started += 1;
        }
    }
    if started == 0 {
        println!("No tasks to start.");
    }

    loop {
        let tasks = manager.get_all_tasks();
        if tasks.is_empty() || tasks.iter().all(|(_, p)| p.status.is_terminal()) {
            break;
        }
        for (id, progress) in &tasks {
            let speed_mib = progress.speed / 1_048_576.0;
            print!(
                "\r{:<24} {:>6.1}%  {:>7.2} MiB/s   ",
                id, progress.percentage, speed_mib
            );
        }
        println!();
        thread::sleep(POLL_INTERVAL);
    }

    for (id, progress) in manager.get_all_tasks() {
        println!("{id}: {:?}", progress.status);
    }
    Ok(())
}
