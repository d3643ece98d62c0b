//! `potluck run` command: the long-running finalization worker.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use potluck_core::worker::{FinalizationWorker, run_worker};

/// Run the worker until Ctrl+C.
pub async fn run(worker: FinalizationWorker) -> Result<()> {
    let config = worker.config();
    println!("Starting potluck worker");
    println!("  Listening on: {}", config.vote_channel);
    println!("  Publishing to: {}", config.change_channel);
    println!("  Sweep interval: {}s", config.sweep_interval.as_secs());
    println!("  Max concurrent plans: {}", config.max_concurrent_plans);

    // First signal cancels, second force-exits.
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    let got_first_signal = Arc::new(AtomicBool::new(false));
    let got_first_clone = Arc::clone(&got_first_signal);

    tokio::spawn(async move {
        loop {
            tokio::signal::ctrl_c().await.ok();
            if got_first_clone.swap(true, Ordering::SeqCst) {
                eprintln!("\nForce exit.");
                std::process::exit(130);
            }
            eprintln!("\nShutting down gracefully (Ctrl+C again to force)...");
            cancel_clone.cancel();
        }
    });

    run_worker(worker, cancel).await?;

    println!("potluck worker stopped.");
    Ok(())
}
