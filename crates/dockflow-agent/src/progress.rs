//! Logs docking progress events while a dispatch runs.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use dockflow_molecules::docking::DockingProgress;

pub fn spawn_log(rx: broadcast::Receiver<DockingProgress>) -> JoinHandle<usize> {
    tokio::spawn(log_progress(rx))
}

/// Wait for the log task once every sender is gone. Returns the number of
/// events logged, or `None` when the task panicked or was cancelled.
pub async fn finish_log(handle: JoinHandle<usize>) -> Option<usize> {
    match handle.await {
        Ok(seen) => Some(seen),
        Err(e) => {
            warn!("Progress log task ended abnormally: {e}");
            None
        }
    }
}

async fn log_progress(mut rx: broadcast::Receiver<DockingProgress>) -> usize {
    let mut seen = 0;
    loop {
        match rx.recv().await {
            Ok(p) => {
                seen += 1;
                if p.success {
                    info!("[{}/{}] {} docked", p.completed, p.total, p.molecule);
                } else {
                    warn!(
                        "[{}/{}] {} failed: {}",
                        p.completed,
                        p.total,
                        p.molecule,
                        p.error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => warn!("Progress log skipped {} events", n),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn event(completed: usize, success: bool) -> DockingProgress {
        DockingProgress {
            job_id: Uuid::new_v4(),
            molecule: format!("lig_{completed}"),
            completed,
            total: 2,
            success,
            error: (!success).then(|| "timeout".to_string()),
            settled_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_log_ends_when_senders_drop() {
        let (tx, rx) = broadcast::channel(8);
        let handle = spawn_log(rx);
        tx.send(event(1, true)).unwrap();
        tx.send(event(2, false)).unwrap();
        drop(tx);
        assert_eq!(finish_log(handle).await, Some(2));
    }

    #[tokio::test]
    async fn test_panicked_log_task_is_reported() {
        let handle: JoinHandle<usize> = tokio::spawn(async { panic!("logger crashed") });
        assert_eq!(finish_log(handle).await, None);
    }
}
