//! Progress bar for batch runs, fed by the scheduler's progress channel.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use paperfetch_core::batch::ProgressSnapshot;
use tokio::sync::watch;

const BAR_TEMPLATE: &str = "{spinner} [{bar:30}] {pos}/{len} DOIs {msg}";

/// Spawns the progress bar when requested.
///
/// The task ends once the run stops publishing (the sender is dropped).
pub(crate) fn spawn_progress_ui(
    use_bar: bool,
    progress: watch::Receiver<ProgressSnapshot>,
) -> Option<tokio::task::JoinHandle<()>> {
    use_bar.then(|| tokio::spawn(drive_bar(progress)))
}

async fn drive_bar(mut progress: watch::Receiver<ProgressSnapshot>) {
    let initial = *progress.borrow();
    let bar = ProgressBar::new(initial.total as u64);
    bar.set_style(
        ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(100));
    apply(&bar, initial);

    while progress.changed().await.is_ok() {
        let snapshot = *progress.borrow_and_update();
        apply(&bar, snapshot);
    }
    bar.finish_and_clear();
}

fn apply(bar: &ProgressBar, snapshot: ProgressSnapshot) {
    bar.set_position(snapshot.completed as u64);
    bar.set_message(progress_message(snapshot));
}

fn progress_message(snapshot: ProgressSnapshot) -> String {
    if snapshot.in_flight == 0 {
        String::new()
    } else {
        format!("({} in flight)", snapshot.in_flight)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_message() {
        let snapshot = ProgressSnapshot {
            completed: 1,
            total: 4,
            in_flight: 3,
        };
        assert_eq!(progress_message(snapshot), "(3 in flight)");
        assert_eq!(progress_message(ProgressSnapshot::default()), "");
    }

    #[tokio::test]
    async fn test_spawn_progress_ui_disabled_returns_none() {
        let (_tx, rx) = watch::channel(ProgressSnapshot::default());
        assert!(spawn_progress_ui(false, rx).is_none());
    }

    #[tokio::test]
    async fn test_progress_task_ends_when_sender_dropped() {
        let (tx, rx) = watch::channel(ProgressSnapshot {
            completed: 0,
            total: 2,
            in_flight: 0,
        });
        let handle = spawn_progress_ui(true, rx).unwrap();
        tx.send_replace(ProgressSnapshot {
            completed: 2,
            total: 2,
            in_flight: 0,
        });
        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
