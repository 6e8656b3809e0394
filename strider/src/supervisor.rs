//! In-process worker supervision.
//!
//! Every long-running thread registers its join handle; the supervisor
//! periodically checks liveness and complains loudly when a worker dies
//! while the system is supposed to be running. The motion loop itself never
//! aborts by design, so a dead worker here means a real bug worth a log
//! line rather than a silent limp.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{error, info};

/// Registry of supervised worker threads.
#[derive(Default)]
pub struct Supervisor {
    workers: Vec<Worker>,
}

struct Worker {
    name: String,
    handle: JoinHandle<()>,
    reported: bool,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a worker thread.
    pub fn register(&mut self, name: &str, handle: JoinHandle<()>) {
        self.workers.push(Worker {
            name: name.to_string(),
            handle,
            reported: false,
        });
    }

    /// Names of workers that have exited, each reported once.
    pub fn newly_dead(&mut self) -> Vec<String> {
        let mut dead = Vec::new();
        for worker in &mut self.workers {
            if worker.handle.is_finished() && !worker.reported {
                worker.reported = true;
                dead.push(worker.name.clone());
            }
        }
        dead
    }

    /// Watch loop: check liveness once a second until shutdown.
    pub async fn watch(&mut self, running: Arc<AtomicBool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        while running.load(Ordering::Relaxed) {
            interval.tick().await;
            for name in self.newly_dead() {
                error!("worker '{name}' exited unexpectedly");
            }
        }
    }

    /// Join every worker. Called after `running` has been cleared.
    pub fn join_all(self) {
        for worker in self.workers {
            let name = worker.name;
            if worker.handle.join().is_err() {
                error!("worker '{name}' panicked");
            } else {
                info!("worker '{name}' stopped");
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_workers_are_reported_once() {
        let mut supervisor = Supervisor::new();
        supervisor.register("short-lived", std::thread::spawn(|| {}));

        // Give the thread time to finish.
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(supervisor.newly_dead(), vec!["short-lived".to_string()]);
        assert!(supervisor.newly_dead().is_empty());
        supervisor.join_all();
    }

    #[test]
    fn live_workers_are_not_reported() {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let mut supervisor = Supervisor::new();
        supervisor.register(
            "long-lived",
            std::thread::spawn(move || {
                while flag.load(Ordering::Relaxed) {
                    std::thread::sleep(Duration::from_millis(1));
                }
            }),
        );

        assert!(supervisor.newly_dead().is_empty());
        running.store(false, Ordering::Relaxed);
        supervisor.join_all();
    }
}
