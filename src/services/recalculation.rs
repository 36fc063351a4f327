//! Debounced, single-flight recalculation.
//!
//! The controller is a small actor: edits, retries and shutdown arrive on
//! an mpsc channel, state is published on a watch channel.
//!
//! ```text
//! Idle -> Pending (edit, timer armed) -> InFlight -> Applied | Stale | Failed
//! ```
//!
//! An edit while Pending re-arms the timer. An edit while InFlight marks the
//! running request stale; its result is dropped when it lands and a fresh
//! request goes out once the debounce window since that edit has passed.
//! A failure is never retried on its own, only an edit or an explicit retry
//! starts another cycle.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::{RecalcOutcome, RecalcStatus, RecalcTrigger};

/// Something that can run a full recalculation.
#[async_trait]
pub trait Recalculator: Send + Sync + 'static {
    async fn recalculate(&self, trigger: RecalcTrigger) -> DomainResult<RecalcOutcome>;
}

/// Published controller state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecalcState {
    Idle,
    /// Edit seen, waiting out the debounce window
    Pending { trigger: RecalcTrigger },
    /// Request running
    InFlight { trigger: RecalcTrigger, request: u64 },
    /// Last request published a plan
    Applied { plan_version: u64, degraded: bool },
    /// The running request was superseded by a newer edit
    Stale { request: u64 },
    /// Last request failed; the previous plan is still displayed
    Failed { error: String, retryable: bool },
}

#[derive(Debug)]
enum Command {
    Edit(RecalcTrigger),
    Retry,
    Shutdown,
}

pub struct RecalculationController {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<RecalcState>,
    worker: JoinHandle<()>,
}

impl RecalculationController {
    /// Start the controller on the current runtime.
    pub fn spawn<R: Recalculator>(recalculator: Arc<R>, debounce: Duration) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(RecalcState::Idle);
        let worker = tokio::spawn(run_loop(recalculator, debounce, receiver, state_tx));
        Self {
            commands,
            state,
            worker,
        }
    }

    /// Report an edit. Returns false once the controller has stopped.
    pub fn notify_edit(&self, trigger: RecalcTrigger) -> bool {
        self.commands.send(Command::Edit(trigger)).is_ok()
    }

    /// Re-run right away, typically after a failure.
    pub fn retry(&self) -> bool {
        self.commands.send(Command::Retry).is_ok()
    }

    pub fn state(&self) -> RecalcState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RecalcState> {
        self.state.clone()
    }

    /// Stop the controller. A request still running is detached.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Err(err) = self.worker.await {
            warn!(error = %err, "Recalculation controller ended abnormally");
        }
    }
}

async fn run_loop<R: Recalculator>(
    recalculator: Arc<R>,
    debounce: Duration,
    mut commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<RecalcState>,
) {
    let mut armed: Option<(RecalcTrigger, Instant)> = None;
    let mut in_flight: Option<(u64, JoinHandle<DomainResult<RecalcOutcome>>)> = None;
    let mut superseded = false;
    let mut requests: u64 = 0;

    loop {
        let deadline = armed.map(|(_, at)| at);

        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Edit(trigger)) => {
                    armed = Some((trigger, Instant::now() + debounce));
                    match &in_flight {
                        Some((request, _)) => {
                            superseded = true;
                            debug!(request, "Edit during recalculation, marking stale");
                            state.send_replace(RecalcState::Stale { request: *request });
                        }
                        None => {
                            state.send_replace(RecalcState::Pending { trigger });
                        }
                    }
                }
                Some(Command::Retry) => {
                    if in_flight.is_none() {
                        armed = Some((RecalcTrigger::Retry, Instant::now()));
                        state.send_replace(RecalcState::Pending { trigger: RecalcTrigger::Retry });
                    }
                }
                Some(Command::Shutdown) | None => break,
            },

            () = wait_until(deadline), if in_flight.is_none() && deadline.is_some() => {
                if let Some((trigger, _)) = armed.take() {
                    requests += 1;
                    let request = requests;
                    let worker = Arc::clone(&recalculator);
                    debug!(request, trigger = trigger.as_str(), "Recalculation issued");
                    state.send_replace(RecalcState::InFlight { trigger, request });
                    in_flight = Some((
                        request,
                        tokio::spawn(async move { worker.recalculate(trigger).await }),
                    ));
                }
            }

            joined = wait_for(&mut in_flight), if in_flight.is_some() => {
                let request = in_flight.take().map_or(0, |(request, _)| request);
                if std::mem::take(&mut superseded) {
                    debug!(request, "Stale recalculation result discarded");
                    if let Some((trigger, _)) = armed {
                        state.send_replace(RecalcState::Pending { trigger });
                    }
                    continue;
                }

                let next = match joined {
                    Ok(Ok(outcome)) => match outcome.status {
                        RecalcStatus::Applied => {
                            info!(request, plan_version = outcome.plan_version, "Recalculation applied");
                            RecalcState::Applied {
                                plan_version: outcome.plan_version,
                                degraded: outcome.degraded,
                            }
                        }
                        RecalcStatus::Stale => {
                            debug!(request, "Recalculator reported stale inputs");
                            RecalcState::Stale { request }
                        }
                    },
                    Ok(Err(err)) => {
                        warn!(request, error = %err, "Recalculation failed, keeping last plan");
                        RecalcState::Failed {
                            retryable: err.is_retryable(),
                            error: err.to_string(),
                        }
                    }
                    Err(join_err) => {
                        warn!(request, error = %join_err, "Recalculation task aborted");
                        RecalcState::Failed {
                            error: join_err.to_string(),
                            retryable: true,
                        }
                    }
                };
                state.send_replace(next);
            }
        }
    }

    debug!("Recalculation controller stopped");
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn wait_for(
    in_flight: &mut Option<(u64, JoinHandle<DomainResult<RecalcOutcome>>)>,
) -> Result<DomainResult<RecalcOutcome>, tokio::task::JoinError> {
    match in_flight {
        Some((_, handle)) => handle.await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::DomainError;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    struct CountingRecalculator {
        calls: AtomicU64,
        latency: Duration,
        fail: AtomicBool,
    }

    impl CountingRecalculator {
        fn new(latency: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU64::new(0),
                latency,
                fail: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl Recalculator for CountingRecalculator {
        async fn recalculate(&self, _trigger: RecalcTrigger) -> DomainResult<RecalcOutcome> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.latency).await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(DomainError::PersistenceUnavailable("store down".to_string()));
            }
            Ok(RecalcOutcome {
                plan_version: call,
                status: RecalcStatus::Applied,
                degraded: false,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_resets_debounce_timer() {
        let recalc = CountingRecalculator::new(Duration::ZERO);
        let controller = RecalculationController::spawn(recalc.clone(), Duration::from_millis(300));

        controller.notify_edit(RecalcTrigger::TaskEdited);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(matches!(controller.state(), RecalcState::Pending { .. }));
        controller.notify_edit(RecalcTrigger::TaskEdited);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(recalc.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(recalc.calls.load(Ordering::SeqCst), 1);
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_waits_for_explicit_retry() {
        let recalc = CountingRecalculator::new(Duration::from_millis(10));
        recalc.fail.store(true, Ordering::SeqCst);
        let controller = RecalculationController::spawn(recalc.clone(), Duration::from_millis(300));
        let mut states = controller.subscribe();

        controller.notify_edit(RecalcTrigger::OutcomeEdited);
        let failed = states
            .wait_for(|s| matches!(s, RecalcState::Failed { .. }))
            .await
            .unwrap()
            .clone();
        assert_eq!(
            failed,
            RecalcState::Failed {
                error: "Persistence unavailable: store down".to_string(),
                retryable: true
            }
        );

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(recalc.calls.load(Ordering::SeqCst), 1);

        recalc.fail.store(false, Ordering::SeqCst);
        controller.retry();
        states
            .wait_for(|s| matches!(s, RecalcState::Applied { .. }))
            .await
            .unwrap();
        assert_eq!(recalc.calls.load(Ordering::SeqCst), 2);
        controller.shutdown().await;
    }
}
