//! Batch scheduler: drains the worklist through the defrag utility.
//!
//! Each item is attempted once per pass. Failures go to the back of the
//! worklist and are retried on the next pass, so a stubborn file never blocks
//! the rest of the list. On weekdays the loop sleeps through business hours
//! before dispatching. The worklist is written back to disk exactly once when
//! the loop stops, whether it drained, was interrupted, or unwound.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{DefragError, Result};
use crate::invoker::{DefragOptions, ExecutionResult, Invoker};
use crate::schedule::{BusinessHours, Clock, LocalClock};
use crate::worklist::Worklist;

/// Runs one work item
pub trait Dispatch {
    fn dispatch(&self, path: &str) -> impl Future<Output = ExecutionResult>;
}

/// Plain defragmentation of each item with a fixed option set
#[derive(Debug, Clone)]
pub struct DefragDispatcher {
    invoker: Invoker,
    options: DefragOptions,
}

impl DefragDispatcher {
    pub fn new(invoker: Invoker, options: DefragOptions) -> Self {
        DefragDispatcher { invoker, options }
    }
}

impl<T: Dispatch + ?Sized> Dispatch for &T {
    fn dispatch(&self, path: &str) -> impl Future<Output = ExecutionResult> {
        (**self).dispatch(path)
    }
}

impl Dispatch for DefragDispatcher {
    async fn dispatch(&self, path: &str) -> ExecutionResult {
        self.invoker.defragment(Path::new(path), &self.options).await
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    SchedulingWait,
    Dispatching,
    Evaluating,
    /// Worklist is empty
    Drained,
    /// Stopped early; remaining items were persisted
    Aborted,
}

/// Which pass the loop is on and how much of it is left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassTracker {
    pub pass_number: u32,
    pub items_remaining_in_pass: usize,
}

impl PassTracker {
    fn new() -> Self {
        PassTracker {
            pass_number: 0,
            items_remaining_in_pass: 0,
        }
    }

    fn start_pass(&mut self, items: usize) {
        self.pass_number = self.pass_number.saturating_add(1);
        self.items_remaining_in_pass = items;
    }
}

/// Summary of one scheduler run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub state: BatchState,
    pub passes: u32,
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed_attempts: u64,
    /// Items given up on after reaching the retry bound
    pub dropped: Vec<String>,
    pub remaining: usize,
}

impl BatchReport {
    fn new() -> Self {
        BatchReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            state: BatchState::Idle,
            passes: 0,
            dispatched: 0,
            succeeded: 0,
            failed_attempts: 0,
            dropped: Vec::new(),
            remaining: 0,
        }
    }
}

/// Persists the worklist if dropped while a run is in progress
struct WorklistGuard {
    worklist: Worklist,
    armed: bool,
}

impl WorklistGuard {
    fn arm(&mut self) {
        self.armed = true;
    }

    /// Single persist attempt for this run
    fn flush(&mut self) -> Result<()> {
        self.armed = false;
        self.worklist.persist()
    }
}

impl Deref for WorklistGuard {
    type Target = Worklist;

    fn deref(&self) -> &Worklist {
        &self.worklist
    }
}

impl DerefMut for WorklistGuard {
    fn deref_mut(&mut self) -> &mut Worklist {
        &mut self.worklist
    }
}

impl Drop for WorklistGuard {
    fn drop(&mut self) {
        if self.armed {
            log::warn!("batch stopped unexpectedly, persisting {} items", self.worklist.len());
            if let Err(e) = self.worklist.persist() {
                log::error!("failed to persist worklist: {}", e);
            }
        }
    }
}

pub struct BatchScheduler<D, C = LocalClock> {
    worklist: WorklistGuard,
    dispatcher: D,
    clock: C,
    hours: BusinessHours,
    max_attempts: Option<u32>,
    state: BatchState,
    pass: PassTracker,
    report: BatchReport,
}

impl<D: Dispatch> BatchScheduler<D, LocalClock> {
    pub fn new(worklist: Worklist, dispatcher: D, config: &Config) -> Self {
        BatchScheduler {
            worklist: WorklistGuard {
                worklist,
                armed: false,
            },
            dispatcher,
            clock: LocalClock,
            hours: BusinessHours::from_config(&config.schedule),
            max_attempts: config.retry.max_attempts,
            state: BatchState::Idle,
            pass: PassTracker::new(),
            report: BatchReport::new(),
        }
    }
}

impl<D: Dispatch, C: Clock> BatchScheduler<D, C> {
    pub fn with_clock<C2: Clock>(self, clock: C2) -> BatchScheduler<D, C2> {
        BatchScheduler {
            worklist: self.worklist,
            dispatcher: self.dispatcher,
            clock,
            hours: self.hours,
            max_attempts: self.max_attempts,
            state: self.state,
            pass: self.pass,
            report: self.report,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn pass(&self) -> PassTracker {
        self.pass
    }

    pub fn worklist(&self) -> &Worklist {
        &self.worklist
    }

    /// Run until the worklist drains
    pub async fn run(&mut self) -> Result<BatchReport> {
        self.run_until(std::future::pending()).await
    }

    /// Run until the worklist drains or `shutdown` resolves.
    ///
    /// The worklist is persisted before returning in every case. A shutdown
    /// never abandons an item mid-dispatch: the in-flight item stays at the
    /// front of the persisted list.
    pub async fn run_until(&mut self, shutdown: impl Future<Output = ()>) -> Result<BatchReport> {
        self.worklist.arm();
        log::info!(
            "batch {} starting with {} items from {}",
            self.report.run_id,
            self.worklist.len(),
            self.worklist.path().display()
        );

        let outcome = tokio::select! {
            biased;
            () = shutdown => Err(DefragError::Interrupted),
            () = self.drive() => Ok(()),
        };

        if let Err(e) = &outcome {
            log::error!("batch {} aborted: {}", self.report.run_id, e);
        }

        let persisted = self.worklist.flush();
        if let Err(e) = &persisted {
            log::error!("batch {} could not persist worklist: {}", self.report.run_id, e);
        }

        self.state = match (&outcome, &persisted) {
            (Ok(()), Ok(())) => BatchState::Drained,
            _ => BatchState::Aborted,
        };

        self.report.state = self.state;
        self.report.remaining = self.worklist.len();
        self.report.finished_at = Some(Utc::now());
        log::info!(
            "batch {} {:?}: {} dispatched, {} succeeded, {} remaining after {} passes",
            self.report.run_id,
            self.state,
            self.report.dispatched,
            self.report.succeeded,
            self.report.remaining,
            self.report.passes
        );

        outcome.and(persisted).map(|()| self.report.clone())
    }

    async fn drive(&mut self) {
        loop {
            self.state = BatchState::Idle;
            if self.worklist.is_empty() {
                return;
            }

            if self.pass.items_remaining_in_pass == 0 {
                if self.pass.pass_number > 0 {
                    log::info!("reprocessing failed files: {} items", self.worklist.len());
                }
                self.pass.start_pass(self.worklist.len());
                self.report.passes = self.pass.pass_number;
                log::debug!("pass {} over {} items", self.pass.pass_number, self.pass.items_remaining_in_pass);
            }

            self.state = BatchState::SchedulingWait;
            if let Some(wait) = self.hours.sleep_for(self.clock.now()) {
                log::info!("inside business hours, sleeping {}s", wait.as_secs());
                tokio::time::sleep(wait).await;
            }

            self.state = BatchState::Dispatching;
            let Some(item) = self.worklist.front().map(str::to_string) else {
                return;
            };
            self.report.dispatched += 1;
            self.pass.items_remaining_in_pass -= 1;
            let result = self.dispatcher.dispatch(&item).await;

            self.state = BatchState::Evaluating;
            self.worklist.pop_front();
            self.evaluate(item, result);
        }
    }

    fn evaluate(&mut self, item: String, result: ExecutionResult) {
        let Some(err) = result.error else {
            self.report.succeeded += 1;
            log::info!("defragmented {}", item);
            return;
        };

        self.report.failed_attempts += 1;
        let attempts = self.pass.pass_number;
        if self.max_attempts.is_some_and(|max| attempts >= max) {
            log::warn!("dropping {} after {} attempts: {}", item, attempts, err);
            self.report.dropped.push(item);
        } else {
            log::warn!("requeueing {}: {}", item, err);
            self.worklist.push_back(item);
        }
    }
}
