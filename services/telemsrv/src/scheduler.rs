//! Cycle execution and scheduling
//!
//! A cycle is acquire → build payload → upload, run either by the periodic
//! scheduler or by a manual trigger from the API. Both paths go through
//! [`CycleService`], whose `try_lock` guard is the sole serialization
//! mechanism: a trigger that finds a cycle in flight is skipped, never
//! queued. Failed uploads are logged and discarded; the next cycle's fresh
//! data is the only retry.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use gridlink_meter::error::Result as MeterResult;
use gridlink_meter::RegisterDescriptor;

use crate::acquisition::AcquisitionEngine;
use crate::clock::DeviceClock;
use crate::connectivity::ConnectivityManager;
use crate::error::{AgentError, Result};
use crate::telemetry::build_payload;
use crate::uploader::Uploader;

/// Observability record of the last completed cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleOutcome {
    pub finished_at: String,
    pub success_count: usize,
    pub total_count: usize,
    pub uploaded: bool,
    pub detail: String,
}

/// How a cycle trigger resolved
#[derive(Debug)]
pub enum CycleAttempt {
    /// The cycle ran to completion (upload success or failure included)
    Completed(CycleOutcome),
    /// Another cycle held the guard; this trigger was dropped
    Busy,
    /// The link was not connected; this trigger was dropped
    Offline,
}

/// Runs one full acquisition-plus-upload cycle
pub struct CycleRunner {
    engine: AcquisitionEngine,
    uploader: Box<dyn Uploader>,
    clock: DeviceClock,
}

impl CycleRunner {
    pub fn new(engine: AcquisitionEngine, uploader: Box<dyn Uploader>, clock: DeviceClock) -> Self {
        Self {
            engine,
            uploader,
            clock,
        }
    }

    /// Acquire, serialize, upload; never fails, always yields an outcome
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let set = self.engine.acquire().await;
        let payload = build_payload(&set);

        let (uploaded, detail) = match self.uploader.upload(&payload).await {
            Ok(200) => {
                info!(
                    "Telemetry uploaded ({}/{} registers)",
                    set.success_count(),
                    set.total_count()
                );
                (true, "HTTP 200".to_string())
            }
            Ok(status) => {
                warn!("Collector rejected upload with HTTP {status}, payload discarded");
                (false, format!("HTTP {status}"))
            }
            Err(e) => {
                warn!("Upload failed: {e}, payload discarded");
                (false, e.to_string())
            }
        };

        CycleOutcome {
            finished_at: self.clock.now_formatted(),
            success_count: set.success_count(),
            total_count: set.total_count(),
            uploaded,
            detail,
        }
    }

    pub async fn spot_check(&mut self, address: u16) -> Result<(&'static RegisterDescriptor, f64)> {
        self.engine.spot_check(address).await
    }

    pub async fn dump(&mut self) -> Vec<(&'static RegisterDescriptor, MeterResult<f64>)> {
        self.engine.dump().await
    }
}

/// Shared cycle entry point with the in-flight guard
///
/// The runner mutex is only ever taken with `try_lock`; nothing waits on
/// it. The diagnostics endpoints contend on the same guard because they
/// need the same serial line, and report busy rather than block.
pub struct CycleService {
    runner: Mutex<CycleRunner>,
    connectivity: Arc<RwLock<ConnectivityManager>>,
    last_outcome: RwLock<Option<CycleOutcome>>,
}

impl CycleService {
    pub fn new(runner: CycleRunner, connectivity: Arc<RwLock<ConnectivityManager>>) -> Self {
        Self {
            runner: Mutex::new(runner),
            connectivity,
            last_outcome: RwLock::new(None),
        }
    }

    /// Run one cycle unless one is already in flight or the link is down
    pub async fn try_run_cycle(&self) -> CycleAttempt {
        let Ok(mut runner) = self.runner.try_lock() else {
            return CycleAttempt::Busy;
        };
        if !self.connectivity.write().await.ensure_connected().await {
            return CycleAttempt::Offline;
        }

        let outcome = runner.run_cycle().await;
        *self.last_outcome.write().await = Some(outcome.clone());
        CycleAttempt::Completed(outcome)
    }

    pub async fn last_outcome(&self) -> Option<CycleOutcome> {
        self.last_outcome.read().await.clone()
    }

    /// Single-register diagnostics read; busy while a cycle holds the bus
    pub async fn spot_check(&self, address: u16) -> Result<(&'static RegisterDescriptor, f64)> {
        let Ok(mut runner) = self.runner.try_lock() else {
            return Err(AgentError::busy("a cycle holds the meter bus"));
        };
        runner.spot_check(address).await
    }

    /// Full-catalog diagnostics dump; busy while a cycle holds the bus
    pub async fn dump_registers(
        &self,
    ) -> Result<Vec<(&'static RegisterDescriptor, MeterResult<f64>)>> {
        let Ok(mut runner) = self.runner.try_lock() else {
            return Err(AgentError::busy("a cycle holds the meter bus"));
        };
        Ok(runner.dump().await)
    }
}

/// Periodic cycle driver
///
/// Ticks at a fixed interval between cycle starts. A tick that lands while
/// a cycle is still running (or while the link is down) is dropped; missed
/// ticks are never replayed.
pub struct UploadScheduler {
    service: Arc<CycleService>,
    interval: Duration,
}

impl UploadScheduler {
    pub fn new(service: Arc<CycleService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "Upload scheduler started, cycle every {}s",
            self.interval.as_secs()
        );

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Upload scheduler stopping");
                    return;
                }
                _ = ticker.tick() => match self.service.try_run_cycle().await {
                    CycleAttempt::Completed(_) => {}
                    CycleAttempt::Busy => warn!("Previous cycle still in flight, tick skipped"),
                    CycleAttempt::Offline => info!("Link not connected, cycle skipped"),
                },
            }
        }
    }
}
