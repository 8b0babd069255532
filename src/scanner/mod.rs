//! Scan engine: probes every target on a fixed cadence and publishes reports

pub mod headers;
pub mod probe;

use crate::error::Result;
use crate::http::HttpClient;
use crate::models::{generate_scan_id, iso_timestamp, ProbeResult, Report, ScanConfig};
use crate::store::ReportStore;
use chrono::Utc;
use probe::{probe_failure, HttpProber, Prober};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tracing::{error, info, warn};

/// Where the scan loop is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Idle,
    Scanning,
    Persisting,
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanPhase::Idle => write!(f, "idle"),
            ScanPhase::Scanning => write!(f, "scanning"),
            ScanPhase::Persisting => write!(f, "persisting"),
        }
    }
}

/// Runs probes concurrently and turns their results into reports
pub struct ScanEngine {
    prober: Arc<dyn Prober>,
    concurrency: usize,
    phase: watch::Sender<ScanPhase>,
}

impl ScanEngine {
    /// Creates an engine around any prober; `concurrency` caps probes in flight
    pub fn new(prober: Arc<dyn Prober>, concurrency: usize) -> Self {
        let (phase, _) = watch::channel(ScanPhase::Idle);
        Self {
            prober,
            concurrency: concurrency.max(1),
            phase,
        }
    }

    /// Creates an engine probing over HTTP as configured
    pub fn from_config(config: &ScanConfig) -> Result<Self> {
        let client = HttpClient::from_config(config)?;
        Ok(Self::new(
            Arc::new(HttpProber::new(client)),
            config.concurrency,
        ))
    }

    /// Current phase
    pub fn phase(&self) -> ScanPhase {
        *self.phase.borrow()
    }

    /// Receiver that sees every phase change
    pub fn watch_phase(&self) -> watch::Receiver<ScanPhase> {
        self.phase.subscribe()
    }

    /// Probes every target once and builds the report.
    ///
    /// Results come back in target order, one per target, whatever happens
    /// to individual probes.
    pub async fn run_once(&self, targets: &[String]) -> Report {
        self.set_phase(ScanPhase::Scanning);
        let started_at = Utc::now();
        let started = Instant::now();
        let scan_id = generate_scan_id(started_at);

        info!("Scan {scan_id}: probing {} targets", targets.len());

        let limiter = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();

        for (index, url) in targets.iter().enumerate() {
            let prober = Arc::clone(&self.prober);
            let limiter = Arc::clone(&limiter);
            let url = url.clone();

            set.spawn(async move {
                // The semaphore is never closed, so acquire cannot fail
                let _permit = limiter.acquire_owned().await.ok();
                (index, prober.probe(&url).await)
            });
        }

        let mut slots: Vec<Option<ProbeResult>> = vec![None; targets.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => error!("Probe task panicked: {e}"),
            }
        }

        let results: Vec<ProbeResult> = slots
            .into_iter()
            .zip(targets)
            .map(|(slot, url)| slot.unwrap_or_else(|| probe_failure(url, "probe task failed")))
            .collect();

        let duration = started.elapsed().as_secs_f64();
        Report {
            scan_id,
            timestamp: iso_timestamp(Utc::now()),
            duration_seconds: (duration * 100.0).round() / 100.0,
            total_targets: targets.len(),
            results,
        }
    }

    /// Scans once and publishes the report
    pub async fn scan_and_publish(&self, targets: &[String], store: &ReportStore) -> Result<Report> {
        let report = self.run_once(targets).await;
        log_summary(&report);

        self.set_phase(ScanPhase::Persisting);
        let published = store.publish(&report);
        self.set_phase(ScanPhase::Idle);

        published.map(|()| report)
    }

    /// Runs the scan cycle forever.
    ///
    /// Each run starts `interval` after the previous run started; a run that
    /// overran starts the next one immediately. A failed publish is logged
    /// and the next run goes ahead. Only failing to prepare the report
    /// location ends the loop.
    pub async fn run_forever(
        &self,
        targets: &[String],
        interval: Duration,
        store: &ReportStore,
    ) -> Result<()> {
        if let Err(e) = store.prepare() {
            error!("Cannot prepare report location: {e}");
            return Err(e);
        }

        info!(
            "Scanning {} targets every {}s",
            targets.len(),
            interval.as_secs()
        );

        loop {
            let run_started = Instant::now();
            if let Err(e) = self.scan_and_publish(targets, store).await {
                warn!("Report not published: {e}");
            }

            let next_run = run_started + interval;
            let now = Instant::now();
            if now >= next_run {
                warn!(
                    "Scan took {:.1}s, longer than the {}s interval; starting next run now",
                    (now - run_started).as_secs_f64(),
                    interval.as_secs()
                );
            } else {
                info!("Next scan in {:.1}s", (next_run - now).as_secs_f64());
            }
            sleep_until(next_run).await;
        }
    }

    fn set_phase(&self, phase: ScanPhase) {
        self.phase.send_replace(phase);
    }
}

fn log_summary(report: &Report) {
    let summary = report.summary();
    info!(
        "Scan {} complete in {:.2}s: {} high, {} medium, {} info, {} errors",
        report.scan_id,
        report.duration_seconds,
        summary.high,
        summary.medium,
        summary.info,
        summary.error
    );
}
