//! Destination worker
//!
//! Records delivered by the host land in a [`RecordQueue`] through a
//! [`Destination`], which only accepts the bindings it is configured for.
//! A single [`Worker`] drains the queue in FIFO order and runs each record
//! through the whole pipeline (render, collect images, post with retries)
//! before taking the next one.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Local, TimeZone, Timelike};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Result, WxTootError};
use crate::format::FormatEngine;
use crate::message::MessageBuilder;
use crate::poster::{PostOutcome, Poster};
use crate::types::{Binding, Record, STATION};
use crate::units::{StandardUnits, UnitLookup, UnitSystem};

#[derive(Debug, Default)]
struct QueueState {
    records: VecDeque<Record>,
    closed: bool,
    dropped: u64,
}

/// FIFO hand-off between the host's event callbacks and the worker
///
/// Pushing never blocks. When `max_backlog` is set and exceeded, the oldest
/// queued record is dropped. Meant for a single consumer.
#[derive(Debug)]
pub struct RecordQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    max_backlog: Option<usize>,
}

impl RecordQueue {
    pub fn new(max_backlog: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            max_backlog,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a record; returns false once the queue is closed.
    pub fn push(&self, record: Record) -> bool {
        {
            let mut state = self.lock();
            if state.closed {
                return false;
            }
            state.records.push_back(record);
            if let Some(max) = self.max_backlog {
                while state.records.len() > max.max(1) {
                    state.records.pop_front();
                    state.dropped += 1;
                    warn!("backlog exceeds {}, dropped oldest record", max);
                }
            }
        }
        self.notify.notify_one();
        true
    }

    /// Stop accepting records; queued ones are still handed out.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Next record, waiting for one if needed. `None` once closed and drained.
    pub async fn pop(&self) -> Option<Record> {
        loop {
            {
                let mut state = self.lock();
                if let Some(record) = state.records.pop_front() {
                    return Some(record);
                }
                if state.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records discarded because of `max_backlog`
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}

/// Producer side: the host's loop and archive callbacks
#[derive(Debug, Clone)]
pub struct Destination {
    bindings: Vec<Binding>,
    queue: Arc<RecordQueue>,
}

impl Destination {
    pub fn new(bindings: Vec<Binding>, queue: Arc<RecordQueue>) -> Self {
        Self { bindings, queue }
    }

    pub fn accepts(&self, binding: Binding) -> bool {
        self.bindings.contains(&binding)
    }

    pub fn handle_new_loop(&self, packet: &Record) -> bool {
        self.handle(Binding::Loop, packet)
    }

    pub fn handle_new_archive(&self, record: &Record) -> bool {
        self.handle(Binding::Archive, record)
    }

    /// Enqueue a tagged copy of `record` when `binding` is selected
    pub fn handle(&self, binding: Binding, record: &Record) -> bool {
        if !self.accepts(binding) {
            return false;
        }
        let mut copy = record.clone();
        copy.insert("binding", binding.to_string());
        self.queue.push(copy)
    }

    pub fn queue(&self) -> &Arc<RecordQueue> {
        &self.queue
    }
}

/// What the worker did with one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Posted {
        /// The rendered status text
        message: String,
        outcome: PostOutcome,
    },
    /// Older than the `stale` limit
    Stale,
    /// Within `post_interval` of the previous post
    TooSoon,
}

/// Counters kept by a worker over its lifetime
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    pub posted: u64,
    pub skipped_upload: u64,
    pub stale: u64,
    pub too_soon: u64,
    pub failed: u64,
}

/// Consumer side: renders and posts queued records one at a time
pub struct Worker {
    queue: Arc<RecordQueue>,
    builder: MessageBuilder,
    poster: Poster,
    station: String,
    units: Arc<dyn UnitLookup>,
    unit_system: Option<UnitSystem>,
    post_interval: Duration,
    stale: Option<Duration>,
    last_post: Option<i64>,
    report: WorkerReport,
}

impl Worker {
    pub fn new(
        queue: Arc<RecordQueue>,
        builder: MessageBuilder,
        poster: Poster,
        station: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            builder,
            poster,
            station: station.into(),
            units: Arc::new(StandardUnits),
            unit_system: None,
            post_interval: Duration::ZERO,
            stale: None,
            last_post: None,
            report: WorkerReport::default(),
        }
    }

    /// Build a worker and its message builder from configuration
    pub fn from_config(config: &Config, queue: Arc<RecordQueue>, poster: Poster) -> Result<Self> {
        let options = config.format.render_options(&config.station);
        let builder = MessageBuilder::new(config.format.message_source()?, FormatEngine::new(options));
        Ok(Self::new(queue, builder, poster, config.station.name.clone())
            .with_unit_system(config.station.unit_system)
            .with_post_interval(config.posting.post_interval())
            .with_stale(config.posting.stale()))
    }

    pub fn with_units(mut self, units: Arc<dyn UnitLookup>) -> Self {
        self.units = units;
        self
    }

    pub fn with_unit_system(mut self, unit_system: Option<UnitSystem>) -> Self {
        self.unit_system = unit_system;
        self
    }

    pub fn with_post_interval(mut self, post_interval: Duration) -> Self {
        self.post_interval = post_interval;
        self
    }

    pub fn with_stale(mut self, stale: Option<Duration>) -> Self {
        self.stale = stale;
        self
    }

    pub fn report(&self) -> WorkerReport {
        self.report
    }

    /// Run one record through the pipeline.
    ///
    /// `now` is the current Unix time; it drives the `stale` check and picks
    /// the summary hour.
    ///
    /// # Errors
    ///
    /// Returns `WxTootError::InvalidInput` for a record without `dateTime`,
    /// and the poster's error when posting fails.
    pub async fn process_record(&mut self, record: Record, now: i64) -> Result<RecordOutcome> {
        let time_ts = record
            .date_time()
            .ok_or_else(|| WxTootError::InvalidInput("record has no dateTime".to_string()))?;

        if let Some(stale) = self.stale {
            let age = now - time_ts;
            if age > stale.as_secs() as i64 {
                info!("record {} is stale ({}s old), skipping", time_ts, age);
                self.report.stale += 1;
                return Ok(RecordOutcome::Stale);
            }
        }
        if let Some(last) = self.last_post {
            let how_long = time_ts - last;
            if how_long < self.post_interval.as_secs() as i64 {
                debug!(
                    "wait interval ({}s) has not passed for record {}",
                    self.post_interval.as_secs(),
                    time_ts
                );
                self.report.too_soon += 1;
                return Ok(RecordOutcome::TooSoon);
            }
        }
        self.last_post = Some(time_ts);

        let mut record = match self.unit_system {
            Some(target) => self.units.convert(&record, target),
            None => record,
        };
        record.insert(STATION, self.station.as_str());

        let message = self.builder.build(&record, local_hour(now));
        debug!("format msg: {}", message);

        match self.poster.post(&message).await {
            Ok(outcome) => {
                match outcome {
                    PostOutcome::Posted { .. } => self.report.posted += 1,
                    PostOutcome::Skipped => self.report.skipped_upload += 1,
                }
                Ok(RecordOutcome::Posted { message, outcome })
            }
            Err(e) => {
                self.report.failed += 1;
                Err(e)
            }
        }
    }

    /// Drain the queue until it is closed and empty.
    ///
    /// Failures are logged and the worker moves on to the next record.
    pub async fn run(mut self) -> WorkerReport {
        info!(
            "{} worker started for station {}",
            self.poster.platform_name(),
            self.station
        );
        while let Some(record) = self.queue.pop().await {
            let now = chrono::Utc::now().timestamp();
            if let Err(e) = self.process_record(record, now).await {
                error!("{} post failed: {}", self.poster.platform_name(), e);
            }
        }
        info!("worker stopped: {:?}", self.report);
        self.report
    }
}

fn local_hour(now: i64) -> u32 {
    Local
        .timestamp_opt(now, 0)
        .single()
        .map(|t| t.hour())
        .unwrap_or(0)
}
