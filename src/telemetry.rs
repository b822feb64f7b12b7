use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::AppConfig;
use crate::errors::AppResult;

const BUFFER_FILE_NAME: &str = "telemetry-buffer.jsonl";

#[derive(Clone)]
pub struct TelemetryClient {
    enabled: Arc<AtomicBool>,
    queue: Arc<Mutex<Vec<TelemetryEvent>>>,
    counters: Arc<Mutex<HashMap<String, u64>>>,
    buffer_path: Option<PathBuf>,
    batch_size: usize,
}

impl TelemetryClient {
    pub fn new<P: AsRef<Path>>(data_dir: P, config: &AppConfig) -> AppResult<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)?;
        let buffer_path = data_dir.join(BUFFER_FILE_NAME);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&buffer_path)?;

        Ok(Self {
            buffer_path: Some(buffer_path),
            ..Self::build(config.telemetry_enabled_by_default, config.telemetry_batch_size)
        })
    }

    /// Counts and queues events without a file buffer; `flush` discards the queue.
    pub fn in_memory() -> Self {
        Self::build(true, usize::MAX)
    }

    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        match &config.telemetry_dir {
            Some(dir) => Self::new(dir, config),
            None => Ok(Self::build(
                config.telemetry_enabled_by_default,
                config.telemetry_batch_size,
            )),
        }
    }

    fn build(enabled: bool, batch_size: usize) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
            queue: Arc::new(Mutex::new(Vec::new())),
            counters: Arc::new(Mutex::new(HashMap::new())),
            buffer_path: None,
            batch_size: batch_size.max(1),
        }
    }

    pub fn record(&self, name: impl Into<String>, payload: serde_json::Value) -> AppResult<()> {
        if !self.enabled.load(Ordering::Relaxed) {
            return Ok(());
        }

        let name = name.into();
        *self.counters.lock().entry(name.clone()).or_insert(0) += 1;

        let mut queue = self.queue.lock();
        queue.push(TelemetryEvent::new(name, payload));
        if queue.len() >= self.batch_size {
            self.persist_locked(&mut queue)?;
        }
        Ok(())
    }

    pub fn flush(&self) -> AppResult<()> {
        let mut queue = self.queue.lock();
        self.persist_locked(&mut queue)
    }

    /// Number of events recorded under `name` since the client was created.
    pub fn count(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn buffer_path(&self) -> Option<&Path> {
        self.buffer_path.as_deref()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn persist_locked(&self, queue: &mut Vec<TelemetryEvent>) -> AppResult<()> {
        if queue.is_empty() {
            return Ok(());
        }

        if let Some(path) = &self.buffer_path {
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            for event in queue.iter() {
                let line = serde_json::to_vec(event)?;
                file.write_all(&line)?;
                file.write_all(b"\n")?;
            }
        }
        queue.clear();
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct TelemetryEvent {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl TelemetryEvent {
    fn new(name: String, payload: serde_json::Value) -> Self {
        Self {
            name,
            timestamp: Utc::now(),
            payload,
        }
    }
}
