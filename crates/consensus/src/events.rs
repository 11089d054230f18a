//! Protocol event records
//!
//! Every protocol step is reported to an `EventSink` as an append-only record.
//! Sinks are for observation only and never influence ordering or execution.

use crate::clock::{Clock, ReplicaId};
use crate::types::Request;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::Path,
    sync::Arc,
};

/// Protocol step being recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Replica is serving
    Live,
    /// Attempt to resolve a peer
    PeerConnect,
    PeerConnected,
    /// Startup accounts created, ready for clients
    Init,
    ClientRequest,
    ProposeSent,
    ProposeAcked,
    ProposeReceived,
    Execute,
    /// Final balance of one account (halt audit)
    Balance,
    /// Sum of final balances (halt audit)
    Total,
    /// Request still queued at halt
    QueueEntry,
    Report,
    Exit,
}

/// One record handed to a sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub at: DateTime<Utc>,
    pub replica: ReplicaId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock: Option<Clock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default)]
    pub params: String,
}

impl Event {
    pub fn new(kind: EventKind, replica: ReplicaId) -> Self {
        Self {
            kind,
            at: Utc::now(),
            replica,
            clock: None,
            origin: None,
            params: String::new(),
        }
    }

    /// Event describing a request: its clock, origin, kind and parameters
    pub fn for_request(kind: EventKind, replica: ReplicaId, request: &Request) -> Self {
        Self {
            clock: request.clock(),
            origin: Some(request.origin().to_string()),
            params: format!("{} | {}", request.op().name(), request.op()),
            ..Self::new(kind, replica)
        }
    }

    pub fn with_params(mut self, params: impl Into<String>) -> Self {
        self.params = params.into();
        self
    }
}

/// Receiver of protocol events
pub trait EventSink: Send + Sync {
    fn record(&self, event: Event);
}

/// Emits events as structured tracing records
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: Event) {
        let clock = event.clock.map(|c| c.to_string()).unwrap_or_default();
        let origin = event.origin.as_deref().unwrap_or("");
        match event.kind {
            EventKind::ProposeSent
            | EventKind::ProposeAcked
            | EventKind::ProposeReceived
            | EventKind::PeerConnect => tracing::debug!(
                replica = event.replica,
                kind = ?event.kind,
                clock = %clock,
                origin,
                "{}",
                event.params
            ),
            _ => tracing::info!(
                replica = event.replica,
                kind = ?event.kind,
                clock = %clock,
                origin,
                "{}",
                event.params
            ),
        }
    }
}

/// Appends events to a file, one JSON object per line
pub struct JsonLinesSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl EventSink for JsonLinesSink {
    fn record(&self, event: Event) {
        let mut writer = self.writer.lock();
        let written = serde_json::to_writer(&mut *writer, &event)
            .map_err(std::io::Error::from)
            .and_then(|_| {
                writer.write_all(b"\n")?;
                writer.flush()
            });
        if let Err(e) = written {
            tracing::warn!("Failed to write event log: {}", e);
        }
    }
}

/// Keeps events in memory, for inspection in tests
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Recorded events of one kind, in arrival order
    pub fn of_kind(&self, kind: EventKind) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: Event) {
        self.events.lock().push(event);
    }
}

/// Fans each event out to several sinks
#[derive(Default, Clone)]
pub struct Sinks {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl Sinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for Sinks {
    fn record(&self, event: Event) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.record(event.clone());
            }
            last.record(event);
        }
    }
}
