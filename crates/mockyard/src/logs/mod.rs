//! Per-project traffic log.
//!
//! Each project owns a bounded FIFO of [`ServerLog`] entries. Appending past
//! capacity evicts the oldest entry. Every append is also published as a
//! `SERVERS_CONSOLE` event.

mod types;

pub use types::{
    capture_body, LogType, LoggedRequest, LoggedResponse, MatchedRoute, ProxyRoundTrip,
    ServerLog, MAX_LOGGED_BODY,
};

use crate::events::{EngineEvent, EventBus};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

pub const DEFAULT_LOG_CAPACITY: usize = 200;

/// Bounded circular log store for one project.
pub struct LogRingBuffer {
    capacity: usize,
    entries: Mutex<VecDeque<ServerLog>>,
}

impl LogRingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, log: ServerLog) {
        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(log);
    }

    /// Copy of the entries, oldest first.
    pub fn snapshot(&self) -> Vec<ServerLog> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Log buffers keyed by project name.
pub struct LogRegistry {
    capacity: usize,
    buffers: RwLock<HashMap<String, Arc<LogRingBuffer>>>,
    events: EventBus,
}

impl LogRegistry {
    pub fn new(capacity: usize, events: EventBus) -> Self {
        Self {
            capacity,
            buffers: RwLock::new(HashMap::new()),
            events,
        }
    }

    fn buffer(&self, project: &str) -> Arc<LogRingBuffer> {
        if let Some(buffer) = self.buffers.read().get(project) {
            return Arc::clone(buffer);
        }
        let mut buffers = self.buffers.write();
        Arc::clone(
            buffers
                .entry(project.to_string())
                .or_insert_with(|| Arc::new(LogRingBuffer::new(self.capacity))),
        )
    }

    pub fn append(&self, log: ServerLog) {
        let project = log.project.clone();
        self.buffer(&project).push(log.clone());
        self.events.publish(EngineEvent::ServersConsole { project, log });
    }

    pub fn get(&self, project: &str) -> Vec<ServerLog> {
        self.buffers
            .read()
            .get(project)
            .map(|b| b.snapshot())
            .unwrap_or_default()
    }

    pub fn clear(&self, project: &str) {
        if let Some(buffer) = self.buffers.read().get(project) {
            buffer.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn log(project: &str, n: usize) -> ServerLog {
        ServerLog {
            id: format!("log-{n}"),
            timestamp: Utc::now(),
            project: project.to_string(),
            server: "api".to_string(),
            log_type: LogType::Mock,
            matched: None,
            preset: None,
            request: LoggedRequest {
                method: "GET".to_string(),
                path: format!("/n/{n}"),
                query: String::new(),
                headers: Vec::new(),
                body: None,
                body_truncated: false,
            },
            response: LoggedResponse {
                status: 200,
                headers: Vec::new(),
                body: None,
                body_truncated: false,
            },
            proxy: None,
            error: None,
            duration_ms: 0,
        }
    }

    #[test]
    fn test_ring_evicts_oldest_first() {
        let ring = LogRingBuffer::new(DEFAULT_LOG_CAPACITY);
        for n in 1..=201 {
            ring.push(log("demo", n));
        }

        let entries = ring.snapshot();
        assert_eq!(entries.len(), 200);
        assert_eq!(entries.first().unwrap().id, "log-2");
        assert_eq!(entries.last().unwrap().id, "log-201");
    }

    #[test]
    fn test_projects_do_not_share_buffers() {
        let registry = LogRegistry::new(3, EventBus::new());
        registry.append(log("a", 1));
        registry.append(log("b", 2));
        registry.append(log("a", 3));

        assert_eq!(registry.get("a").len(), 2);
        assert_eq!(registry.get("b").len(), 1);

        registry.clear("a");
        assert!(registry.get("a").is_empty());
        assert_eq!(registry.get("b").len(), 1);
        assert!(registry.get("unknown").is_empty());
    }

    #[tokio::test]
    async fn test_append_publishes_console_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let registry = LogRegistry::new(10, bus);
        registry.append(log("demo", 7));

        match rx.recv().await.unwrap() {
            EngineEvent::ServersConsole { project, log } => {
                assert_eq!(project, "demo");
                assert_eq!(log.id, "log-7");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_capture_body_truncates() {
        let big = vec![b'a'; MAX_LOGGED_BODY + 10];
        let (body, truncated) = capture_body(&big);
        assert!(truncated);
        assert_eq!(body.unwrap().len(), MAX_LOGGED_BODY);

        assert_eq!(capture_body(b""), (None, false));
    }
}
