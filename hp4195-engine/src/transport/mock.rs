use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use super::{Session, Transport};
use crate::error::TransportError;

/// One bus operation as seen by [`MockTransport`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Open(String),
    Write(String),
    Query(String),
    Close,
    Release,
}

#[derive(Default)]
struct MockState {
    calls: Vec<TransportCall>,
    queued: HashMap<String, VecDeque<Result<String, String>>>,
    fallback: HashMap<String, String>,
    open_failure: Option<String>,
    failing_writes: Vec<String>,
    query_delay: Duration,
}

/// Scripted transport that records every call in order.
///
/// Clones share the script and the call log, so a test can keep one handle
/// while the worker owns the other.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport answering like a healthy analyzer with a 3-point trace.
    pub fn hp4195a() -> Self {
        Self::new()
            .respond("ID?", "HP4195A\r\n")
            .respond("A?", "-10.5,-3.25,-12.0")
            .respond("B?", "12.5,0.0,-45.0")
            .respond("X?", "1000000,1005000,1010000")
    }

    /// Answer `query` with `response` whenever nothing is queued for it.
    pub fn respond(self, query: &str, response: &str) -> Self {
        self.lock()
            .fallback
            .insert(query.to_string(), response.to_string());
        self
    }

    /// Answer the next `query` with `response`, ahead of the fallback.
    pub fn respond_once(self, query: &str, response: &str) -> Self {
        self.enqueue(query, Ok(response.to_string()));
        self
    }

    /// Fail the next `query` with a bus I/O error.
    pub fn fail_query_once(self, query: &str, reason: &str) -> Self {
        self.enqueue(query, Err(reason.to_string()));
        self
    }

    pub fn fail_open(self, reason: &str) -> Self {
        self.lock().open_failure = Some(reason.to_string());
        self
    }

    /// Fail every write that starts with `prefix`.
    pub fn fail_writes_starting_with(self, prefix: &str) -> Self {
        self.lock().failing_writes.push(prefix.to_string());
        self
    }

    /// Block every query for `delay` before answering.
    pub fn with_query_delay(self, delay: Duration) -> Self {
        self.lock().query_delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.lock().calls.clone()
    }

    /// Only the written strings, in order.
    pub fn writes(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::Write(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn enqueue(&self, query: &str, response: Result<String, String>) {
        self.lock()
            .queued
            .entry(query.to_string())
            .or_default()
            .push_back(response);
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for MockTransport {
    type Session = MockSession;

    fn open(&mut self, resource: &str, timeout: Duration) -> Result<MockSession, TransportError> {
        let mut state = self.lock();
        state.calls.push(TransportCall::Open(resource.to_string()));
        if let Some(reason) = state.open_failure.clone() {
            return Err(TransportError::Open {
                resource: resource.to_string(),
                reason,
            });
        }
        Ok(MockSession {
            state: self.state.clone(),
            timeout,
        })
    }

    fn release(&mut self) {
        self.lock().calls.push(TransportCall::Release);
    }
}

pub struct MockSession {
    state: Arc<Mutex<MockState>>,
    timeout: Duration,
}

impl MockSession {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Session for MockSession {
    fn write(&mut self, text: &str) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.calls.push(TransportCall::Write(text.to_string()));
        if state
            .failing_writes
            .iter()
            .any(|prefix| text.starts_with(prefix.as_str()))
        {
            return Err(TransportError::Io(format!("write '{text}' rejected")));
        }
        Ok(())
    }

    fn query(&mut self, text: &str) -> Result<String, TransportError> {
        let delay = {
            let mut state = self.lock();
            state.calls.push(TransportCall::Query(text.to_string()));
            state.query_delay
        };
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let mut state = self.lock();
        let queued = state.queued.get_mut(text).and_then(VecDeque::pop_front);
        match queued {
            Some(Ok(response)) => Ok(response.trim_end().to_string()),
            Some(Err(reason)) => Err(TransportError::Io(reason)),
            None => match state.fallback.get(text) {
                Some(response) => Ok(response.trim_end().to_string()),
                None => Err(TransportError::Timeout(self.timeout)),
            },
        }
    }

    fn close(self) -> Result<(), TransportError> {
        self.lock().calls.push(TransportCall::Close);
        Ok(())
    }
}
