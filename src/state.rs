//! Module for tracking the lifecycle of a crawl.
//!
//! A crawl moves through `Idle → Running → Draining → Closed`. The current
//! state and the shared stop flag live in `CrawlerState`, which the engine
//! owns and hands out to callers as a cloneable [`CrawlerHandle`]. Setting
//! the stop flag does not cancel in-flight work: the engine notices it on
//! its next loop iteration and drains.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    Idle = 0,
    Running = 1,
    Draining = 2,
    Closed = 3,
}

impl EngineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => EngineState::Running,
            2 => EngineState::Draining,
            3 => EngineState::Closed,
            _ => EngineState::Idle,
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Idle => "idle",
            EngineState::Running => "running",
            EngineState::Draining => "draining",
            EngineState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Shared lifecycle state of the crawler.
#[derive(Debug)]
pub struct CrawlerState {
    state: AtomicU8,
    stop: AtomicBool,
}

impl Default for CrawlerState {
    fn default() -> Self {
        CrawlerState {
            state: AtomicU8::new(EngineState::Idle as u8),
            stop: AtomicBool::new(false),
        }
    }
}

impl CrawlerState {
    /// Creates a new, atomically reference-counted `CrawlerState`.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set(&self, state: EngineState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// A cloneable handle to observe and stop a running crawl.
#[derive(Debug, Clone)]
pub struct CrawlerHandle {
    state: Arc<CrawlerState>,
}

impl CrawlerHandle {
    pub(crate) fn new(state: Arc<CrawlerState>) -> Self {
        CrawlerHandle { state }
    }

    /// Asks the engine to stop pulling new work and drain.
    pub fn stop(&self) {
        self.state.request_stop();
    }

    pub fn is_stopping(&self) -> bool {
        self.state.stop_requested()
    }

    pub fn state(&self) -> EngineState {
        self.state.get()
    }
}
