use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::types::SolveQuality;

/// Everything the engine reports while it works. Fire-and-forget; sinks
/// must not block the caller for long.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Started {
        pieces: usize,
        stock_length: f64,
    },
    /// A cached pattern set was found for this fingerprint.
    CacheHit {
        patterns: usize,
    },
    /// The cached set was suspiciously small and will be regenerated.
    CacheInadequate {
        patterns: usize,
    },
    GenerationStarted {
        max_solutions: usize,
    },
    /// Emitted once per batch of newly accepted patterns during Phase 1.
    PatternsFound {
        count: usize,
        latest_waste: f64,
    },
    /// The complexity filter dropped patterns mixing too many piece types.
    PatternsFiltered {
        before: usize,
        after: usize,
    },
    PhaseOneComplete {
        patterns: usize,
    },
    /// One-second heartbeat while the Phase 2 solver runs.
    Tick {
        elapsed_secs: u64,
        budget_secs: u64,
    },
    PhaseTwoComplete {
        quality: SolveQuality,
        total_bars: u64,
    },
    Failed {
        message: String,
    },
}

/// Injected progress capability. The engine never talks to a transport
/// directly; hosts decide where events go.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Discards everything.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Forwards events to the `tracing` subscriber. Used by the binaries.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Tick {
                elapsed_secs,
                budget_secs,
            } => tracing::info!(elapsed_secs, budget_secs, "solver running"),
            ProgressEvent::PatternsFound {
                count,
                latest_waste,
            } => tracing::info!(count, latest_waste, "patterns found"),
            other => tracing::info!(event = ?other, "optimizer progress"),
        }
    }
}

/// Buffers events in memory for later inspection.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl MemorySink {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().expect("memory sink poisoned").clone()
    }
}

impl ProgressSink for MemorySink {
    fn emit(&self, event: ProgressEvent) {
        self.events.lock().expect("memory sink poisoned").push(event);
    }
}

/// Background heartbeat for the Phase 2 solve: emits a `Tick` every second
/// until stopped or the budget elapses. Scoped resource: dropping it stops
/// and joins the thread, so no ticker outlives its allocation call.
pub struct SolveTicker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SolveTicker {
    pub fn start(sink: Arc<dyn ProgressSink>, budget: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("solve-ticker".into())
            .spawn(move || {
                let started = Instant::now();
                loop {
                    if flag.load(Ordering::Relaxed) {
                        return;
                    }
                    let elapsed = started.elapsed();
                    if elapsed > budget {
                        return;
                    }
                    sink.emit(ProgressEvent::Tick {
                        elapsed_secs: elapsed.as_secs(),
                        budget_secs: budget.as_secs(),
                    });
                    // Sleep one second in slices so drop never waits long.
                    for _ in 0..10 {
                        if flag.load(Ordering::Relaxed) {
                            return;
                        }
                        thread::sleep(Duration::from_millis(100));
                    }
                }
            })
            .expect("spawn solve-ticker");
        Self {
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for SolveTicker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
