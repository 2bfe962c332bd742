//! High-frequency position reconciliation.
//!
//! A dedicated worker thread drains position updates, optionally smooths
//! and predicts, and issues native move/resize calls at an adaptive frame
//! rate. The producer side never blocks: the bounded queue drops its oldest
//! entry on overflow (counted as a missed update), and the worker always
//! acts on the newest sample — position is idempotent state, not an event
//! log, so stale samples are superseded rather than replayed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::OverlaySettings;
use crate::geometry::ScreenPosition;
use crate::platform::{WindowBackend, WindowId};

/// One sample in the sync pipeline.
#[derive(Debug, Clone, Copy)]
pub struct PositionUpdate {
    pub pos: ScreenPosition,
    pub timestamp: Instant,
}

/// Rolling counters, reset on engine start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub updates_per_second: f64,
    pub average_latency_ms: f64,
    pub missed_updates: u64,
    pub total_updates: u64,
}

/// Queue capacity before the oldest entry is dropped.
const QUEUE_CAPACITY: usize = 10;

/// Latency thresholds driving the adaptive frame rate.
const LATENCY_HIGH_MS: f64 = 50.0;
const LATENCY_LOW_MS: f64 = 20.0;
const FPS_STEP: u32 = 5;
/// Minimum spacing between frame-rate adjustments.
const FPS_ADJUST_INTERVAL: Duration = Duration::from_millis(500);

/// Weight of the existing average in the latency EMA (90/10).
const LATENCY_EMA_KEEP: f64 = 0.9;
/// Velocity EMA factor for prediction.
const VELOCITY_ALPHA: f64 = 0.3;

/// How long `stop` waits for the worker before detaching it.
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Runtime-tunable knobs, readable from the worker each tick.
#[derive(Debug, Clone, Copy)]
struct Tuning {
    smoothing: bool,
    smoothing_factor: f64,
    prediction: bool,
    tolerance_px: u32,
    min_fps: u32,
    max_fps: u32,
}

#[derive(Default)]
struct MetricsInner {
    average_latency_ms: f64,
    total_updates: u64,
    started_at: Option<Instant>,
}

struct Shared {
    queue: Mutex<VecDeque<PositionUpdate>>,
    missed: AtomicU64,
    running: AtomicBool,
    tuning: Mutex<Tuning>,
    metrics: Mutex<MetricsInner>,
}

/// Decide the next target frame rate from the measured latency.
///
/// High latency trades smoothness for responsiveness (fewer, cheaper
/// ticks); consistently low latency with no fresh drops earns the rate
/// back. The result never leaves `[min_fps, max_fps]`.
fn next_fps(current: u32, avg_latency_ms: f64, fresh_misses: u64, min_fps: u32, max_fps: u32) -> u32 {
    if avg_latency_ms > LATENCY_HIGH_MS {
        current.saturating_sub(FPS_STEP).max(min_fps)
    } else if avg_latency_ms < LATENCY_LOW_MS && fresh_misses == 0 {
        (current + FPS_STEP).min(max_fps)
    } else {
        current
    }
}

fn blend(prev: f64, new: f64, factor: f64) -> f64 {
    prev * factor + new * (1.0 - factor)
}

/// Continuous reconciliation of one external window against the latest
/// computed screen position.
pub struct PositionSyncEngine {
    backend: Arc<dyn WindowBackend>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl PositionSyncEngine {
    pub fn new(backend: Arc<dyn WindowBackend>, settings: &OverlaySettings) -> Self {
        let tuning = Tuning {
            smoothing: settings.smoothing,
            smoothing_factor: settings.smoothing_factor,
            prediction: settings.prediction,
            tolerance_px: settings.position_tolerance_px,
            min_fps: settings.min_fps,
            max_fps: settings.max_fps,
        };
        Self {
            backend,
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::with_capacity(QUEUE_CAPACITY)),
                missed: AtomicU64::new(0),
                running: AtomicBool::new(false),
                tuning: Mutex::new(tuning),
                metrics: Mutex::new(MetricsInner::default()),
            }),
            worker: None,
        }
    }

    /// Spawn the worker loop for `window`. Counters reset here.
    pub fn start(&mut self, window: WindowId) {
        if self.worker.is_some() {
            tracing::warn!("Sync engine already running; start ignored");
            return;
        }

        {
            let mut metrics = self.shared.metrics.lock().unwrap();
            *metrics = MetricsInner {
                started_at: Some(Instant::now()),
                ..MetricsInner::default()
            };
        }
        self.shared.missed.store(0, Ordering::SeqCst);
        self.shared.queue.lock().unwrap().clear();
        self.shared.running.store(true, Ordering::SeqCst);

        let backend = Arc::clone(&self.backend);
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("position-sync".into())
            .spawn(move || worker_loop(backend, shared, window))
            .expect("failed to spawn sync worker");

        self.worker = Some(handle);
        tracing::info!(%window, "Position sync started");
    }

    /// Signal the worker, join it (bounded), and drain the queue.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.worker.take() {
            let deadline = Instant::now() + JOIN_TIMEOUT;
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(5));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                // Detach rather than hang the caller; the loop exits on its
                // next tick since `running` is already false.
                tracing::warn!("Sync worker did not stop within {JOIN_TIMEOUT:?}; detaching");
            }
        }

        self.shared.queue.lock().unwrap().clear();
        tracing::info!("Position sync stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Non-blocking producer call. On a full queue the oldest sample is
    /// dropped and counted as missed.
    pub fn update_position(&self, pos: ScreenPosition) {
        let mut queue = self.shared.queue.lock().unwrap();
        if queue.len() >= QUEUE_CAPACITY {
            queue.pop_front();
            self.shared.missed.fetch_add(1, Ordering::SeqCst);
        }
        queue.push_back(PositionUpdate {
            pos,
            timestamp: Instant::now(),
        });
    }

    pub fn get_metrics(&self) -> PerformanceMetrics {
        let inner = self.shared.metrics.lock().unwrap();
        let elapsed = inner
            .started_at
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        PerformanceMetrics {
            updates_per_second: if elapsed > 0.0 {
                inner.total_updates as f64 / elapsed
            } else {
                0.0
            },
            average_latency_ms: inner.average_latency_ms,
            missed_updates: self.shared.missed.load(Ordering::SeqCst),
            total_updates: inner.total_updates,
        }
    }

    pub fn set_smoothing(&self, enabled: bool, factor: f64) {
        let mut tuning = self.shared.tuning.lock().unwrap();
        tuning.smoothing = enabled;
        tuning.smoothing_factor = factor.clamp(0.0, 0.95);
    }

    pub fn set_prediction(&self, enabled: bool) {
        self.shared.tuning.lock().unwrap().prediction = enabled;
    }
}

impl Drop for PositionSyncEngine {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
        }
    }
}

fn worker_loop(backend: Arc<dyn WindowBackend>, shared: Arc<Shared>, window: WindowId) {
    let mut target_fps = {
        let tuning = shared.tuning.lock().unwrap();
        tuning.max_fps.max(tuning.min_fps)
    };
    let mut last_applied: Option<ScreenPosition> = None;
    let mut last_sample: Option<PositionUpdate> = None;
    // smoothed velocity in px/s for (x, y, w, h)
    let mut velocity = [0.0f64; 4];
    let mut last_adjust = Instant::now();
    let mut misses_at_adjust = 0u64;

    while shared.running.load(Ordering::SeqCst) {
        let tick_start = Instant::now();
        let tuning = *shared.tuning.lock().unwrap();
        let frame_interval = Duration::from_secs_f64(1.0 / target_fps.max(1) as f64);

        // Newest sample wins; everything older is superseded.
        let newest = {
            let mut queue = shared.queue.lock().unwrap();
            let newest = queue.pop_back();
            queue.clear();
            newest
        };

        if let Some(update) = newest {
            let avg_latency_ms = shared.metrics.lock().unwrap().average_latency_ms;

            if tuning.prediction {
                if let Some(prev) = last_sample {
                    let dt = update
                        .timestamp
                        .duration_since(prev.timestamp)
                        .as_secs_f64();
                    if dt > 0.0 && prev.pos != update.pos {
                        let inst = [
                            (update.pos.x - prev.pos.x) as f64 / dt,
                            (update.pos.y - prev.pos.y) as f64 / dt,
                            (update.pos.width as f64 - prev.pos.width as f64) / dt,
                            (update.pos.height as f64 - prev.pos.height as f64) / dt,
                        ];
                        for i in 0..4 {
                            velocity[i] =
                                VELOCITY_ALPHA * inst[i] + (1.0 - VELOCITY_ALPHA) * velocity[i];
                        }
                    }
                }
            }
            last_sample = Some(update);

            let mut target = [
                update.pos.x as f64,
                update.pos.y as f64,
                update.pos.width as f64,
                update.pos.height as f64,
            ];

            if tuning.prediction {
                // Look ahead one frame plus the cost of the call itself, so
                // the window lands where the container will be, not where
                // it was when sampled.
                let horizon = frame_interval.as_secs_f64() + avg_latency_ms / 1000.0;
                for i in 0..4 {
                    target[i] += velocity[i] * horizon;
                }
            }

            if tuning.smoothing {
                if let Some(prev) = last_applied {
                    let prev = [
                        prev.x as f64,
                        prev.y as f64,
                        prev.width as f64,
                        prev.height as f64,
                    ];
                    for i in 0..4 {
                        target[i] = blend(prev[i], target[i], tuning.smoothing_factor);
                    }
                }
            }

            let candidate = ScreenPosition {
                x: target[0].round() as i32,
                y: target[1].round() as i32,
                width: target[2].round().max(1.0) as u32,
                height: target[3].round().max(1.0) as u32,
            };

            let within_tolerance = last_applied
                .map(|prev| prev.max_delta(&candidate) <= tuning.tolerance_px)
                .unwrap_or(false);

            if !within_tolerance {
                let call_start = Instant::now();
                match backend.move_resize(window, &candidate) {
                    Ok(()) => {
                        last_applied = Some(candidate);
                    }
                    Err(e) => {
                        // Transient WM hiccups must not kill the session;
                        // persistent failure shows up in the metrics.
                        tracing::debug!(%window, error = %e, "move_resize failed");
                        shared.missed.fetch_add(1, Ordering::SeqCst);
                    }
                }
                let latency_ms = call_start.elapsed().as_secs_f64() * 1000.0;

                let mut metrics = shared.metrics.lock().unwrap();
                metrics.total_updates += 1;
                metrics.average_latency_ms = if metrics.total_updates == 1 {
                    latency_ms
                } else {
                    metrics.average_latency_ms * LATENCY_EMA_KEEP
                        + latency_ms * (1.0 - LATENCY_EMA_KEEP)
                };
            }
        }

        if last_adjust.elapsed() >= FPS_ADJUST_INTERVAL {
            let avg = shared.metrics.lock().unwrap().average_latency_ms;
            let misses = shared.missed.load(Ordering::SeqCst);
            let fresh = misses - misses_at_adjust;
            let next = next_fps(target_fps, avg, fresh, tuning.min_fps, tuning.max_fps);
            if next != target_fps {
                tracing::debug!(from = target_fps, to = next, avg_latency_ms = avg, "Frame rate adjusted");
                target_fps = next;
            }
            misses_at_adjust = misses;
            last_adjust = Instant::now();
        }

        if let Some(remaining) = frame_interval.checked_sub(tick_start.elapsed()) {
            std::thread::sleep(remaining);
        }
    }
}
