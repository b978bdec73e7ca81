use std::panic::{AssertUnwindSafe, catch_unwind};

use bevy::tasks::{AsyncComputeTaskPool, Task, TaskPool, block_on, futures_lite::future};
use tracing::{debug, warn};

use crate::{
    error::{IsosurfaceError, Result},
    extract::extract_isosurface,
    grid::ScalarGrid,
    mesh::IsoMesh,
    types::Value,
};

/// One extraction job: a grid, an isovalue, and the generation tag of the request.
///
/// Cloning the grid only bumps its [`Arc`](std::sync::Arc), so requests are cheap to build
/// on the main thread.
#[derive(Clone, Debug)]
pub struct ExtractionRequest {
    pub grid: ScalarGrid,
    pub isovalue: Value,
    pub generation: u64,
}

/// The single message a worker posts back for an [`ExtractionRequest`].
#[derive(Debug)]
pub struct ExtractionResponse {
    /// Generation of the request this answers.
    pub generation: u64,
    pub outcome: Result<IsoMesh>,
}

impl ExtractionResponse {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Runs one request to completion on the current thread.
///
/// Never panics: a panic inside the extraction is reported as
/// [`IsosurfaceError::TaskFailed`] so the receiving loop stays alive.
pub fn run_request(request: ExtractionRequest) -> ExtractionResponse {
    let ExtractionRequest {
        grid,
        isovalue,
        generation,
    } = request;
    run_guarded(generation, || extract_isosurface(&grid, isovalue))
}

fn run_guarded(generation: u64, job: impl FnOnce() -> Result<IsoMesh>) -> ExtractionResponse {
    let outcome = catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(IsosurfaceError::TaskFailed(reason))
    });

    if let Err(err) = &outcome {
        warn!(generation, "isosurface extraction failed: {err}");
    }

    ExtractionResponse {
        generation,
        outcome,
    }
}

/// Spawns `request` on Bevy's `AsyncComputeTaskPool` and returns the handle to its response.
///
/// The pool is created on first use when no `TaskPoolPlugin` has set it up.
pub fn spawn_extraction(request: ExtractionRequest) -> Task<ExtractionResponse> {
    AsyncComputeTaskPool::get_or_init(TaskPool::default).spawn(async move { run_request(request) })
}

/// Extraction handle for one logical surface (e.g. the positive lobe of an orbital).
///
/// Every [`submit`](SurfaceWorker::submit) starts a new generation. Earlier requests
/// are not cancelled; they run to completion and their responses are dropped by
/// [`poll`](SurfaceWorker::poll) because a newer generation has superseded them.
///
/// ```text
/// submit(τ=0.02)  → gen 1 ──────────────┐ (completes late, discarded)
/// submit(τ=0.03)  → gen 2 ───────┐      │
///                           poll → gen 2 delivered
/// ```
#[derive(Default)]
pub struct SurfaceWorker {
    generation: u64,
    in_flight: Vec<Task<ExtractionResponse>>,
}

impl SurfaceWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts extracting `grid` at `isovalue` and returns the request's generation.
    pub fn submit(&mut self, grid: ScalarGrid, isovalue: Value) -> u64 {
        self.generation += 1;
        let request = ExtractionRequest {
            grid,
            isovalue,
            generation: self.generation,
        };
        self.in_flight.push(spawn_extraction(request));
        self.generation
    }

    /// Generation of the most recent [`submit`](SurfaceWorker::submit), `0` before the first.
    pub fn current_generation(&self) -> u64 {
        self.generation
    }

    /// Number of requests that have not completed yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Collects finished tasks without blocking.
    ///
    /// Returns the response of the current generation once it has completed; completions
    /// of superseded generations are discarded.
    pub fn poll(&mut self) -> Option<ExtractionResponse> {
        let current = self.generation;
        let mut latest = None;

        self.in_flight
            .retain_mut(|task| match block_on(future::poll_once(task)) {
                Some(response) => {
                    accept(response, current, &mut latest);
                    false
                }
                None => true,
            });

        latest
    }

    /// Blocks until every in-flight request has completed, then returns the response of
    /// the current generation (if it was still pending).
    pub fn block_on_latest(&mut self) -> Option<ExtractionResponse> {
        let current = self.generation;
        let mut latest = None;

        for task in self.in_flight.drain(..) {
            accept(block_on(task), current, &mut latest);
        }

        latest
    }
}

fn accept(response: ExtractionResponse, current: u64, latest: &mut Option<ExtractionResponse>) {
    if response.generation == current {
        *latest = Some(response);
    } else {
        debug!(
            generation = response.generation,
            current, "discarding superseded isosurface"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::{
        grid::Bounds,
        types::{Point, Vector},
    };

    fn sphere(resolution: usize) -> ScalarGrid {
        let bounds = Bounds::centered(Point::origin(), Vector::new(2.0, 2.0, 2.0)).unwrap();
        ScalarGrid::from_fn(resolution, bounds, &|p: Point| p.coords.norm()).unwrap()
    }

    #[test]
    fn run_request_reports_success() {
        let response = run_request(ExtractionRequest {
            grid: sphere(10),
            isovalue: 0.5,
            generation: 7,
        });
        assert_eq!(response.generation, 7);
        assert!(response.is_success());
        assert!(response.outcome.unwrap().triangle_count() > 0);
    }

    #[test]
    fn run_request_reports_malformed_input() {
        let response = run_request(ExtractionRequest {
            grid: sphere(4),
            isovalue: Value::INFINITY,
            generation: 1,
        });
        assert!(!response.is_success());
        assert!(response.outcome.unwrap_err().to_string().contains("isovalue"));
    }

    #[test]
    fn panics_become_failure_responses() {
        let response = run_guarded(3, || panic!("out of buffers"));
        assert_eq!(response.generation, 3);
        match response.outcome {
            Err(IsosurfaceError::TaskFailed(reason)) => assert_eq!(reason, "out of buffers"),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn only_the_newest_generation_is_delivered() {
        let mut worker = SurfaceWorker::new();
        let grid = sphere(16);

        assert_eq!(worker.submit(grid.clone(), 0.3), 1);
        assert_eq!(worker.submit(grid.clone(), 0.6), 2);
        assert_eq!(worker.in_flight(), 2);

        let response = worker.block_on_latest().expect("current generation response");
        assert_eq!(response.generation, 2);
        assert_eq!(
            response.outcome.unwrap(),
            extract_isosurface(&grid, 0.6).unwrap()
        );
        assert!(worker.is_idle());
        assert!(worker.block_on_latest().is_none());
    }

    #[test]
    fn poll_eventually_delivers_without_blocking() {
        let mut worker = SurfaceWorker::new();
        let generation = worker.submit(sphere(12), 0.5);

        let deadline = Instant::now() + Duration::from_secs(30);
        let response = loop {
            if let Some(response) = worker.poll() {
                break response;
            }
            assert!(Instant::now() < deadline, "extraction never completed");
            std::thread::sleep(Duration::from_millis(1));
        };
        assert_eq!(response.generation, generation);
        assert!(response.is_success());
        assert!(worker.is_idle());
    }

    #[test]
    fn independent_workers_share_one_grid() {
        let grid = sphere(14);
        let mut positive = SurfaceWorker::new();
        let mut negative = SurfaceWorker::new();
        positive.submit(grid.clone(), 0.4);
        negative.submit(grid.clone(), 0.8);

        let a = positive.block_on_latest().unwrap().outcome.unwrap();
        let b = negative.block_on_latest().unwrap().outcome.unwrap();
        assert!(b.triangle_count() > a.triangle_count());
    }
}
