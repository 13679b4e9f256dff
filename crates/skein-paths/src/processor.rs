//! Worker-thread front end.
//!
//! The processor owns the graph set behind an `RwLock` and a team of worker
//! threads drawing search states from a shared [`StatePool`]. Callers claim
//! a pooled path,
//! configure it, and queue it; a worker runs the search under a read lock
//! and invokes the path's callback on the worker thread. Graph mutations go
//! in as queued work items and are applied under the write lock at pause
//! points, between paths, never while a search is mid-flight. Area
//! recomputation piggybacks on every work application, so searches always
//! see consistent connectivity data.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex, RwLock, RwLockReadGuard};
use skein_core::{GraphSet, Int3};

use crate::path::{Path, PathError, PathPool};
use crate::search;
use crate::state::StatePool;

/// How chatty the processor is about finished paths.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LogMode {
    None,
    #[default]
    ErrorsOnly,
    /// Every completion, at debug level.
    Full,
}

#[derive(Copy, Clone, Debug)]
pub struct ProcessorConfig {
    pub threads: usize,
    pub log_mode: LogMode,
    /// Expansions per search slice; cancellation is observed between
    /// slices.
    pub time_slice: u32,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            log_mode: LogMode::default(),
            time_slice: search::CHECKPOINT_INTERVAL,
        }
    }
}

type WorkItem = Box<dyn FnOnce(&mut GraphSet) + Send>;

struct Shared {
    queue: Mutex<VecDeque<Box<Path>>>,
    available: Condvar,
    graphs: RwLock<GraphSet>,
    work_items: Mutex<Vec<WorkItem>>,
    pool: PathPool,
    states: StatePool,
    /// Paths queued or in flight; guarded for the idle condvar.
    pending: Mutex<usize>,
    idle: Condvar,
    shutdown: AtomicBool,
    poisoned: AtomicBool,
    log_mode: LogMode,
    time_slice: u32,
}

impl Shared {
    fn finish(&self, mut path: Box<Path>) {
        match self.log_mode {
            LogMode::None => {}
            LogMode::ErrorsOnly => {
                if let Some(err) = path.error() {
                    warn!("path {} failed: {err}", path.seq);
                }
            }
            LogMode::Full => debug!(
                "path {} -> {:?}, cost {}, {} expansions",
                path.seq,
                path.state(),
                path.cost(),
                path.expansions()
            ),
        }
        if let Some(cb) = path.callback.take() {
            cb(&mut path);
        }
        self.pool.reclaim(path);

        let mut pending = self.pending.lock();
        *pending -= 1;
        if *pending == 0 {
            self.idle.notify_all();
        }
    }
}

/// The pathfinding service: graph owner, path queue and worker team.
pub struct Processor {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl Processor {
    pub fn new(graphs: GraphSet, config: ProcessorConfig) -> Self {
        let threads = config.threads.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            graphs: RwLock::new(graphs),
            work_items: Mutex::new(Vec::new()),
            pool: PathPool::new(),
            states: StatePool::new(),
            pending: Mutex::new(0),
            idle: Condvar::new(),
            shutdown: AtomicBool::new(false),
            poisoned: AtomicBool::new(false),
            log_mode: config.log_mode,
            time_slice: config.time_slice.max(1),
        });
        let workers = (0..threads)
            .map(|i| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("skein-worker-{i}"))
                    .spawn(move || worker(shared))
                    .expect("spawn worker thread")
            })
            .collect();
        info!("processor started with {threads} worker(s)");
        Self { shared, workers }
    }

    /// Claim a pooled path for the given request points. Configure it, then
    /// hand it to [`queue_path`](Self::queue_path).
    pub fn claim_path(&self, start: Int3, end: Int3) -> Box<Path> {
        self.shared.pool.claim(start, end)
    }

    /// [`claim_path`](Self::claim_path) with the completion callback
    /// attached.
    pub fn claim_path_with(
        &self,
        start: Int3,
        end: Int3,
        callback: impl FnOnce(&mut Path) + Send + 'static,
    ) -> Box<Path> {
        self.shared.pool.claim_with(start, end, callback)
    }

    /// Queue a path for processing. Its callback fires exactly once, on the
    /// finishing thread, after which the path returns to the pool; do not
    /// keep references to it past the callback.
    pub fn queue_path(&self, mut path: Box<Path>) {
        if self.shared.poisoned.load(Ordering::Relaxed) {
            warn!("path {} rejected: processor is poisoned", path.seq);
            path.complete_err(PathError::Cancelled);
            if let Some(cb) = path.callback.take() {
                cb(&mut path);
            }
            self.shared.pool.reclaim(path);
            return;
        }
        *self.shared.pending.lock() += 1;
        self.shared.queue.lock().push_back(path);
        self.shared.available.notify_one();
    }

    /// Queue a graph mutation. Items accumulate until
    /// [`apply_pending_work`](Self::apply_pending_work) runs them.
    pub fn queue_work_item(&self, f: impl FnOnce(&mut GraphSet) + Send + 'static) {
        self.shared.work_items.lock().push(Box::new(f));
    }

    /// Apply all queued work items under the write lock, then recompute
    /// connectivity areas. Blocks until in-flight searches reach a pause
    /// point and release their read locks.
    pub fn apply_pending_work(&self) {
        let items: Vec<WorkItem> = std::mem::take(&mut *self.shared.work_items.lock());
        if items.is_empty() {
            return;
        }
        let mut graphs = self.shared.graphs.write();
        for item in items {
            item(&mut graphs);
        }
        graphs.recompute_areas();
    }

    /// Read access to the graph set. Holding the guard delays work
    /// application, so keep it short.
    pub fn graphs(&self) -> RwLockReadGuard<'_, GraphSet> {
        self.shared.graphs.read()
    }

    /// Whether a fatal search error has wedged the processor. Queued paths
    /// after poisoning come back errored without searching.
    pub fn is_poisoned(&self) -> bool {
        self.shared.poisoned.load(Ordering::Relaxed)
    }

    /// Block until every queued path has finished.
    pub fn wait_idle(&self) {
        let mut pending = self.shared.pending.lock();
        while *pending > 0 {
            self.shared.idle.wait(&mut pending);
        }
    }
}

impl Drop for Processor {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.available.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        // Fail whatever was still queued so callbacks always fire.
        let drained: Vec<Box<Path>> = self.shared.queue.lock().drain(..).collect();
        for mut path in drained {
            path.complete_err(PathError::Cancelled);
            self.shared.finish(path);
        }
    }
}

fn worker(shared: Arc<Shared>) {
    loop {
        let mut path = {
            let mut queue = shared.queue.lock();
            loop {
                if shared.shutdown.load(Ordering::Acquire) {
                    return;
                }
                if let Some(path) = queue.pop_front() {
                    break path;
                }
                shared.available.wait(&mut queue);
            }
        };

        if shared.poisoned.load(Ordering::Relaxed) {
            path.complete_err(PathError::Cancelled);
        } else {
            let mut state = shared.states.claim();
            let graphs = shared.graphs.read();
            if search::prepare(&graphs, &mut path) {
                search::initialize(&graphs, &mut state, &mut path);
                while search::step(&graphs, &mut state, &mut path, shared.time_slice)
                    == search::StepResult::InProgress
                {}
            }
            drop(graphs);
            drop(state);
            if path.error() == Some(&PathError::ProbableInfiniteLoop) {
                // A search that hits the expansion cap indicates corrupt
                // graph data; results from this set can no longer be
                // trusted, so stop serving it.
                shared.poisoned.store(true, Ordering::Relaxed);
                error!(
                    "path {} hit the expansion cap; poisoning the processor",
                    path.seq
                );
            }
        }
        shared.finish(path);
    }
}
