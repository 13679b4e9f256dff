//! **skein-paths**: A* search, funnel post-processing and the worker-thread
//! processor for the skein pathfinding engine.
//!
//! The layering mirrors how a request flows:
//!
//! - [`Path`] carries a request from the caller to a worker and the result
//!   back, recycled through a [`PathPool`].
//! - [`search`] runs the A* pipeline against a `skein_core::GraphSet`,
//!   using a reusable [`SearchState`].
//! - [`funnel`] converts the node corridor into a tight point path.
//! - [`Processor`] ties it together: a queue, worker threads and the
//!   pause-point discipline for graph mutation.
//!
//! Searches can also run synchronously on the caller's thread via
//! [`search::search_blocking`] with a state from a [`StatePool`].

pub mod funnel;
pub mod search;

mod heuristic;
mod path;
mod processor;
mod state;

pub use heuristic::{Heuristic, Traversal};
pub use path::{CancelToken, Path, PathCallback, PathError, PathPool, PathState};
pub use processor::{LogMode, Processor, ProcessorConfig};
pub use search::{CHECKPOINT_INTERVAL, MAX_EXPANSIONS, StepResult};
pub use state::{SearchState, StateGuard, StatePool};
