mod admission;
mod config;
mod handle;
mod manager;
mod queue;
mod stats;
mod worker;

pub use admission::*;
pub use config::*;
pub use handle::TaskHandle;
pub use manager::WorkerPool;
pub use queue::*;
pub use stats::*;
