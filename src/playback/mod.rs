pub mod dispatcher;
pub mod progress;
pub mod worker;

pub use dispatcher::SlideStrategy;
pub use progress::{ProgressMonitor, ProgressOutcome};
pub use worker::{DeviceWorker, SlideOutcome, WorkerExit};
