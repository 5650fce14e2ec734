//! Job execution engine: scheduler, runner, executor and the periodic
//! monitor/timeout tasks.

pub mod batch;
pub mod dictionaries;
pub mod executor;
pub mod monitor;
pub mod recovery;
pub mod runner;
pub mod scheduler;
pub mod ticker;
pub mod worker;

pub use batch::{BatchCoordinator, CrackOutcome};
pub use executor::{AttackExecutor, AttemptObserver, AttemptReport, AttemptRequest, ExecutorError};
pub use monitor::{map_session_status, SessionMonitor, SessionProbe, SessionSnapshot, TranscriptProbe};
pub use recovery::{has_timed_out, CleanupReport, RecoveryManager};
pub use runner::JobRunner;
pub use scheduler::Scheduler;
pub use ticker::Ticker;
pub use worker::{Worker, WorkerHandle};
