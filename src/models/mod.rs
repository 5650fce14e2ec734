pub mod dictionary;
pub mod item;
pub mod job;
pub mod result;

pub use dictionary::{AttemptStatus, Dictionary, JobDictionary};
pub use item::{ItemStatus, JobItem};
pub use job::{Job, JobStatus, TransitionError};
pub use result::{CrackResult, Credential};
