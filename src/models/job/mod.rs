mod methods;
mod transitions;
mod types;

pub use transitions::TransitionError;
pub use types::{Job, JobStatus};
