pub mod check;
pub mod common;
pub mod dict;
pub mod jobs;
pub mod worker;
