pub mod storage;

pub use storage::{move_file, Area, Storage};
