mod sqlite;

pub use sqlite::{BatchInserter, CrashDatabase};
