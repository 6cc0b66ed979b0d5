pub mod processor;
pub mod runner;

pub use processor::{JobProcessor, ProcessJob};
pub use runner::JobRunner;
