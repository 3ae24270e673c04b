pub mod inference_scheduler;

pub use inference_scheduler::*;
