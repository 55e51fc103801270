pub mod clock;
pub mod observer;
pub mod pump;
pub mod task_runner;
