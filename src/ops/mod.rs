pub mod runner;
pub mod shell;
pub mod ssh;
