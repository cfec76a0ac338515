pub mod cli;
pub mod config;
pub mod logging;
pub mod ops;
pub mod task;


pub use config::NodeshiftConfig;
pub use ops::runner::{RunReport, TaskRunner};
pub use ops::shell::{CommandOutcome, CommandResult, ExecMode, Shell};
pub use ops::ssh::{KeyStatus, SshManager};
pub use task::{RunTarget, SshTarget, Step, Task};
