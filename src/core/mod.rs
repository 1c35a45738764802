pub mod collab;
pub mod config;
pub mod error;
pub mod flow;
pub mod schedule;

pub use config::{ConfigLoader, HomeflowConfig};
pub use error::{ConfigError, FlowError, GraphError, ParameterError, ScheduleError, TaskError};
pub use flow::{
    FlowBuilder, FlowGraph, FlowRunner, Input, RunResult, RunStatus, RunnerConfig, TaskSpec,
    TaskState,
};
pub use schedule::{CronSchedule, Scheduler};
