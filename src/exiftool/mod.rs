pub mod bridge;
pub mod report;
pub mod runner;

pub use bridge::{ExifToolBridge, ExifToolOutput, ExifToolRequest, Operation};
pub use report::{OutputFormat, TagMap};
pub use runner::{CommandError, CommandOutput, CommandRunner, CommandSpec, StdCommandRunner};
