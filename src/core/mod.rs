pub mod error;
pub mod result;

pub use error::{ConfigError, ExecutionError, StrategyResult};
pub use result::ExecutionResult;
