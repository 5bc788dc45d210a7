mod builtin_tools;
mod executor;
mod registry;
mod strategy;

pub use builtin_tools::register_data_tools;
pub use executor::{AgentEvent, AgentExecutor, AgentOutcome};
pub use registry::{Tool, ToolRegistry};
pub use strategy::{compose_instructions, load_strategies, select, StrategyFile};
