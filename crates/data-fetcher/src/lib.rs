mod breaker;
mod cache;
mod error;
mod pool;
mod source;
mod transport;
pub mod vendors;

pub use breaker::{BreakerState, CircuitBreaker};
pub use error::FetchError;
pub use pool::{FetcherPool, PoolConfig};
pub use source::{DataFetcher, SourceDescriptor};
pub use transport::RateLimiter;
