mod fingerprint;
mod keypool;
pub mod providers;
mod service;
mod templates;

pub use fingerprint::fingerprint;
pub use keypool::KeyPool;
pub use providers::{RawHit, SearchError, SearchProvider};
pub use service::{NewsService, NewsServiceConfig};
pub use templates::{queries_for, Dimension, MAX_SEARCH_DIMENSIONS};
