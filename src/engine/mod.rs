mod cache;
mod core;
mod messages;
mod worker;

pub use cache::{CacheStats, ResultCache};
pub use self::core::{QuantEngine, timed_out};
pub use messages::{CacheKey, NodeOutput};
