//! Rate limiting logic and counter storage.

mod backend;
mod identifier;
mod limiter;
pub mod memory;
pub mod redis_store;

pub use backend::CounterStore;
pub use identifier::{Identifier, LimitClass};
pub use limiter::{Admission, Limiter, LimiterSettings};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
