pub mod advancement;
pub mod allocator;
pub mod lifecycle;
pub mod notifications;
pub mod partition;
pub mod redis_store;
pub mod store;

pub use advancement::*;
pub use allocator::*;
pub use lifecycle::*;
pub use notifications::*;
pub use partition::*;
pub use redis_store::*;
pub use store::*;
