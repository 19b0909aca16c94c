pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod state;
pub mod websocket;

pub use error::*;
pub use models::*;
pub use services::*;
pub use state::QueueState;
pub use router::create_queue_router;
