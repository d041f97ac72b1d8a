pub mod error;
pub mod events;
pub mod id;

pub use error::{CoreError, Result};
pub use events::{DomainEvent, EventType};
pub use id::{Address, ChainId, TxHash};
