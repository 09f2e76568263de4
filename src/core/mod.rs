pub mod backoff;
pub mod frame;
pub mod health;
pub mod ping;
pub mod ring;
pub mod scheduler;
pub mod types;

pub use backoff::*;
pub use frame::*;
pub use health::*;
pub use ping::*;
pub use ring::*;
pub use scheduler::*;
pub use types::*;
