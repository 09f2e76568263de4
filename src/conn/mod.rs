pub mod actor;
pub mod writer;

pub use actor::*;
pub use writer::*;
