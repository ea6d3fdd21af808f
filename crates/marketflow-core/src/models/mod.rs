pub mod agent;
pub mod approval;
pub mod message;

pub use agent::*;
pub use approval::*;
pub use message::*;
