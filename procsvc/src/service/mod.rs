pub mod control;
pub mod error;
pub mod manager;
pub mod registry;
pub mod rendezvous;
pub mod session;

pub use control::*;
pub use error::ServiceError;
pub use manager::*;
pub use registry::*;
pub use rendezvous::*;
pub use session::*;
