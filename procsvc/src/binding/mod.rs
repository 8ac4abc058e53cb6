pub mod error;
pub mod interp;
pub mod value;

pub use error::*;
pub use interp::*;
pub use value::{Args, HandleArg, Value};
