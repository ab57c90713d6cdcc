//! Turning shader definitions into buffer graphs.

mod local;
mod remote;

pub use local::load_local;
pub use remote::load_remote;
