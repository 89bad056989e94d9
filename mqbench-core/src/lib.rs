mod config;
mod constants;
mod data;
mod session;
mod stats;

pub use config::*;
pub use constants::*;
pub use data::*;
pub use session::*;
pub use stats::*;
