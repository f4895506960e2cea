pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Capabilities, Daemon, Health, Version, Volume};
