pub mod api;
pub mod config;
pub mod error;
pub mod poll;

pub use error::{PollError, Result};
