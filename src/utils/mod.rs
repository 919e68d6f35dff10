//! Helper utilities, functions, and macros.

#[macro_use]
mod print;

#[macro_use]
mod config;

mod error;
mod movavg;

pub use error::GnsError;
pub use movavg::MovingAverage;
pub use print::{logger_init, ME};
