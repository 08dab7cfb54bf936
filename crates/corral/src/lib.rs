#![doc = include_str!("../README.md")]

mod error;
mod lock;
mod pool;

pub use crate::error::*;
pub use crate::lock::*;
pub use crate::pool::*;
