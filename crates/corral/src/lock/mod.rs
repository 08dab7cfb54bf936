mod registry;
mod resource;
mod set;
#[cfg(test)]
mod tests;

pub use registry::*;
pub use resource::*;
pub use set::*;
