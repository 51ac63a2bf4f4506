mod pool;

pub use pool::create_pool;
#[cfg(test)]
pub use pool::lazy_pool;
#[cfg(test)]
pub mod fixtures;
