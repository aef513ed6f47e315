pub mod config;
pub mod family;
pub mod fetch;
pub mod normalize;
pub mod pipeline;
pub mod warehouse;
pub mod xlsx;

#[cfg(test)]
mod testing;
