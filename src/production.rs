pub mod pipeline;
pub mod pool;
pub mod provider;
