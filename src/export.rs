pub mod loaded;
pub mod renderer;
