pub mod driver;
pub mod player;
pub mod surface;
