pub mod cache;
pub mod decode;
pub mod fetch;
pub mod loader;
pub mod media;
pub mod url;
pub mod video;
pub mod wav;
