pub mod directory;
pub mod frames;
pub mod session;
