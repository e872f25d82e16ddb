pub mod command;
pub mod frames;
pub mod info;
mod stream;
