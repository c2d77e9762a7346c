pub mod decoder;
pub mod editor;
pub mod utils;
