pub mod braille;
pub mod scene;

pub use scene::*;
