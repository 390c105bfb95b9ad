pub mod render;
pub mod theme;
