//! Padding, tiling and reassembly for fixed-size patch inference.

pub mod grid;
pub mod padding;

pub use grid::TileGrid;
pub use padding::{pad_image, remove_padding, PaddingSpec};
