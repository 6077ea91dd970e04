//! Reading heightmaps from images.

pub mod heightmap;
pub mod tiff;

pub use crate::formats::{heightmap::Heightmap, tiff::TiffLoader};
