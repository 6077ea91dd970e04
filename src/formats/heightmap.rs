use crate::terrain_data::TerrainError;
use anyhow::{Context, Result};
use bevy::{prelude::*, render::render_resource::TextureFormat};
use image::ImageReader;
use std::path::Path;

/// A row-major grid of elevation samples, as read from a heightmap image.
///
/// Normalized image formats are mapped to `[0, 1]`, so the vertical scale of the terrain is
/// the height of a white pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct Heightmap {
    pub size_x: u32,
    pub size_z: u32,
    pub heights: Vec<f32>,
}

impl Heightmap {
    /// Converts the first channel of a Bevy image.
    pub fn from_image(image: &Image) -> Result<Self, TerrainError> {
        let format = image.texture_descriptor.format;
        let data = &image.data;

        let heights: Vec<f32> = match format {
            TextureFormat::R8Unorm => data.iter().map(|&value| value as f32 / 255.0).collect(),
            TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb => data
                .chunks_exact(4)
                .map(|pixel| pixel[0] as f32 / 255.0)
                .collect(),
            TextureFormat::R16Unorm => data
                .chunks_exact(2)
                .map(|bytes| u16::from_le_bytes([bytes[0], bytes[1]]) as f32 / u16::MAX as f32)
                .collect(),
            TextureFormat::R16Uint => data
                .chunks_exact(2)
                .map(|bytes| u16::from_le_bytes([bytes[0], bytes[1]]) as f32)
                .collect(),
            TextureFormat::R32Float => data
                .chunks_exact(4)
                .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
                .collect(),
            format => {
                return Err(TerrainError::UnsupportedHeightmapFormat {
                    format: format!("{format:?}"),
                })
            }
        };

        let size_x = image.width();
        let size_z = image.height();

        if heights.len() != (size_x * size_z) as usize {
            return Err(TerrainError::ElevationCountMismatch {
                expected: (size_x * size_z) as usize,
                actual: heights.len(),
            });
        }

        Ok(Self {
            size_x,
            size_z,
            heights,
        })
    }

    /// Reads a heightmap file from disk, converting it to a single normalized channel.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let image = ImageReader::open(path)
            .with_context(|| format!("Failed to open the heightmap {}.", path.display()))?
            .with_guessed_format()?
            .decode()
            .with_context(|| format!("Failed to decode the heightmap {}.", path.display()))?
            .to_luma32f();

        Ok(Self {
            size_x: image.width(),
            size_z: image.height(),
            heights: image.into_raw(),
        })
    }
}
