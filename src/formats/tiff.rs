use anyhow::{bail, Result};
use bevy::{
    asset::{io::Reader, AssetLoader, LoadContext},
    prelude::*,
    render::{
        render_asset::RenderAssetUsages,
        render_resource::{Extent3d, TextureDimension, TextureFormat},
    },
};
use bytemuck::cast_slice;
use std::io::Cursor;
use tiff::decoder::{Decoder, DecodingResult};

/// Loads single channel TIFF heightmaps as [`Image`]s.
///
/// 8 and 16 bit samples keep their normalized formats, floating point samples are loaded as
/// [`TextureFormat::R32Float`].
#[derive(Default)]
pub struct TiffLoader;

impl AssetLoader for TiffLoader {
    type Asset = Image;
    type Settings = ();
    type Error = anyhow::Error;

    async fn load(
        &self,
        reader: &mut dyn Reader,
        _settings: &(),
        _load_context: &mut LoadContext<'_>,
    ) -> Result<Image> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).await?;

        decode_tiff(bytes)
    }

    fn extensions(&self) -> &[&str] {
        &["tif", "tiff"]
    }
}

pub(crate) fn decode_tiff(bytes: Vec<u8>) -> Result<Image> {
    let mut decoder = Decoder::new(Cursor::new(bytes))?;
    let (width, height) = decoder.dimensions()?;

    let (data, format) = match decoder.read_image()? {
        DecodingResult::U8(data) => (data, TextureFormat::R8Unorm),
        DecodingResult::U16(data) => (cast_slice(&data).to_vec(), TextureFormat::R16Unorm),
        DecodingResult::F32(data) => (cast_slice(&data).to_vec(), TextureFormat::R32Float),
        DecodingResult::F64(data) => {
            let data: Vec<f32> = data.into_iter().map(|value| value as f32).collect();
            (cast_slice(&data).to_vec(), TextureFormat::R32Float)
        }
        _ => bail!("Only 8 bit, 16 bit and floating point TIFF heightmaps are supported."),
    };

    let pixel_size = format.block_copy_size(None).unwrap_or(1) as usize;
    if data.len() != (width * height) as usize * pixel_size {
        bail!("Only single channel TIFF heightmaps are supported.");
    }

    Ok(Image::new(
        Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        data,
        format,
        RenderAssetUsages::default(),
    ))
}
