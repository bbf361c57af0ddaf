//! `data:` URL images, the only source form image annotations carry.

use anyhow::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use inkpdf_core::{Bitmap, ImageDecoder};
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum DataUrlError {
    #[error("not a data URL")]
    NotDataUrl,
    #[error("data URL has no payload separator")]
    MissingPayload,
    #[error("only base64 data URLs are supported")]
    NotBase64,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),
}

/// Splits a base64 data URL into its media type and raw payload.
pub fn parse_data_url(src: &str) -> Result<(String, Vec<u8>), DataUrlError> {
    let rest = src.strip_prefix("data:").ok_or(DataUrlError::NotDataUrl)?;
    let (header, payload) = rest.split_once(',').ok_or(DataUrlError::MissingPayload)?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or(DataUrlError::NotBase64)?;
    let bytes = STANDARD.decode(payload.trim())?;
    Ok((mime.to_owned(), bytes))
}

pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Decodes the image in `src` to RGBA8.
pub fn decode_data_url(src: &str) -> Result<Bitmap, DataUrlError> {
    let (_, bytes) = parse_data_url(src)?;
    let image = image::load_from_memory(&bytes)?.to_rgba8();
    Ok(Bitmap {
        width: image.width(),
        height: image.height(),
        pixels: image.into_raw(),
    })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DataUrlDecoder;

#[async_trait]
impl ImageDecoder for DataUrlDecoder {
    #[instrument(skip(self, src), fields(len = src.len()))]
    async fn decode(&self, src: &str) -> Result<Bitmap> {
        Ok(decode_data_url(src)?)
    }
}
