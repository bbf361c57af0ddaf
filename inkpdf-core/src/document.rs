//! Boundaries to the external document, image and rendering libraries.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::render::Bitmap;

/// Page size in pixels at a given scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

/// A parsed document ready for rasterization.
pub trait RenderedDocument: Send + Sync {
    fn page_count(&self) -> u32;
    /// `page` is 1-based.
    fn viewport(&self, page: u32, scale: f32) -> Result<Viewport>;
    fn render_page(&self, page: u32, scale: f32) -> Result<Bitmap>;
}

#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn load(&self, bytes: Vec<u8>) -> Result<Arc<dyn RenderedDocument>>;
}

/// A document opened for byte-level round-tripping. Never structurally edited.
#[async_trait]
pub trait EditableDocument: Send + Sync {
    async fn save(&self) -> Result<Vec<u8>>;
}

#[async_trait]
pub trait DocumentEditor: Send + Sync {
    async fn load(&self, bytes: Vec<u8>) -> Result<Box<dyn EditableDocument>>;
}

#[async_trait]
pub trait ImageDecoder: Send + Sync {
    /// Decodes an embedded image reference such as a `data:` URL.
    async fn decode(&self, src: &str) -> Result<Bitmap>;
}
