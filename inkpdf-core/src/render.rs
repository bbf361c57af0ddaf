//! Full-redraw render pass for the annotation overlay.
//!
//! Every state change repaints each mounted page from the store. Image
//! bitmaps are resolved through [`ImageCache`]; a miss is recorded as pending
//! and painted on a later pass once the session has decoded it.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::annotation::{AnnotationData, DEFAULT_OPACITY};
use crate::geometry::{Point, Rect};
use crate::store::AnnotationStore;

/// Decoded RGBA8 bitmap.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// 2D drawing target for one page's annotation layer.
pub trait Surface {
    fn clear(&mut self);
    fn stroke_line(&mut self, from: Point, to: Point, color: &str, width: f32);
    fn fill_rect(&mut self, rect: Rect, color: &str, alpha: f32);
    /// `origin.y` is the text baseline.
    fn fill_text(&mut self, text: &str, origin: Point, color: &str, font_px: f32);
    fn draw_image(&mut self, image: &Bitmap, rect: Rect);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawOp {
    Clear,
    Line {
        from: Point,
        to: Point,
        color: String,
        width: f32,
    },
    Rect {
        rect: Rect,
        color: String,
        alpha: f32,
    },
    Text {
        text: String,
        origin: Point,
        color: String,
        font_px: f32,
    },
    Image {
        source_width: u32,
        source_height: u32,
        rect: Rect,
    },
}

/// Surface that records draw calls instead of rasterizing them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DisplayList {
    pub ops: Vec<DrawOp>,
}

impl DisplayList {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Surface for DisplayList {
    fn clear(&mut self) {
        self.ops.clear();
        self.ops.push(DrawOp::Clear);
    }

    fn stroke_line(&mut self, from: Point, to: Point, color: &str, width: f32) {
        self.ops.push(DrawOp::Line {
            from,
            to,
            color: color.to_owned(),
            width,
        });
    }

    fn fill_rect(&mut self, rect: Rect, color: &str, alpha: f32) {
        self.ops.push(DrawOp::Rect {
            rect,
            color: color.to_owned(),
            alpha,
        });
    }

    fn fill_text(&mut self, text: &str, origin: Point, color: &str, font_px: f32) {
        self.ops.push(DrawOp::Text {
            text: text.to_owned(),
            origin,
            color: color.to_owned(),
            font_px,
        });
    }

    fn draw_image(&mut self, image: &Bitmap, rect: Rect) {
        self.ops.push(DrawOp::Image {
            source_width: image.width,
            source_height: image.height,
            rect,
        });
    }
}

#[derive(Debug, Clone)]
enum ImageSlot {
    Pending,
    Ready(Arc<Bitmap>),
    Failed,
}

/// Bitmaps keyed by their embedded source reference.
#[derive(Debug, Default)]
pub struct ImageCache {
    slots: HashMap<String, ImageSlot>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the bitmap when decoded. Unknown sources are queued for decoding.
    pub fn resolve(&mut self, src: &str) -> Option<Arc<Bitmap>> {
        match self.slots.get(src) {
            Some(ImageSlot::Ready(bitmap)) => Some(Arc::clone(bitmap)),
            Some(ImageSlot::Pending) | Some(ImageSlot::Failed) => None,
            None => {
                self.slots.insert(src.to_owned(), ImageSlot::Pending);
                None
            }
        }
    }

    pub fn insert(&mut self, src: &str, bitmap: Bitmap) -> Arc<Bitmap> {
        let bitmap = Arc::new(bitmap);
        self.slots
            .insert(src.to_owned(), ImageSlot::Ready(Arc::clone(&bitmap)));
        bitmap
    }

    /// Marks `src` as undecodable; it is never retried.
    pub fn mark_failed(&mut self, src: &str) {
        self.slots.insert(src.to_owned(), ImageSlot::Failed);
    }

    pub fn pending(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter(|(_, slot)| matches!(slot, ImageSlot::Pending))
            .map(|(src, _)| src.clone())
            .collect()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

/// Live rectangle shown while a highlight drag is in progress.
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightPreview {
    pub page: u32,
    pub rect: Rect,
    pub color: String,
    pub opacity: f32,
}

/// Clears `surface` and paints the annotations of `page` in store order.
pub fn render_page(
    surface: &mut dyn Surface,
    store: &AnnotationStore,
    page: u32,
    images: &mut ImageCache,
    preview: Option<&HighlightPreview>,
) {
    surface.clear();

    for (_, annotation) in store.filter_by_page(page) {
        match &annotation.data {
            AnnotationData::Line(d) => surface.stroke_line(d.start(), d.end(), &d.color, d.size),
            AnnotationData::Rectangle(d) => {
                let alpha = if d.opacity.is_finite() {
                    d.opacity
                } else {
                    DEFAULT_OPACITY
                };
                surface.fill_rect(d.bounds(), &d.color, alpha);
            }
            AnnotationData::Text(d) => {
                surface.fill_text(&d.text, Point::new(d.x, d.y), &d.color, d.font_px())
            }
            AnnotationData::Image(d) => {
                if d.src.is_empty() {
                    continue;
                }
                let Some(bitmap) = images.resolve(&d.src) else {
                    continue;
                };
                let width = pick_extent(d.width, d.original_width, bitmap.width);
                let height = pick_extent(d.height, d.original_height, bitmap.height);
                surface.draw_image(&bitmap, Rect::new(d.x, d.y, width, height));
            }
        }
    }

    if let Some(preview) = preview.filter(|p| p.page == page) {
        surface.fill_rect(preview.rect, &preview.color, preview.opacity);
    }
}

fn pick_extent(current: f32, original: Option<f32>, natural: u32) -> f32 {
    if current > 0.0 {
        current
    } else if let Some(original) = original.filter(|o| *o > 0.0) {
        original
    } else {
        if natural == 0 {
            warn!("image bitmap reports zero extent");
        }
        natural as f32
    }
}
