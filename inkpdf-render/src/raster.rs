//! Composites the annotation layer onto a rasterized page.

use image::{Rgba, RgbaImage};
use inkpdf_core::geometry::point_to_segment_distance;
use inkpdf_core::{Bitmap, Point, Rect, Surface};
use tracing::{debug, warn};

/// Parses `#rrggbb` or `#rgb`. Anything else is `None`.
pub fn parse_color(color: &str) -> Option<[u8; 3]> {
    let hex = color.strip_prefix('#').filter(|h| h.is_ascii())?;
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        6 => Some([channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?]),
        3 => {
            let mut rgb = [0u8; 3];
            for (slot, digit) in rgb.iter_mut().zip(hex.chars()) {
                *slot = channel(&digit.to_string())? * 17;
            }
            Some(rgb)
        }
        _ => None,
    }
}

fn resolve_color(color: &str) -> [u8; 3] {
    parse_color(color).unwrap_or_else(|| {
        debug!(color, "unrecognized color, painting black");
        [0, 0, 0]
    })
}

fn blend_pixel(pixel: &mut Rgba<u8>, color: [u8; 3], alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    let inv = 1.0 - alpha;
    for (channel, value) in pixel.0.iter_mut().zip(color) {
        *channel = (*channel as f32 * inv + value as f32 * alpha)
            .round()
            .clamp(0.0, 255.0) as u8;
    }
}

/// A page bitmap the annotation layer is painted over. `clear` restores the bare page.
pub struct RasterSurface {
    base: RgbaImage,
    image: RgbaImage,
}

impl RasterSurface {
    pub fn new(page: Bitmap) -> Option<Self> {
        let base = RgbaImage::from_raw(page.width, page.height, page.pixels)?;
        Some(Self {
            image: base.clone(),
            base,
        })
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Clamped pixel span `[start, end)` covering `from..to` on an axis of length `len`.
    fn span(from: f32, to: f32, len: u32) -> (u32, u32) {
        let start = from.floor().max(0.0).min(len as f32) as u32;
        let end = to.ceil().max(0.0).min(len as f32) as u32;
        (start, end.max(start))
    }
}

impl Surface for RasterSurface {
    fn clear(&mut self) {
        self.image.clone_from(&self.base);
    }

    fn stroke_line(&mut self, from: Point, to: Point, color: &str, width: f32) {
        let rgb = resolve_color(color);
        let radius = (width / 2.0).max(0.5);
        let (x0, x1) = Self::span(from.x.min(to.x) - radius, from.x.max(to.x) + radius, self.image.width());
        let (y0, y1) = Self::span(from.y.min(to.y) - radius, from.y.max(to.y) + radius, self.image.height());
        for y in y0..y1 {
            for x in x0..x1 {
                let center = Point::new(x as f32 + 0.5, y as f32 + 0.5);
                if point_to_segment_distance(center, from, to) <= radius {
                    blend_pixel(self.image.get_pixel_mut(x, y), rgb, 1.0);
                }
            }
        }
    }

    fn fill_rect(&mut self, rect: Rect, color: &str, alpha: f32) {
        let rgb = resolve_color(color);
        let (x0, x1) = Self::span(rect.x, rect.right(), self.image.width());
        let (y0, y1) = Self::span(rect.y, rect.bottom(), self.image.height());
        for y in y0..y1 {
            for x in x0..x1 {
                blend_pixel(self.image.get_pixel_mut(x, y), rgb, alpha);
            }
        }
    }

    fn fill_text(&mut self, text: &str, origin: Point, _color: &str, _font_px: f32) {
        // No glyph rasterizer is bundled; text only appears in recorded display lists.
        debug!(len = text.len(), x = origin.x, y = origin.y, "skipping text in raster output");
    }

    fn draw_image(&mut self, image: &Bitmap, rect: Rect) {
        let Some(source) = RgbaImage::from_raw(image.width, image.height, image.pixels.clone()) else {
            warn!(width = image.width, height = image.height, "bitmap size does not match pixels");
            return;
        };
        if source.width() == 0 || source.height() == 0 || !(rect.width > 0.0 && rect.height > 0.0) {
            return;
        }

        // Sample only the pixels that land on the page, however large the target rect is.
        let (x0, x1) = Self::span(rect.x, rect.right(), self.image.width());
        let (y0, y1) = Self::span(rect.y, rect.bottom(), self.image.height());
        let step_x = source.width() as f64 / rect.width as f64;
        let step_y = source.height() as f64 / rect.height as f64;
        for y in y0..y1 {
            let v = ((y as f64 + 0.5 - rect.y as f64) * step_y).floor();
            if v < 0.0 || v >= source.height() as f64 {
                continue;
            }
            for x in x0..x1 {
                let u = ((x as f64 + 0.5 - rect.x as f64) * step_x).floor();
                if u < 0.0 || u >= source.width() as f64 {
                    continue;
                }
                let [r, g, b, a] = source.get_pixel(u as u32, v as u32).0;
                blend_pixel(self.image.get_pixel_mut(x, y), [r, g, b], a as f32 / 255.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn white_page(width: u32, height: u32) -> RasterSurface {
        RasterSurface::new(Bitmap {
            width,
            height,
            pixels: vec![255; (width * height * 4) as usize],
        })
        .unwrap()
    }

    #[test]
    fn colors_parse_long_and_short_hex() {
        assert_eq!(parse_color("#ff8000"), Some([255, 128, 0]));
        assert_eq!(parse_color("#f00"), Some([255, 0, 0]));
        assert_eq!(parse_color("red"), None);
        assert_eq!(parse_color("#12345"), None);
    }

    #[test]
    fn highlight_blends_with_page() {
        let mut surface = white_page(4, 4);
        surface.fill_rect(Rect::new(1.0, 1.0, 2.0, 2.0), "#ffff00", 0.5);
        assert_eq!(surface.image().get_pixel(1, 1).0, [255, 255, 128, 255]);
        assert_eq!(surface.image().get_pixel(0, 0).0, [255, 255, 255, 255]);
        assert_eq!(surface.image().get_pixel(3, 3).0, [255, 255, 255, 255]);

        surface.clear();
        assert_eq!(surface.image().get_pixel(1, 1).0, [255, 255, 255, 255]);
    }

    #[test]
    fn stroke_covers_segment_within_half_width() {
        let mut surface = white_page(10, 10);
        surface.stroke_line(Point::new(0.0, 5.0), Point::new(10.0, 5.0), "#000000", 2.0);
        assert_eq!(surface.image().get_pixel(5, 4).0, [0, 0, 0, 255]);
        assert_eq!(surface.image().get_pixel(5, 5).0, [0, 0, 0, 255]);
        assert_eq!(surface.image().get_pixel(5, 1).0, [255, 255, 255, 255]);
    }

    #[test]
    fn images_scale_into_their_rect_and_clip_at_edges() {
        let mut surface = white_page(8, 8);
        let red = Bitmap {
            width: 1,
            height: 1,
            pixels: vec![255, 0, 0, 255],
        };
        surface.draw_image(&red, Rect::new(6.0, 6.0, 4.0, 4.0));
        assert_eq!(surface.image().get_pixel(7, 7).0, [255, 0, 0, 255]);
        assert_eq!(surface.image().get_pixel(5, 5).0, [255, 255, 255, 255]);
    }

    #[test]
    fn oversized_image_rect_only_paints_the_page() {
        let mut surface = white_page(8, 8);
        // Left half red, right half blue.
        let split = Bitmap {
            width: 2,
            height: 1,
            pixels: vec![255, 0, 0, 255, 0, 0, 255, 255],
        };
        surface.draw_image(&split, Rect::new(-4.0, 0.0, 4_000_000.0, 3_000_000.0));
        assert_eq!(surface.image().get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(surface.image().get_pixel(7, 7).0, [255, 0, 0, 255]);

        surface.clear();
        surface.draw_image(&split, Rect::new(-1_999_996.0, 0.0, 4_000_000.0, 8.0));
        assert_eq!(surface.image().get_pixel(1, 3).0, [255, 0, 0, 255]);
        assert_eq!(surface.image().get_pixel(6, 3).0, [0, 0, 255, 255]);
    }

    #[test]
    fn mismatched_page_buffer_is_rejected() {
        assert!(RasterSurface::new(Bitmap {
            width: 2,
            height: 2,
            pixels: vec![0; 3],
        })
        .is_none());
    }
}
