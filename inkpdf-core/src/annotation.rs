//! Annotation records and their geometric payloads.
//!
//! Coordinates are page-pixel values at the zoom level that was active when
//! the annotation was created. The payload variant is fixed for the lifetime of
//! an annotation; settings edits only touch the fields inside it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{Point, Rect};

pub type AnnotationId = Uuid;

/// Rendered font size is the logical text size multiplied by this factor.
pub const TEXT_FONT_SCALE: f32 = 5.0;

pub const DEFAULT_COLOR: &str = "#ff0000";
pub const DEFAULT_SIZE: f32 = 3.0;
pub const DEFAULT_OPACITY: f32 = 0.3;

/// Editor tool modes. Also recorded on annotations as creation provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Select,
    Draw,
    Highlight,
    Text,
    Image,
    Erase,
}

impl Tool {
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Select => "select",
            Tool::Draw => "draw",
            Tool::Highlight => "highlight",
            Tool::Text => "text",
            Tool::Image => "image",
            Tool::Erase => "erase",
        }
    }
}

/// Geometric discriminant of an annotation payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnnotationKind {
    Line,
    Rectangle,
    Text,
    Image,
}

impl AnnotationKind {
    pub fn name(&self) -> &'static str {
        match self {
            AnnotationKind::Line => "line",
            AnnotationKind::Rectangle => "rectangle",
            AnnotationKind::Text => "text",
            AnnotationKind::Image => "image",
        }
    }
}

fn default_color() -> String {
    DEFAULT_COLOR.to_owned()
}

fn default_size() -> f32 {
    DEFAULT_SIZE
}

fn default_opacity() -> f32 {
    DEFAULT_OPACITY
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineData {
    pub start_x: f32,
    pub start_y: f32,
    pub end_x: f32,
    pub end_y: f32,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_size")]
    pub size: f32,
}

impl LineData {
    pub fn start(&self) -> Point {
        Point::new(self.start_x, self.start_y)
    }

    pub fn end(&self) -> Point {
        Point::new(self.end_x, self.end_y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RectangleData {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
}

impl RectangleData {
    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextData {
    pub text: String,
    /// Left edge of the glyph box.
    pub x: f32,
    /// Baseline; the glyph box extends upwards from here.
    pub y: f32,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_size")]
    pub size: f32,
    /// Cached measured extent. Absent on records written before metrics were cached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,
}

impl TextData {
    pub fn font_px(&self) -> f32 {
        self.size * TEXT_FONT_SCALE
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageData {
    /// Embedded image reference, usually a `data:` URL.
    pub src: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_height: Option<f32>,
}

impl ImageData {
    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    /// Resizes relative to the source dimensions, so repeated scaling never compounds.
    pub fn apply_scale(&mut self, scale: f32) {
        let base_w = self.original_width.filter(|w| *w > 0.0).unwrap_or(self.width);
        let base_h = self
            .original_height
            .filter(|h| *h > 0.0)
            .unwrap_or(self.height);
        self.width = base_w * scale;
        self.height = base_h * scale;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AnnotationData {
    Line(LineData),
    Rectangle(RectangleData),
    Text(TextData),
    Image(ImageData),
}

impl AnnotationData {
    pub fn kind(&self) -> AnnotationKind {
        match self {
            AnnotationData::Line(_) => AnnotationKind::Line,
            AnnotationData::Rectangle(_) => AnnotationKind::Rectangle,
            AnnotationData::Text(_) => AnnotationKind::Text,
            AnnotationData::Image(_) => AnnotationKind::Image,
        }
    }

    fn numbers(&self) -> Vec<f32> {
        match self {
            AnnotationData::Line(d) => vec![d.start_x, d.start_y, d.end_x, d.end_y, d.size],
            AnnotationData::Rectangle(d) => vec![d.x, d.y, d.width, d.height, d.opacity],
            AnnotationData::Text(d) => {
                let mut out = vec![d.x, d.y, d.size];
                out.extend(d.width);
                out.extend(d.height);
                out
            }
            AnnotationData::Image(d) => {
                let mut out = vec![d.x, d.y, d.width, d.height];
                out.extend(d.original_width);
                out.extend(d.original_height);
                out
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    /// Tool that created the annotation; provenance only.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<Tool>,
    /// 1-based page number.
    pub page: u32,
    pub data: AnnotationData,
}

impl Annotation {
    pub fn new(tool: Tool, page: u32, data: AnnotationData) -> Self {
        Self {
            id: Uuid::new_v4(),
            tool: Some(tool),
            page,
            data,
        }
    }

    pub fn kind(&self) -> AnnotationKind {
        self.data.kind()
    }

    pub fn origin(&self) -> Option<Point> {
        match &self.data {
            AnnotationData::Text(d) => Some(Point::new(d.x, d.y)),
            AnnotationData::Image(d) => Some(Point::new(d.x, d.y)),
            _ => None,
        }
    }

    pub fn set_origin(&mut self, origin: Point) {
        match &mut self.data {
            AnnotationData::Text(d) => {
                d.x = origin.x;
                d.y = origin.y;
            }
            AnnotationData::Image(d) => {
                d.x = origin.x;
                d.y = origin.y;
            }
            _ => {}
        }
    }

    /// Whether every numeric field survives a trip through the persisted JSON form.
    pub fn is_representable(&self) -> bool {
        self.data.numbers().iter().all(|v| v.is_finite())
    }
}
