use serde::{Deserialize, Serialize};

use crate::geometry::Point;

/// On-screen placement of an annotation canvas next to its backing pixel size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasGeometry {
    /// Displayed left/top edge in client coordinates.
    pub client_left: f32,
    pub client_top: f32,
    /// Displayed (CSS) size.
    pub display_width: f32,
    pub display_height: f32,
    /// Backing pixel grid size.
    pub pixel_width: f32,
    pub pixel_height: f32,
}

impl CanvasGeometry {
    /// A canvas displayed at its native pixel size with its origin at the client origin.
    pub fn unscaled(width: f32, height: f32) -> Self {
        Self {
            client_left: 0.0,
            client_top: 0.0,
            display_width: width,
            display_height: height,
            pixel_width: width,
            pixel_height: height,
        }
    }

    fn scale(&self) -> (f32, f32) {
        let sx = if self.display_width > 0.0 {
            self.pixel_width / self.display_width
        } else {
            1.0
        };
        let sy = if self.display_height > 0.0 {
            self.pixel_height / self.display_height
        } else {
            1.0
        };
        (sx, sy)
    }
}

/// Raw pointer or touch event position, in client coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PointerInput {
    Mouse {
        client: Point,
    },
    Touch {
        #[serde(default)]
        touches: Vec<Point>,
        #[serde(default)]
        changed_touches: Vec<Point>,
    },
}

impl PointerInput {
    pub fn mouse(x: f32, y: f32) -> Self {
        PointerInput::Mouse {
            client: Point::new(x, y),
        }
    }

    /// Active touches win; touch-end events only carry the changed list.
    pub fn client_position(&self) -> Option<Point> {
        match self {
            PointerInput::Mouse { client } => Some(*client),
            PointerInput::Touch {
                touches,
                changed_touches,
            } => touches.first().or_else(|| changed_touches.first()).copied(),
        }
    }
}

/// Maps an event into the canvas pixel grid used for stored coordinates.
pub fn map_to_canvas(input: &PointerInput, canvas: &CanvasGeometry) -> Option<Point> {
    let client = input.client_position()?;
    let (sx, sy) = canvas.scale();
    Some(Point::new(
        (client.x - canvas.client_left) * sx,
        (client.y - canvas.client_top) * sy,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn half_size_canvas() -> CanvasGeometry {
        CanvasGeometry {
            client_left: 20.0,
            client_top: 50.0,
            display_width: 400.0,
            display_height: 300.0,
            pixel_width: 800.0,
            pixel_height: 600.0,
        }
    }

    #[test]
    fn css_scaled_canvas_maps_to_pixel_grid() {
        let canvas = half_size_canvas();
        let center = PointerInput::mouse(20.0 + 200.0, 50.0 + 150.0);
        assert_eq!(map_to_canvas(&center, &canvas), Some(Point::new(400.0, 300.0)));
    }

    #[test]
    fn touch_prefers_active_then_changed_list() {
        let canvas = half_size_canvas();
        let start = PointerInput::Touch {
            touches: vec![Point::new(30.0, 60.0), Point::new(0.0, 0.0)],
            changed_touches: vec![Point::new(100.0, 100.0)],
        };
        assert_eq!(map_to_canvas(&start, &canvas), Some(Point::new(20.0, 20.0)));

        let end = PointerInput::Touch {
            touches: Vec::new(),
            changed_touches: vec![Point::new(120.0, 150.0)],
        };
        assert_eq!(map_to_canvas(&end, &canvas), Some(Point::new(200.0, 200.0)));

        let empty = PointerInput::Touch {
            touches: Vec::new(),
            changed_touches: Vec::new(),
        };
        assert_eq!(map_to_canvas(&empty, &canvas), None);
    }

    #[test]
    fn collapsed_display_size_falls_back_to_unit_scale() {
        let mut canvas = CanvasGeometry::unscaled(100.0, 100.0);
        canvas.display_width = 0.0;
        let p = map_to_canvas(&PointerInput::mouse(10.0, 10.0), &canvas).unwrap();
        assert_eq!(p, Point::new(10.0, 10.0));
    }
}
