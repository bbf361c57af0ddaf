//! Pointer gesture handling for the annotation layer.
//!
//! A gesture is `down -> move* -> up`, or `down -> move* -> leave` when the
//! pointer leaves the canvas or the touch is cancelled. Only the transient
//! gesture state lives here; the store and history are borrowed per call.

use tracing::debug;

use crate::annotation::{
    Annotation, AnnotationData, AnnotationId, LineData, RectangleData, TextData, Tool,
};
use crate::config::ToolSettings;
use crate::geometry::{Point, Rect};
use crate::history::History;
use crate::hit_test::HitTester;
use crate::render::HighlightPreview;
use crate::store::AnnotationStore;

/// What the UI is asked to show in response to a gesture.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Ask the user for the content of a new text annotation.
    TextPrompt { page: u32, at: Point },
    /// Edit an existing text annotation.
    TextSettings { annotation: AnnotationId },
    /// Edit an existing image, or pick a source for the pending placement when `None`.
    ImageSettings { annotation: Option<AnnotationId> },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reaction {
    pub redraw: bool,
    pub request: Option<Request>,
}

impl Reaction {
    fn none() -> Self {
        Self::default()
    }

    fn redraw() -> Self {
        Self {
            redraw: true,
            request: None,
        }
    }

    fn request(request: Request) -> Self {
        Self {
            redraw: false,
            request: Some(request),
        }
    }
}

/// Where a text or image annotation will go once the UI answers its request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub page: u32,
    pub at: Point,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Drag {
    id: AnnotationId,
    page: u32,
    offset: Point,
    start_origin: Point,
    moved: bool,
    snapshotted: bool,
}

/// Mutable state a gesture step may touch.
pub struct EditContext<'a> {
    pub store: &'a mut AnnotationStore,
    pub history: &'a mut History,
    pub tools: &'a ToolSettings,
    pub hits: HitTester<'a>,
    pub click_threshold: f32,
}

impl EditContext<'_> {
    fn erase_at(&mut self, page: u32, point: Point) -> bool {
        let Some(index) = self.hits.find_erasable(self.store, page, point) else {
            return false;
        };
        self.history.push(self.store);
        if let Some(removed) = self.store.remove_at(index) {
            debug!(id = %removed.id, page, "erased annotation");
        }
        true
    }
}

#[derive(Debug, Default)]
pub struct Interaction {
    drawing: bool,
    /// Page and position of the current press.
    press_page: u32,
    press: Point,
    /// Last committed point of a freehand stroke, or the highlight anchor.
    anchor: Point,
    stroke_snapshotted: bool,
    drag: Option<Drag>,
    preview: Option<HighlightPreview>,
    pending_text: Option<Placement>,
    pending_image: Option<Placement>,
}

impl Interaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    pub fn dragging(&self) -> Option<AnnotationId> {
        self.drag.map(|d| d.id)
    }

    pub fn preview(&self) -> Option<&HighlightPreview> {
        self.preview.as_ref()
    }

    pub fn take_pending_text(&mut self) -> Option<Placement> {
        self.pending_text.take()
    }

    pub fn pending_image(&self) -> Option<Placement> {
        self.pending_image
    }

    pub fn take_pending_image(&mut self) -> Option<Placement> {
        self.pending_image.take()
    }

    pub fn pointer_down(
        &mut self,
        tool: Tool,
        page: u32,
        point: Point,
        ctx: &mut EditContext<'_>,
    ) -> Reaction {
        self.press_page = page;
        self.press = point;
        self.anchor = point;

        match tool {
            Tool::Erase => {
                self.drawing = true;
                if ctx.erase_at(page, point) {
                    Reaction::redraw()
                } else {
                    Reaction::none()
                }
            }
            Tool::Select => {
                let Some(id) = ctx.hits.find_movable(ctx.store, page, point) else {
                    return Reaction::none();
                };
                let Some(origin) = ctx.store.get(id).and_then(Annotation::origin) else {
                    return Reaction::none();
                };
                self.drag = Some(Drag {
                    id,
                    page,
                    offset: Point::new(point.x - origin.x, point.y - origin.y),
                    start_origin: origin,
                    moved: false,
                    snapshotted: false,
                });
                Reaction::none()
            }
            Tool::Image => {
                self.pending_image = Some(Placement { page, at: point });
                Reaction::request(Request::ImageSettings { annotation: None })
            }
            Tool::Text => {
                self.pending_text = Some(Placement { page, at: point });
                Reaction::request(Request::TextPrompt { page, at: point })
            }
            Tool::Draw | Tool::Highlight => {
                self.drawing = true;
                self.stroke_snapshotted = false;
                Reaction::none()
            }
        }
    }

    pub fn pointer_move(
        &mut self,
        tool: Tool,
        page: u32,
        point: Point,
        ctx: &mut EditContext<'_>,
    ) -> Reaction {
        // A stroke never continues onto another page.
        if self.drawing && page != self.press_page {
            return self.cancel();
        }

        if tool == Tool::Erase {
            if self.drawing && ctx.erase_at(page, point) {
                return Reaction::redraw();
            }
            return Reaction::none();
        }

        if tool == Tool::Select {
            let Some(mut drag) = self.drag.filter(|d| d.page == page) else {
                return Reaction::none();
            };
            // Snapshot the pre-drag state once the pointer travels far enough to be a move.
            if !drag.moved && self.press.distance_to(point) >= ctx.click_threshold {
                ctx.store.mutate(drag.id, |a| a.set_origin(drag.start_origin));
                drag.snapshotted = ctx.history.push(ctx.store);
                drag.moved = true;
                self.drag = Some(drag);
            }
            let origin = Point::new(point.x - drag.offset.x, point.y - drag.offset.y);
            return match ctx.store.mutate(drag.id, |a| a.set_origin(origin)) {
                Some(()) => Reaction::redraw(),
                None => {
                    self.drag = None;
                    Reaction::none()
                }
            };
        }

        if !self.drawing {
            return Reaction::none();
        }

        match tool {
            Tool::Draw => {
                if point == self.anchor {
                    return Reaction::none();
                }
                if !self.stroke_snapshotted {
                    ctx.history.push(ctx.store);
                    self.stroke_snapshotted = true;
                }
                ctx.store.append(Annotation::new(
                    Tool::Draw,
                    page,
                    AnnotationData::Line(LineData {
                        start_x: self.anchor.x,
                        start_y: self.anchor.y,
                        end_x: point.x,
                        end_y: point.y,
                        color: ctx.tools.draw_color.clone(),
                        size: ctx.tools.draw_size,
                    }),
                ));
                self.anchor = point;
                Reaction::redraw()
            }
            Tool::Highlight => {
                self.preview = Some(HighlightPreview {
                    page,
                    rect: Rect::spanning(self.anchor, point),
                    color: ctx.tools.highlight_color.clone(),
                    opacity: ctx.tools.highlight_opacity,
                });
                Reaction::redraw()
            }
            _ => Reaction::none(),
        }
    }

    pub fn pointer_up(
        &mut self,
        tool: Tool,
        page: u32,
        point: Point,
        ctx: &mut EditContext<'_>,
    ) -> Reaction {
        if tool == Tool::Select {
            let Some(drag) = self.drag.take() else {
                return Reaction::none();
            };
            if drag.page != page || self.press.distance_to(point) >= ctx.click_threshold {
                return Reaction::redraw();
            }

            // A click: put the annotation back and drop the unused snapshot.
            ctx.store.mutate(drag.id, |a| a.set_origin(drag.start_origin));
            if drag.snapshotted {
                ctx.history.pop();
            }
            let Some(annotation) = ctx.store.get(drag.id) else {
                return Reaction::none();
            };
            let request = match annotation.data {
                AnnotationData::Text(_) => Request::TextSettings {
                    annotation: drag.id,
                },
                _ => Request::ImageSettings {
                    annotation: Some(drag.id),
                },
            };
            return Reaction {
                redraw: true,
                request: Some(request),
            };
        }

        if !self.drawing {
            return Reaction::none();
        }
        if page != self.press_page {
            return self.cancel();
        }
        self.drawing = false;

        if tool == Tool::Highlight {
            self.preview = None;
            let rect = Rect::spanning(self.anchor, point);
            ctx.history.push(ctx.store);
            ctx.store.append(Annotation::new(
                Tool::Highlight,
                page,
                AnnotationData::Rectangle(RectangleData {
                    x: rect.x,
                    y: rect.y,
                    width: rect.width,
                    height: rect.height,
                    color: ctx.tools.highlight_color.clone(),
                    opacity: ctx.tools.highlight_opacity,
                }),
            ));
            return Reaction::redraw();
        }

        Reaction::none()
    }

    /// Pointer left the canvas or the touch was cancelled.
    pub fn cancel(&mut self) -> Reaction {
        self.drawing = false;
        self.drag = None;
        self.stroke_snapshotted = false;
        if self.preview.take().is_some() {
            Reaction::redraw()
        } else {
            Reaction::none()
        }
    }

    /// Drops every pending gesture and placement, as on document load.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Builds a text annotation with freshly measured metrics.
pub fn new_text_annotation(
    page: u32,
    at: Point,
    text: String,
    color: String,
    size: f32,
    hits: &HitTester<'_>,
) -> Annotation {
    let mut data = TextData {
        text,
        x: at.x,
        y: at.y,
        color,
        size,
        width: None,
        height: None,
    };
    hits.remeasure(&mut data);
    Annotation::new(Tool::Text, page, AnnotationData::Text(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hit_test::{ApproxTextMeasure, SelectPrecedence};

    struct Fixture {
        store: AnnotationStore,
        history: History,
        tools: ToolSettings,
        measure: ApproxTextMeasure,
        interaction: Interaction,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: AnnotationStore::new(),
                history: History::default(),
                tools: ToolSettings::default(),
                measure: ApproxTextMeasure::default(),
                interaction: Interaction::new(),
            }
        }

        fn step(&mut self, phase: &str, tool: Tool, x: f32, y: f32) -> Reaction {
            self.step_on(1, phase, tool, x, y)
        }

        fn step_on(&mut self, page: u32, phase: &str, tool: Tool, x: f32, y: f32) -> Reaction {
            let mut ctx = EditContext {
                store: &mut self.store,
                history: &mut self.history,
                tools: &self.tools,
                hits: HitTester::new(&self.measure, SelectPrecedence::FirstInserted),
                click_threshold: 5.0,
            };
            let p = Point::new(x, y);
            match phase {
                "down" => self.interaction.pointer_down(tool, page, p, &mut ctx),
                "move" => self.interaction.pointer_move(tool, page, p, &mut ctx),
                "up" => self.interaction.pointer_up(tool, page, p, &mut ctx),
                other => panic!("unknown phase {other}"),
            }
        }

        fn add_text(&mut self, x: f32, y: f32) -> AnnotationId {
            let hits = HitTester::new(&self.measure, SelectPrecedence::FirstInserted);
            let ann = new_text_annotation(
                1,
                Point::new(x, y),
                "hello".into(),
                "#ff0000".into(),
                3.0,
                &hits,
            );
            self.store.append(ann)
        }
    }

    #[test]
    fn freehand_stroke_commits_one_line_per_move_with_one_snapshot() {
        let mut f = Fixture::new();
        f.step("down", Tool::Draw, 0.0, 0.0);
        assert!(f.step("move", Tool::Draw, 10.0, 0.0).redraw);
        f.step("move", Tool::Draw, 20.0, 5.0);
        f.step("move", Tool::Draw, 20.0, 5.0);
        f.step("up", Tool::Draw, 20.0, 5.0);

        assert_eq!(f.store.len(), 2);
        assert_eq!(f.history.len(), 1);
        match &f.store.as_slice()[1].data {
            AnnotationData::Line(d) => {
                assert_eq!((d.start_x, d.start_y, d.end_x, d.end_y), (10.0, 0.0, 20.0, 5.0));
                assert_eq!(d.size, 3.0);
            }
            other => panic!("unexpected payload {:?}", other),
        }
        assert!(!f.interaction.is_drawing());
    }

    #[test]
    fn cancelled_stroke_keeps_committed_segments() {
        let mut f = Fixture::new();
        f.step("down", Tool::Draw, 0.0, 0.0);
        f.step("move", Tool::Draw, 5.0, 5.0);
        f.interaction.cancel();
        f.step("move", Tool::Draw, 9.0, 9.0);
        assert_eq!(f.store.len(), 1);
        assert!(!f.interaction.is_drawing());
    }

    #[test]
    fn stroke_moving_onto_another_page_is_cancelled() {
        let mut f = Fixture::new();
        f.step_on(1, "down", Tool::Draw, 500.0, 700.0);
        f.step_on(2, "move", Tool::Draw, 10.0, 10.0);
        assert!(f.store.is_empty());
        assert!(f.history.is_empty());
        assert!(!f.interaction.is_drawing());

        // The stroke does not resume when the pointer comes back.
        f.step_on(1, "move", Tool::Draw, 520.0, 700.0);
        assert!(f.store.is_empty());
    }

    #[test]
    fn highlight_released_on_another_page_commits_nothing() {
        let mut f = Fixture::new();
        f.step_on(1, "down", Tool::Highlight, 500.0, 700.0);
        f.step_on(1, "move", Tool::Highlight, 520.0, 720.0);
        assert!(f.interaction.preview().is_some());

        assert!(f.step_on(2, "up", Tool::Highlight, 10.0, 10.0).redraw);
        assert!(f.interaction.preview().is_none());
        assert!(f.store.is_empty());
        assert!(f.history.is_empty());
    }

    #[test]
    fn highlight_previews_then_commits_on_release() {
        let mut f = Fixture::new();
        f.step("down", Tool::Highlight, 50.0, 40.0);
        f.step("move", Tool::Highlight, 30.0, 60.0);
        assert_eq!(
            f.interaction.preview().map(|p| p.rect),
            Some(Rect::new(30.0, 40.0, 20.0, 20.0))
        );
        assert!(f.store.is_empty());

        f.step("up", Tool::Highlight, 10.0, 60.0);
        assert!(f.interaction.preview().is_none());
        assert_eq!(f.history.len(), 1);
        match &f.store.as_slice()[0].data {
            AnnotationData::Rectangle(d) => {
                assert_eq!(d.bounds(), Rect::new(10.0, 40.0, 40.0, 20.0));
                assert_eq!(d.opacity, 0.3);
                assert_eq!(d.color, "#ffff00");
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn cancelled_highlight_commits_nothing() {
        let mut f = Fixture::new();
        f.step("down", Tool::Highlight, 0.0, 0.0);
        f.step("move", Tool::Highlight, 30.0, 30.0);
        assert!(f.interaction.cancel().redraw);
        f.step("up", Tool::Highlight, 30.0, 30.0);
        assert!(f.store.is_empty());
        assert!(f.history.is_empty());
    }

    #[test]
    fn select_drag_moves_by_pointer_delta() {
        let mut f = Fixture::new();
        let id = f.add_text(100.0, 100.0);
        f.step("down", Tool::Select, 105.0, 95.0);
        assert_eq!(f.interaction.dragging(), Some(id));
        f.step("move", Tool::Select, 125.0, 135.0);
        let reaction = f.step("up", Tool::Select, 125.0, 135.0);
        assert!(reaction.request.is_none());

        assert_eq!(f.store.get(id).unwrap().origin(), Some(Point::new(120.0, 140.0)));
        assert_eq!(f.history.len(), 1);
        let before = f.history.pop().unwrap();
        assert_eq!(before.get(id).unwrap().origin(), Some(Point::new(100.0, 100.0)));
    }

    #[test]
    fn select_click_opens_settings_instead_of_moving() {
        let mut f = Fixture::new();
        let id = f.add_text(100.0, 100.0);
        f.step("down", Tool::Select, 105.0, 95.0);
        f.step("move", Tool::Select, 107.0, 96.0);
        let reaction = f.step("up", Tool::Select, 107.0, 96.0);

        assert_eq!(
            reaction.request,
            Some(Request::TextSettings { annotation: id })
        );
        assert_eq!(f.store.get(id).unwrap().origin(), Some(Point::new(100.0, 100.0)));
        assert!(f.history.is_empty());
    }

    #[test]
    fn select_click_at_full_history_keeps_every_undo_step() {
        let mut f = Fixture::new();
        f.history = History::new(2);
        f.history.push(&f.store);
        let id = f.add_text(100.0, 100.0);
        f.history.push(&f.store);
        f.add_text(300.0, 300.0);

        f.step("down", Tool::Select, 105.0, 95.0);
        let reaction = f.step("up", Tool::Select, 105.0, 95.0);
        assert_eq!(
            reaction.request,
            Some(Request::TextSettings { annotation: id })
        );

        assert_eq!(f.history.len(), 2);
        assert_eq!(f.history.pop().unwrap().len(), 1);
        assert_eq!(f.history.pop().unwrap().len(), 0);
    }

    #[test]
    fn drag_returning_under_threshold_leaves_history_as_it_was() {
        let mut f = Fixture::new();
        let id = f.add_text(100.0, 100.0);
        f.step("down", Tool::Select, 105.0, 95.0);
        f.step("move", Tool::Select, 150.0, 95.0);
        assert_eq!(f.history.len(), 1);
        f.step("move", Tool::Select, 106.0, 95.0);
        f.step("up", Tool::Select, 106.0, 95.0);

        assert_eq!(f.store.get(id).unwrap().origin(), Some(Point::new(100.0, 100.0)));
        assert!(f.history.is_empty());
    }

    #[test]
    fn select_on_empty_space_does_nothing() {
        let mut f = Fixture::new();
        f.add_text(100.0, 100.0);
        f.step("down", Tool::Select, 400.0, 400.0);
        assert_eq!(f.interaction.dragging(), None);
        assert_eq!(f.step("up", Tool::Select, 400.0, 400.0), Reaction::default());
        assert!(f.history.is_empty());
    }

    #[test]
    fn erase_removes_one_match_per_point_while_pressed() {
        let mut f = Fixture::new();
        f.step("down", Tool::Draw, 0.0, 0.0);
        f.step("move", Tool::Draw, 100.0, 0.0);
        f.step("up", Tool::Draw, 100.0, 0.0);
        f.step("down", Tool::Draw, 0.0, 50.0);
        f.step("move", Tool::Draw, 100.0, 50.0);
        f.step("up", Tool::Draw, 100.0, 50.0);
        assert_eq!(f.store.len(), 2);
        let snapshots = f.history.len();

        // Hovering without a press does not erase.
        f.step("move", Tool::Erase, 50.0, 0.0);
        assert_eq!(f.store.len(), 2);

        assert!(f.step("down", Tool::Erase, 50.0, 5.0).redraw);
        assert_eq!(f.store.len(), 1);
        assert!(!f.step("move", Tool::Erase, 50.0, 30.0).redraw);
        assert!(f.step("move", Tool::Erase, 50.0, 48.0).redraw);
        assert!(f.store.is_empty());
        f.step("up", Tool::Erase, 50.0, 48.0);
        assert_eq!(f.history.len(), snapshots + 2);
    }

    #[test]
    fn text_and_image_down_raise_requests() {
        let mut f = Fixture::new();
        let reaction = f.step("down", Tool::Text, 10.0, 20.0);
        assert_eq!(
            reaction.request,
            Some(Request::TextPrompt {
                page: 1,
                at: Point::new(10.0, 20.0)
            })
        );
        assert!(!f.interaction.is_drawing());

        let reaction = f.step("down", Tool::Image, 30.0, 40.0);
        assert_eq!(
            reaction.request,
            Some(Request::ImageSettings { annotation: None })
        );
        assert_eq!(
            f.interaction.pending_image(),
            Some(Placement {
                page: 1,
                at: Point::new(30.0, 40.0)
            })
        );
        assert!(f.store.is_empty());
    }
}
