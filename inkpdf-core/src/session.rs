//! The editor session: one loaded document, its annotation overlay, and the
//! command/event surface the UI talks to.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::annotation::{Annotation, AnnotationData, AnnotationId, ImageData, Tool};
use crate::config::{EditorConfig, ToolSettings};
use crate::coords::{map_to_canvas, CanvasGeometry, PointerInput};
use crate::document::{
    DocumentEditor, DocumentRenderer, EditableDocument, ImageDecoder, RenderedDocument, Viewport,
};
use crate::error::{EditorError, EditorResult};
use crate::geometry::Point;
use crate::history::History;
use crate::hit_test::{HitTester, TextMeasure};
use crate::interaction::{new_text_annotation, EditContext, Interaction, Reaction, Request};
use crate::persistence::{load_most_recent, now_millis, PersistedRecord, RecordStore};
use crate::render::{self, ImageCache, Surface};
use crate::store::AnnotationStore;

/// External libraries the session delegates to.
#[derive(Clone)]
pub struct Collaborators {
    pub renderer: Arc<dyn DocumentRenderer>,
    pub editor: Arc<dyn DocumentEditor>,
    pub records: Arc<dyn RecordStore>,
    pub images: Arc<dyn ImageDecoder>,
    pub measure: Arc<dyn TextMeasure + Send + Sync>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum EditorCommand {
    SetTool {
        tool: Tool,
    },
    PointerDown {
        page: u32,
        input: PointerInput,
        #[serde(default)]
        canvas: Option<CanvasGeometry>,
    },
    PointerMove {
        page: u32,
        input: PointerInput,
        #[serde(default)]
        canvas: Option<CanvasGeometry>,
    },
    PointerUp {
        page: u32,
        input: PointerInput,
        #[serde(default)]
        canvas: Option<CanvasGeometry>,
    },
    PointerLeave,
    SubmitText {
        text: String,
    },
    CancelText,
    OpenTextSettings,
    OpenDrawSettings,
    OpenHighlightSettings,
    ApplyTextSettings {
        color: String,
        size: f32,
        #[serde(default)]
        text: String,
    },
    ApplyDrawSettings {
        color: String,
        size: f32,
    },
    ApplyHighlightSettings {
        color: String,
        opacity: f32,
    },
    ApplyImageSettings {
        scale: f32,
        #[serde(default)]
        source: Option<String>,
    },
    CancelSettings,
    Undo,
    Clear,
    GoToPage {
        page: u32,
    },
    SetZoom {
        zoom: f32,
    },
    Save,
}

/// Values a settings dialog should open with.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SettingsRequest {
    Text {
        annotation: Option<AnnotationId>,
        text: String,
        color: String,
        size: f32,
    },
    Draw {
        color: String,
        size: f32,
    },
    Highlight {
        color: String,
        opacity: f32,
    },
    Image {
        annotation: Option<AnnotationId>,
        scale: f32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EditorEvent {
    DocumentLoaded { file_name: String, page_count: u32 },
    RedrawNeeded,
    PageChanged { page: u32 },
    Status { message: String },
    TextPromptRequested { page: u32, at: Point },
    SettingsRequested { settings: SettingsRequest },
}

struct LoadedDocument {
    file_name: String,
    rendered: Arc<dyn RenderedDocument>,
    editable: Box<dyn EditableDocument>,
    page_count: u32,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Down,
    Move,
    Up,
}

pub struct Editor {
    config: EditorConfig,
    collab: Collaborators,
    tools: ToolSettings,
    tool: Tool,
    document: Option<LoadedDocument>,
    annotations: AnnotationStore,
    history: History,
    current_page: u32,
    zoom: f32,
    interaction: Interaction,
    images: ImageCache,
    editing_text: Option<AnnotationId>,
    editing_image: Option<AnnotationId>,
    events: Arc<Mutex<Vec<EditorEvent>>>,
}

impl Editor {
    pub fn new(config: EditorConfig, collab: Collaborators) -> Self {
        Self {
            tools: config.tools.clone(),
            history: History::new(config.history_capacity),
            config,
            collab,
            tool: Tool::Select,
            document: None,
            annotations: AnnotationStore::new(),
            current_page: 1,
            zoom: 1.0,
            interaction: Interaction::new(),
            images: ImageCache::new(),
            editing_text: None,
            editing_image: None,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn drain_events(&self) -> Vec<EditorEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn annotations(&self) -> &AnnotationStore {
        &self.annotations
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn tool_settings(&self) -> &ToolSettings {
        &self.tools
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn file_name(&self) -> Option<&str> {
        self.document.as_ref().map(|d| d.file_name.as_str())
    }

    pub fn page_count(&self) -> u32 {
        self.document.as_ref().map_or(0, |d| d.page_count)
    }

    fn emit(&self, event: EditorEvent) {
        self.events.lock().push(event);
    }

    fn status(&self, message: impl Into<String>) {
        let message = message.into();
        info!(%message, "status");
        self.emit(EditorEvent::Status { message });
    }

    fn redraw(&self) {
        self.emit(EditorEvent::RedrawNeeded);
    }

    /// Opens `bytes` under `file_name`. A saved record with the same name wins
    /// over the supplied bytes, restoring its overlay and view state.
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    pub async fn open(&mut self, file_name: &str, bytes: Vec<u8>) -> EditorResult<()> {
        let stored = match self.collab.records.get(file_name) {
            Ok(stored) => stored,
            Err(err) => {
                warn!(?err, file_name, "failed to read saved record, using picked file");
                None
            }
        };

        match stored {
            Some(record) => {
                debug!(file_name, "restoring saved record");
                self.load_record(record).await
            }
            None => {
                self.load_session(file_name, bytes, AnnotationStore::new(), 1, 1.0)
                    .await
            }
        }
    }

    /// Loads the saved record named `file_name`.
    #[instrument(skip(self))]
    pub async fn load_by_name(&mut self, file_name: &str) -> EditorResult<()> {
        let record = match self.collab.records.get(file_name) {
            Ok(Some(record)) => record,
            Ok(None) => {
                self.status(format!("No saved PDF named {file_name}"));
                return Err(EditorError::NotFound(file_name.to_owned()));
            }
            Err(err) => {
                self.status(format!("Error loading PDF: {err:#}"));
                return Err(EditorError::Storage(err));
            }
        };
        self.load_record(record).await
    }

    /// Loads the newest saved record. Returns `false` when nothing was saved yet.
    #[instrument(skip(self))]
    pub async fn resume_most_recent(&mut self) -> EditorResult<bool> {
        let record = match load_most_recent(self.collab.records.as_ref()) {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(false),
            Err(err) => {
                warn!(?err, "failed to enumerate saved records");
                self.status(format!("Error loading saved PDF: {err:#}"));
                return Err(EditorError::Storage(err));
            }
        };
        self.load_record(record).await?;
        self.status("Loaded last saved PDF");
        Ok(true)
    }

    async fn load_record(&mut self, record: PersistedRecord) -> EditorResult<()> {
        self.load_session(
            &record.file_name,
            record.pdf_data,
            record.annotations,
            record.current_page,
            record.zoom,
        )
        .await
    }

    async fn load_session(
        &mut self,
        file_name: &str,
        bytes: Vec<u8>,
        annotations: AnnotationStore,
        current_page: u32,
        zoom: f32,
    ) -> EditorResult<()> {
        let rendered = match self.collab.renderer.load(bytes.clone()).await {
            Ok(doc) => doc,
            Err(err) => return Err(self.load_failed(err)),
        };
        let editable = match self.collab.editor.load(bytes).await {
            Ok(doc) => doc,
            Err(err) => return Err(self.load_failed(err)),
        };

        let page_count = rendered.page_count();
        self.document = Some(LoadedDocument {
            file_name: file_name.to_owned(),
            rendered,
            editable,
            page_count,
        });
        self.annotations = annotations;
        self.history.clear();
        self.interaction.reset();
        self.images.clear();
        self.editing_text = None;
        self.editing_image = None;
        self.zoom = self.config.clamp_zoom(zoom);
        self.current_page = current_page.clamp(1, page_count.max(1));

        info!(
            file_name,
            page_count,
            annotations = self.annotations.len(),
            "document loaded"
        );
        self.emit(EditorEvent::DocumentLoaded {
            file_name: file_name.to_owned(),
            page_count,
        });
        self.emit(EditorEvent::PageChanged {
            page: self.current_page,
        });
        self.redraw();
        self.status("PDF loaded successfully");
        Ok(())
    }

    fn load_failed(&self, err: anyhow::Error) -> EditorError {
        warn!(?err, "failed to load document");
        self.status(format!("Error loading PDF: {err:#}"));
        EditorError::Load(err)
    }

    /// Writes the document bytes and overlay under the current file name.
    #[instrument(skip(self))]
    pub async fn save(&mut self) -> EditorResult<()> {
        let Some(doc) = self.document.as_ref() else {
            self.status("No PDF loaded");
            return Err(EditorError::NoDocument);
        };
        self.status("Saving PDF...");

        let pdf_data = match doc.editable.save().await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(?err, "failed to serialize document");
                self.status(format!("Error saving PDF: {err:#}"));
                return Err(EditorError::Storage(err));
            }
        };
        let record = PersistedRecord {
            file_name: doc.file_name.clone(),
            pdf_data,
            annotations: self.annotations.clone(),
            current_page: self.current_page,
            zoom: self.zoom,
            timestamp: now_millis(),
        };
        if let Err(err) = self.collab.records.put(&record) {
            warn!(?err, file_name = %record.file_name, "failed to write record");
            self.status(format!("Error saving PDF: {err:#}"));
            return Err(EditorError::Storage(err));
        }

        self.status("PDF saved successfully");
        Ok(())
    }

    /// Applies one UI command. Failures are also reported as status events.
    pub async fn apply(&mut self, command: EditorCommand) -> EditorResult<()> {
        match command {
            EditorCommand::SetTool { tool } => self.set_tool(tool),
            EditorCommand::PointerDown { page, input, canvas } => {
                self.pointer(Phase::Down, page, &input, canvas)
            }
            EditorCommand::PointerMove { page, input, canvas } => {
                self.pointer(Phase::Move, page, &input, canvas)
            }
            EditorCommand::PointerUp { page, input, canvas } => {
                self.pointer(Phase::Up, page, &input, canvas)
            }
            EditorCommand::PointerLeave => self.pointer_leave(),
            EditorCommand::SubmitText { text } => self.submit_text(&text),
            EditorCommand::CancelText => {
                self.interaction.take_pending_text();
            }
            EditorCommand::OpenTextSettings => self.open_text_settings(None),
            EditorCommand::OpenDrawSettings => self.emit(EditorEvent::SettingsRequested {
                settings: SettingsRequest::Draw {
                    color: self.tools.draw_color.clone(),
                    size: self.tools.draw_size,
                },
            }),
            EditorCommand::OpenHighlightSettings => self.emit(EditorEvent::SettingsRequested {
                settings: SettingsRequest::Highlight {
                    color: self.tools.highlight_color.clone(),
                    opacity: self.tools.highlight_opacity,
                },
            }),
            EditorCommand::ApplyTextSettings { color, size, text } => {
                self.apply_text_settings(color, size, &text)
            }
            EditorCommand::ApplyDrawSettings { color, size } => {
                self.tools.draw_color = color;
                if size.is_finite() && size > 0.0 {
                    self.tools.draw_size = size;
                }
            }
            EditorCommand::ApplyHighlightSettings { color, opacity } => {
                self.tools.highlight_color = color;
                if opacity.is_finite() {
                    self.tools.highlight_opacity = opacity.clamp(0.0, 1.0);
                }
            }
            EditorCommand::ApplyImageSettings { scale, source } => {
                return self.apply_image_settings(scale, source).await;
            }
            EditorCommand::CancelSettings => self.cancel_settings(),
            EditorCommand::Undo => self.undo(),
            EditorCommand::Clear => self.clear(),
            EditorCommand::GoToPage { page } => self.go_to_page(page),
            EditorCommand::SetZoom { zoom } => self.set_zoom(zoom),
            EditorCommand::Save => return self.save().await,
        }
        Ok(())
    }

    /// Switching tools abandons any gesture in progress.
    pub fn set_tool(&mut self, tool: Tool) {
        if self.interaction.cancel().redraw {
            self.redraw();
        }
        debug!(tool = tool.name(), "tool selected");
        self.tool = tool;
    }

    fn canvas_for(&self, page: u32) -> Option<CanvasGeometry> {
        let doc = self.document.as_ref()?;
        match doc.rendered.viewport(page, self.zoom) {
            Ok(viewport) => Some(CanvasGeometry::unscaled(viewport.width, viewport.height)),
            Err(err) => {
                warn!(?err, page, "failed to compute page viewport");
                None
            }
        }
    }

    fn pointer(
        &mut self,
        phase: Phase,
        page: u32,
        input: &PointerInput,
        canvas: Option<CanvasGeometry>,
    ) {
        if page == 0 || page > self.page_count() {
            return;
        }
        let Some(canvas) = canvas.or_else(|| self.canvas_for(page)) else {
            return;
        };
        let Some(point) = map_to_canvas(input, &canvas) else {
            return;
        };

        let tool = self.tool;
        let mut ctx = EditContext {
            store: &mut self.annotations,
            history: &mut self.history,
            tools: &self.tools,
            hits: HitTester::new(self.collab.measure.as_ref(), self.config.select_precedence),
            click_threshold: self.config.click_threshold,
        };
        let reaction = match phase {
            Phase::Down => self.interaction.pointer_down(tool, page, point, &mut ctx),
            Phase::Move => self.interaction.pointer_move(tool, page, point, &mut ctx),
            Phase::Up => self.interaction.pointer_up(tool, page, point, &mut ctx),
        };
        self.react(reaction);
    }

    fn pointer_leave(&mut self) {
        let reaction = self.interaction.cancel();
        self.react(reaction);
    }

    fn react(&mut self, reaction: Reaction) {
        if reaction.redraw {
            self.redraw();
        }
        match reaction.request {
            None => {}
            Some(Request::TextPrompt { page, at }) => {
                self.emit(EditorEvent::TextPromptRequested { page, at })
            }
            Some(Request::TextSettings { annotation }) => self.open_text_settings(Some(annotation)),
            Some(Request::ImageSettings { annotation }) => {
                self.editing_image = annotation;
                self.emit(EditorEvent::SettingsRequested {
                    settings: SettingsRequest::Image {
                        annotation,
                        scale: 1.0,
                    },
                });
            }
        }
    }

    fn hit_tester(&self) -> HitTester<'_> {
        HitTester::new(self.collab.measure.as_ref(), self.config.select_precedence)
    }

    fn submit_text(&mut self, text: &str) {
        let Some(placement) = self.interaction.take_pending_text() else {
            return;
        };
        if text.trim().is_empty() {
            return;
        }

        let annotation = new_text_annotation(
            placement.page,
            placement.at,
            text.to_owned(),
            self.tools.text_color.clone(),
            self.tools.text_size,
            &self.hit_tester(),
        );
        self.history.push(&self.annotations);
        self.annotations.append(annotation);
        self.redraw();
    }

    /// Opens the text dialog for `annotation`, or for the tool defaults when `None`.
    pub fn open_text_settings(&mut self, annotation: Option<AnnotationId>) {
        let target = annotation.and_then(|id| match self.annotations.get(id).map(|a| &a.data) {
            Some(AnnotationData::Text(d)) => Some((id, d.text.clone(), d.color.clone(), d.size)),
            _ => None,
        });

        let settings = match target {
            Some((id, text, color, size)) => {
                self.editing_text = Some(id);
                SettingsRequest::Text {
                    annotation: Some(id),
                    text,
                    color,
                    size,
                }
            }
            None => {
                self.editing_text = None;
                SettingsRequest::Text {
                    annotation: None,
                    text: String::new(),
                    color: self.tools.text_color.clone(),
                    size: self.tools.text_size,
                }
            }
        };
        self.emit(EditorEvent::SettingsRequested { settings });
    }

    fn apply_text_settings(&mut self, color: String, size: f32, text: &str) {
        let size = if size.is_finite() && size > 0.0 {
            size
        } else {
            self.tools.text_size
        };

        let Some(id) = self.editing_text.take() else {
            self.tools.text_color = color;
            self.tools.text_size = size;
            return;
        };
        if self.annotations.get(id).is_none() {
            return;
        }

        self.history.push(&self.annotations);
        let hits = HitTester::new(self.collab.measure.as_ref(), self.config.select_precedence);
        self.annotations.mutate(id, |annotation| {
            if let AnnotationData::Text(d) = &mut annotation.data {
                d.color = color;
                d.size = size;
                if !text.trim().is_empty() {
                    d.text = text.to_owned();
                }
                hits.remeasure(d);
            }
        });
        self.redraw();
    }

    async fn apply_image_settings(&mut self, scale: f32, source: Option<String>) -> EditorResult<()> {
        let scale = if scale.is_finite() && scale > 0.0 {
            scale
        } else {
            1.0
        };

        if let Some(id) = self.editing_image.take() {
            self.interaction.take_pending_image();
            if self.annotations.get(id).is_none() {
                return Ok(());
            }
            self.history.push(&self.annotations);
            self.annotations.mutate(id, |annotation| {
                if let AnnotationData::Image(d) = &mut annotation.data {
                    d.apply_scale(scale);
                }
            });
            self.redraw();
            return Ok(());
        }

        let Some(placement) = self.interaction.take_pending_image() else {
            return Ok(());
        };
        let Some(src) = source else {
            return Ok(());
        };

        let bitmap = match self.collab.images.decode(&src).await {
            Ok(bitmap) => bitmap,
            Err(err) => {
                warn!(?err, src_len = src.len(), "failed to decode chosen image");
                self.status(format!("Error loading image: {err:#}"));
                return Err(EditorError::Decode(err));
            }
        };

        let natural_w = bitmap.width as f32;
        let natural_h = bitmap.height as f32;
        self.images.insert(&src, bitmap);
        self.history.push(&self.annotations);
        self.annotations.append(Annotation::new(
            Tool::Image,
            placement.page,
            AnnotationData::Image(ImageData {
                src,
                x: placement.at.x,
                y: placement.at.y,
                width: natural_w * scale,
                height: natural_h * scale,
                original_width: Some(natural_w),
                original_height: Some(natural_h),
            }),
        ));
        self.redraw();
        Ok(())
    }

    fn cancel_settings(&mut self) {
        self.editing_text = None;
        self.editing_image = None;
        self.interaction.take_pending_image();
    }

    pub fn undo(&mut self) {
        let Some(previous) = self.history.pop() else {
            self.status("Nothing to undo");
            return;
        };
        self.interaction.cancel();
        self.annotations = previous;
        self.redraw();
        self.status("Last action undone");
    }

    pub fn clear(&mut self) {
        self.history.push(&self.annotations);
        self.annotations.clear();
        self.redraw();
        self.status("All annotations cleared");
    }

    /// Ignored outside `1..=page_count`.
    pub fn go_to_page(&mut self, page: u32) {
        if page < 1 || page > self.page_count() {
            return;
        }
        self.current_page = page;
        self.emit(EditorEvent::PageChanged { page });
    }

    /// Pages are re-rendered at the new scale; stored annotation coordinates are left as drawn.
    pub fn set_zoom(&mut self, zoom: f32) {
        let zoom = self.config.clamp_zoom(zoom);
        if (zoom - self.zoom).abs() > f32::EPSILON {
            self.zoom = zoom;
            self.redraw();
        }
    }

    /// Page sizes at the current zoom, used to size each annotation canvas.
    pub fn page_viewports(&self) -> EditorResult<Vec<Viewport>> {
        let doc = self.document.as_ref().ok_or(EditorError::NoDocument)?;
        (1..=doc.page_count)
            .map(|page| doc.rendered.viewport(page, self.zoom))
            .collect::<anyhow::Result<Vec<_>>>()
            .map_err(EditorError::Load)
    }

    /// Rasterizes one page of the document at the current zoom.
    pub fn render_document_page(&self, page: u32) -> EditorResult<render::Bitmap> {
        let doc = self.document.as_ref().ok_or(EditorError::NoDocument)?;
        doc.rendered.render_page(page, self.zoom).map_err(|err| {
            warn!(?err, page, "failed to rasterize page");
            self.status(format!("Error rendering page {page}: {err:#}"));
            EditorError::Load(err)
        })
    }

    /// Repaints the annotation layer of every mounted page.
    pub fn render<S: Surface>(&mut self, layers: &mut [(u32, S)]) {
        for (page, surface) in layers.iter_mut() {
            render::render_page(
                surface,
                &self.annotations,
                *page,
                &mut self.images,
                self.interaction.preview(),
            );
        }
    }

    /// Decodes every image the render pass could not paint yet. Emits a redraw
    /// when at least one bitmap became available.
    pub async fn pump_image_decodes(&mut self) -> usize {
        let mut decoded = 0;
        for src in self.images.pending() {
            match self.collab.images.decode(&src).await {
                Ok(bitmap) => {
                    self.images.insert(&src, bitmap);
                    decoded += 1;
                }
                Err(err) => {
                    warn!(?err, src_len = src.len(), "failed to decode annotation image");
                    self.images.mark_failed(&src);
                }
            }
        }
        if decoded > 0 {
            self.redraw();
        }
        decoded
    }
}
