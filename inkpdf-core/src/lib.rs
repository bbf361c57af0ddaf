//! Annotation overlay editing for PDF documents.

pub mod annotation;
pub mod config;
pub mod coords;
pub mod document;
pub mod error;
pub mod geometry;
pub mod history;
pub mod interaction;
pub mod persistence;
pub mod render;
pub mod session;
pub mod store;

pub use annotation::{Annotation, AnnotationData, AnnotationId, AnnotationKind, Tool};
pub use config::{EditorConfig, ToolSettings};
pub use coords::{CanvasGeometry, PointerInput};
pub use document::{
    DocumentEditor, DocumentRenderer, EditableDocument, ImageDecoder, RenderedDocument, Viewport,
};
pub use error::{EditorError, EditorResult};
pub use geometry::{Point, Rect};
pub use hit_test::{ApproxTextMeasure, SelectPrecedence, TextMeasure};
pub use persistence::{FileRecordStore, MemoryRecordStore, PersistedRecord, RecordStore};
pub use render::{Bitmap, DisplayList, DrawOp, Surface};
pub use session::{Collaborators, Editor, EditorCommand, EditorEvent, SettingsRequest};
pub use store::AnnotationStore;
