use std::convert::TryFrom;
use std::mem;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use inkpdf_core::{
    Bitmap, DocumentEditor, DocumentRenderer, EditableDocument, RenderedDocument, Viewport,
};
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use tracing::{debug, instrument, warn};

/// Environment variable naming an explicit pdfium shared library.
pub const PDFIUM_LIBRARY_ENV: &str = "INKPDF_PDFIUM_LIBRARY_PATH";

/// pdfium-backed rasterizer and byte-level round-tripper for PDF documents.
pub struct PdfiumEngine {
    pdfium: Arc<Pdfium>,
}

impl PdfiumEngine {
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_env() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }

    fn open(&self, bytes: Vec<u8>) -> Result<LoadedPdf> {
        let document = self
            .pdfium
            .load_pdf_from_byte_vec(bytes, None)
            .context("failed to parse PDF")?;
        // SAFETY: the PdfDocument borrows the bindings owned by `pdfium`. LoadedPdf declares
        // `document` before `pdfium`, so the document is dropped while the bindings it points
        // to are still alive.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        Ok(LoadedPdf {
            document: Mutex::new(document),
            pdfium: Arc::clone(&self.pdfium),
        })
    }
}

#[async_trait]
impl DocumentRenderer for PdfiumEngine {
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    async fn load(&self, bytes: Vec<u8>) -> Result<Arc<dyn RenderedDocument>> {
        let pdf = self.open(bytes)?;
        let page_count = u32::from(pdf.document.lock().pages().len());
        debug!(page_count, "document parsed for rendering");
        Ok(Arc::new(PdfiumDocument { pdf, page_count }))
    }
}

#[async_trait]
impl DocumentEditor for PdfiumEngine {
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    async fn load(&self, bytes: Vec<u8>) -> Result<Box<dyn EditableDocument>> {
        Ok(Box::new(self.open(bytes)?))
    }
}

struct LoadedPdf {
    document: Mutex<PdfDocument<'static>>,
    #[allow(dead_code)]
    pdfium: Arc<Pdfium>,
}

#[async_trait]
impl EditableDocument for LoadedPdf {
    async fn save(&self) -> Result<Vec<u8>> {
        self.document
            .lock()
            .save_to_bytes()
            .context("failed to serialize PDF")
    }
}

struct PdfiumDocument {
    pdf: LoadedPdf,
    page_count: u32,
}

impl PdfiumDocument {
    fn page_index(&self, page: u32) -> Result<PdfPageIndex> {
        if page == 0 || page > self.page_count {
            return Err(anyhow!("page {} out of range", page));
        }
        PdfPageIndex::try_from(page - 1)
            .map_err(|_| anyhow!("page {} is out of supported range", page))
    }
}

impl RenderedDocument for PdfiumDocument {
    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn viewport(&self, page: u32, scale: f32) -> Result<Viewport> {
        let index = self.page_index(page)?;
        let document = self.pdf.document.lock();
        let page = document
            .pages()
            .get(index)
            .with_context(|| format!("page {} out of range", page))?;
        Ok(Viewport {
            width: page.width().value * scale,
            height: page.height().value * scale,
        })
    }

    #[instrument(skip(self))]
    fn render_page(&self, page: u32, scale: f32) -> Result<Bitmap> {
        let index = self.page_index(page)?;
        let document = self.pdf.document.lock();
        let pdf_page = document
            .pages()
            .get(index)
            .with_context(|| format!("page {} out of range", page))?;

        let config = PdfRenderConfig::new().scale_page_by_factor(scale.max(0.1));
        let bitmap = pdf_page
            .render_with_config(&config)
            .with_context(|| format!("failed to render page {}", page))?;
        let image = bitmap.as_image().to_rgba8();

        Ok(Bitmap {
            width: image.width(),
            height: image.height(),
            pixels: image.into_raw(),
        })
    }
}

fn bind_pdfium_from_env() -> Option<Pdfium> {
    match std::env::var(PDFIUM_LIBRARY_ENV) {
        Ok(path) if !path.is_empty() => match Pdfium::bind_to_library(&path) {
            Ok(bindings) => Some(Pdfium::new(bindings)),
            Err(err) => {
                warn!("failed to load Pdfium from {}={}: {}", PDFIUM_LIBRARY_ENV, path, err);
                None
            }
        },
        _ => None,
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => errors.push(format!("{}: {}", cwd_path.display(), err)),
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; set {} or install it ({})",
                PDFIUM_LIBRARY_ENV,
                errors.join(", ")
            ))
        }
    }
}
