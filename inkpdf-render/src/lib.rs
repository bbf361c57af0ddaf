mod data_url;
#[cfg(feature = "pdf")]
mod pdfium;
mod raster;

pub use data_url::{decode_data_url, encode_data_url, parse_data_url, DataUrlDecoder, DataUrlError};
#[cfg(feature = "pdf")]
pub use pdfium::{PdfiumEngine, PDFIUM_LIBRARY_ENV};
pub use raster::{parse_color, RasterSurface};
