//! PhotoFE core — the document engine of a raster image editor.
//!
//! Everything a shell needs to edit an image lives here: layered RGBA
//! canvases with per-layer opacity, blend mode, and visibility; a
//! compositor that flattens the stack for display or export; a
//! compressed-patch undo/redo history; selection masks; a background
//! pipeline for heavy filters; and raster file I/O. Windows, toolbars,
//! dialogs, and input handling belong to the consuming application.

pub mod canvas;
pub mod codec;
pub mod document;
pub mod filters;
pub mod history;
pub mod io;
pub mod logger;
pub mod selection;
pub mod worker;

pub use canvas::{BlendMode, Bounds, CanvasState, Layer, LayerError};
pub use codec::CodecError;
pub use document::{Document, DocumentError};
pub use history::{EditCommand, HistoryManager, MAX_HISTORY};
pub use io::{ImageIoError, SaveFormat};
pub use selection::SelectionShape;
pub use worker::{FilterPipeline, FilterResult};
