//! Document aggregate — one open image: the layer stack plus its edit
//! history, behind a single owner.
//!
//! Shells and tools never reach into ambient state; they hold a `Document`
//! and go through its methods. Exactly one control thread mutates a
//! document at a time; background filters work on snapshots and come back
//! through [`Document::commit_filter_result`].

use std::path::PathBuf;
use uuid::Uuid;

use image::RgbaImage;

use crate::canvas::{Bounds, CanvasState, LayerError};
use crate::codec::CodecError;
use crate::history::{EditCommand, HistoryManager};
use crate::worker::FilterResult;

/// Error type for document edit operations.
#[derive(Debug)]
pub enum DocumentError {
    Layer(LayerError),
    Codec(CodecError),
}

impl std::fmt::Display for DocumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentError::Layer(e) => write!(f, "{}", e),
            DocumentError::Codec(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for DocumentError {}

impl From<LayerError> for DocumentError {
    fn from(e: LayerError) -> Self {
        DocumentError::Layer(e)
    }
}

impl From<CodecError> for DocumentError {
    fn from(e: CodecError) -> Self {
        DocumentError::Codec(e)
    }
}

/// Single open document.
pub struct Document {
    pub id: Uuid,
    pub canvas: CanvasState,
    pub history: HistoryManager,
    /// `None` for unsaved/untitled documents.
    pub path: Option<PathBuf>,
    pub is_dirty: bool,
    /// Display name (derived from path or "Untitled-X").
    pub name: String,
}

impl Document {
    pub fn new_untitled(untitled_counter: usize, width: u32, height: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            canvas: CanvasState::new(width, height),
            history: HistoryManager::default(),
            path: None,
            is_dirty: false,
            name: format!("Untitled-{}", untitled_counter),
        }
    }

    /// Document opened from a decoded image file: one layer holding it.
    pub fn from_image(path: PathBuf, image: RgbaImage) -> Self {
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        Self {
            id: Uuid::new_v4(),
            canvas: CanvasState::from_image(image),
            history: HistoryManager::default(),
            path: Some(path),
            is_dirty: false,
            name,
        }
    }

    /// Get the display title (name with dirty indicator).
    pub fn display_title(&self) -> String {
        if self.is_dirty {
            format!("{}*", self.name)
        } else {
            self.name.clone()
        }
    }

    // ---- edits --------------------------------------------------------------

    /// Record and install one edit against a layer.
    ///
    /// `before` is the layer's raster prior to the edit, `after` the edited
    /// raster that replaces it. `bounds` narrows what the history entry
    /// captures to the region that actually changed; `None` captures the
    /// full extent. The command is pushed onto the history *after* the
    /// layer is mutated, so a patch-encoding failure leaves both layer and
    /// history unchanged.
    pub fn apply_edit(
        &mut self,
        layer_index: usize,
        description: String,
        before: &RgbaImage,
        after: RgbaImage,
        bounds: Option<Bounds>,
    ) -> Result<(), DocumentError> {
        if layer_index >= self.canvas.layers.len() {
            return Err(LayerError::IndexOutOfRange {
                index: layer_index,
                len: self.canvas.layers.len(),
            }
            .into());
        }
        let command = EditCommand::new(layer_index, description, before, &after, bounds)?;
        let dirty = command.bounds();
        self.canvas.layers[layer_index].replace_pixels(after);
        self.history.execute(command);
        self.canvas.mark_dirty(Some(dirty));
        self.is_dirty = true;
        Ok(())
    }

    /// Revert the most recent edit. Returns `Ok(false)` when there is
    /// nothing to undo. The caller re-composites for display afterwards.
    pub fn undo(&mut self) -> Result<bool, DocumentError> {
        let Some(layer_index) = self.history.next_undo_layer() else {
            return Ok(false);
        };
        let current = &self.canvas.layers[layer_index].pixels;
        match self.history.undo(current)? {
            Some(restored) => {
                self.canvas.layers[layer_index].replace_pixels(restored);
                self.canvas.mark_dirty(None);
                self.is_dirty = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Re-apply the most recently undone edit. Mirror of [`Self::undo`].
    pub fn redo(&mut self) -> Result<bool, DocumentError> {
        let Some(layer_index) = self.history.next_redo_layer() else {
            return Ok(false);
        };
        let current = &self.canvas.layers[layer_index].pixels;
        match self.history.redo(current)? {
            Some(restored) => {
                self.canvas.layers[layer_index].replace_pixels(restored);
                self.canvas.mark_dirty(None);
                self.is_dirty = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ---- layer structure ----------------------------------------------------

    /// Append a transparent layer and make it active.
    pub fn add_layer(&mut self) -> usize {
        self.is_dirty = true;
        self.canvas.add_layer()
    }

    /// Remove the active layer. History entries hold layer indices, which
    /// removal shifts, so the history is cleared rather than left pointing
    /// at the wrong layers.
    pub fn remove_active_layer(&mut self) -> Result<(), DocumentError> {
        self.canvas.remove_active_layer()?;
        self.history.clear();
        self.is_dirty = true;
        Ok(())
    }

    pub fn set_active_layer(&mut self, index: usize) -> Result<(), DocumentError> {
        self.canvas.set_active_layer(index)?;
        Ok(())
    }

    // ---- output -------------------------------------------------------------

    /// Flatten the layer stack for display or export.
    pub fn composite(&self) -> RgbaImage {
        self.canvas.composite()
    }

    // ---- background results -------------------------------------------------

    /// Commit a completed background filter job, unless the layer changed
    /// (or disappeared) while it ran. Returns whether the result was
    /// applied.
    pub fn commit_filter_result(&mut self, result: FilterResult) -> Result<bool, DocumentError> {
        let Some(layer) = self.canvas.layers.get(result.layer_index) else {
            crate::log_warn!(
                "discarding filter result '{}': layer {} no longer exists",
                result.description,
                result.layer_index
            );
            return Ok(false);
        };
        if layer.generation != result.generation {
            crate::log_warn!(
                "discarding stale filter result '{}': layer {} changed while it ran",
                result.description,
                result.layer_index
            );
            return Ok(false);
        }
        self.apply_edit(
            result.layer_index,
            result.description,
            &result.original,
            result.result,
            None,
        )?;
        Ok(true)
    }
}
