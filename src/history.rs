//! Undo/redo history: compressed before/after patches per edit, bounded
//! double stack.

use image::{RgbaImage, imageops};
use std::collections::VecDeque;

use crate::canvas::Bounds;
use crate::codec::{self, CodecError};

/// Depth of the undo log. The oldest entry is evicted when a new edit would
/// exceed it.
pub const MAX_HISTORY: usize = 50;

// ============================================================================
// EDIT COMMAND — one reversible edit against one layer
// ============================================================================

/// Immutable record of a single edit: which layer, which region, and the
/// compressed pixels of that region before and after.
///
/// Construction crops both full-layer rasters down to `bounds`, so the
/// stored cost is proportional to the edited region, not the canvas — a
/// small brush stroke on a large image stays cheap even hundreds of strokes
/// deep.
pub struct EditCommand {
    layer_index: usize,
    description: String,
    bounds: Bounds,
    before: Vec<u8>,
    after: Vec<u8>,
}

impl EditCommand {
    /// `bounds` restricts the captured region; `None` (or a degenerate
    /// rectangle) captures the full raster extent. The rectangle is clamped
    /// to the raster.
    pub fn new(
        layer_index: usize,
        description: String,
        before: &RgbaImage,
        after: &RgbaImage,
        bounds: Option<Bounds>,
    ) -> Result<Self, CodecError> {
        let (w, h) = before.dimensions();
        let bounds = bounds
            .map(|b| b.clamp_to(w, h))
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| Bounds::full(w, h));

        let before_patch = imageops::crop_imm(before, bounds.x, bounds.y, bounds.w, bounds.h).to_image();
        let after_patch = imageops::crop_imm(after, bounds.x, bounds.y, bounds.w, bounds.h).to_image();

        Ok(Self {
            layer_index,
            description,
            bounds,
            before: codec::encode_patch(&before_patch)?,
            after: codec::encode_patch(&after_patch)?,
        })
    }

    pub fn layer_index(&self) -> usize {
        self.layer_index
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Compressed footprint of this entry in bytes.
    pub fn memory_size(&self) -> usize {
        self.before.len() + self.after.len() + self.description.len()
    }

    /// Paste the "before" patch into a copy of `target`, returning the
    /// restored raster. Pixels outside [`Self::bounds`] are untouched.
    /// Replays a fixed patch, so applying it twice gives the same result.
    pub fn apply_undo(&self, target: &RgbaImage) -> Result<RgbaImage, CodecError> {
        self.apply(target, &self.before)
    }

    /// Symmetric to [`Self::apply_undo`], using the "after" patch.
    pub fn apply_redo(&self, target: &RgbaImage) -> Result<RgbaImage, CodecError> {
        self.apply(target, &self.after)
    }

    fn apply(&self, target: &RgbaImage, patch_bytes: &[u8]) -> Result<RgbaImage, CodecError> {
        let patch = codec::decode_patch(patch_bytes)?;
        let mut out = target.clone();
        imageops::replace(&mut out, &patch, self.bounds.x as i64, self.bounds.y as i64);
        Ok(out)
    }

    #[cfg(test)]
    fn corrupt_for_test(&mut self) {
        self.before = vec![0xde, 0xad];
        self.after = vec![0xbe, 0xef];
    }
}

// ============================================================================
// HISTORY MANAGER — bounded undo/redo stacks
// ============================================================================

/// Undo/redo stacks of [`EditCommand`]s.
///
/// The manager never touches a layer itself: `undo`/`redo` hand back a
/// patched copy of the raster they are given, and the caller decides whether
/// to commit it. A failed patch decode leaves both stacks exactly as they
/// were.
pub struct HistoryManager {
    undo_stack: VecDeque<EditCommand>,
    redo_stack: VecDeque<EditCommand>,
    max_history: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(MAX_HISTORY)
    }
}

impl HistoryManager {
    pub fn new(max_history: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_history,
        }
    }

    /// Record a freshly-applied edit. Clears the redo stack — a new edit
    /// invalidates any undone branch — and evicts the oldest entry beyond
    /// the capacity. The caller has already mutated the layer; this only
    /// touches the logs.
    pub fn execute(&mut self, command: EditCommand) {
        self.redo_stack.clear();
        self.undo_stack.push_back(command);
        while self.undo_stack.len() > self.max_history {
            self.undo_stack.pop_front();
        }
    }

    /// Revert the most recent edit. `current` must be the present raster of
    /// the layer reported by [`Self::next_undo_layer`]; the caller writes
    /// the returned raster back and re-composites. Returns `Ok(None)` when
    /// there is nothing to undo.
    pub fn undo(&mut self, current: &RgbaImage) -> Result<Option<RgbaImage>, CodecError> {
        // Decode before rotating the stacks so a corrupt patch leaves them
        // untouched.
        let restored = match self.undo_stack.back() {
            Some(command) => command.apply_undo(current)?,
            None => return Ok(None),
        };
        if let Some(command) = self.undo_stack.pop_back() {
            self.redo_stack.push_back(command);
        }
        Ok(Some(restored))
    }

    /// Re-apply the most recently undone edit. Mirror image of
    /// [`Self::undo`].
    pub fn redo(&mut self, current: &RgbaImage) -> Result<Option<RgbaImage>, CodecError> {
        let restored = match self.redo_stack.back() {
            Some(command) => command.apply_redo(current)?,
            None => return Ok(None),
        };
        if let Some(command) = self.redo_stack.pop_back() {
            self.undo_stack.push_back(command);
        }
        Ok(Some(restored))
    }

    /// Layer the next `undo` will target, if any.
    pub fn next_undo_layer(&self) -> Option<usize> {
        self.undo_stack.back().map(|c| c.layer_index())
    }

    /// Layer the next `redo` will target, if any.
    pub fn next_redo_layer(&self) -> Option<usize> {
        self.redo_stack.back().map(|c| c.layer_index())
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.back().map(|c| c.description())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.back().map(|c| c.description())
    }

    /// All undoable entry labels, most recent first.
    pub fn undo_history(&self) -> Vec<&str> {
        self.undo_stack.iter().rev().map(|c| c.description()).collect()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Compressed footprint of both stacks in bytes (walks the entries).
    pub fn memory_usage(&self) -> usize {
        self.undo_stack
            .iter()
            .chain(self.redo_stack.iter())
            .map(|c| c.memory_size())
            .sum()
    }

    /// Empty both stacks (new document / document close).
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}
