//! Bridge between the local drawing surface and the controller.
//!
//! The surface reports when a tool stroke ends and when its drawing changes.
//! Only a change that follows a finished tool stroke and grows the drawing
//! counts as a new stroke; everything else (recoloring, selection, remote
//! updates being rendered) is ignored here.
//!
//! Undo removes the last stroke and broadcasts `Erase`. Redo puts the stroke
//! back locally only: peers are not told about it.

use crate::controller::SyncController;
use crate::stroke::Stroke;

/// Maximum number of undo entries to keep.
const MAX_UNDO_HISTORY: usize = 50;

/// Turns local surface edits into controller calls.
#[derive(Debug, Default)]
pub struct LocalEditBridge {
    /// Set by [`LocalEditBridge::tool_ended`], consumed by the next change.
    stroke_pending: bool,
    /// Number of committed strokes that can still be undone.
    undo_depth: usize,
    /// Strokes removed by undo, most recent last.
    redo_stack: Vec<Stroke>,
}

impl LocalEditBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// The user lifted the pen; the next drawing change carries a stroke.
    pub fn tool_ended(&mut self) {
        self.stroke_pending = true;
    }

    /// The surface drawing changed. Commits the surface's newest stroke when
    /// the change completes a tool stroke. Returns whether a stroke was
    /// committed.
    pub fn drawing_changed(&mut self, controller: &mut SyncController, surface: &[Stroke]) -> bool {
        if !std::mem::take(&mut self.stroke_pending) {
            return false;
        }

        if surface.len() <= controller.drawing().stroke_count() {
            log::debug!("Tool ended without adding a stroke");
            return false;
        }

        match surface.last() {
            Some(stroke) => {
                self.commit(controller, stroke.clone());
                true
            }
            None => false,
        }
    }

    /// Commit a finished stroke handed over directly by the surface.
    pub fn stroke_completed(&mut self, controller: &mut SyncController, stroke: Stroke) {
        self.stroke_pending = false;
        self.commit(controller, stroke);
    }

    fn commit(&mut self, controller: &mut SyncController, stroke: Stroke) {
        controller.commit_local_stroke(stroke);

        self.undo_depth = (self.undo_depth + 1).min(MAX_UNDO_HISTORY);
        // New strokes invalidate redo history
        self.redo_stack.clear();
    }

    /// Check if undo is available.
    pub fn can_undo(&self) -> bool {
        self.undo_depth > 0
    }

    /// Check if redo is available.
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Remove the last stroke and broadcast `Erase`.
    /// Returns true if undo was performed, false if nothing to undo.
    pub fn undo(&mut self, controller: &mut SyncController) -> bool {
        if !self.can_undo() {
            return false;
        }
        self.undo_depth -= 1;

        if let Some(stroke) = controller.erase_last_local() {
            self.redo_stack.push(stroke);
        }
        true
    }

    /// Re-add the last undone stroke. Not synchronized.
    /// Returns true if redo was performed, false if nothing to redo.
    pub fn redo(&mut self, controller: &mut SyncController) -> bool {
        let Some(stroke) = self.redo_stack.pop() else {
            return false;
        };

        controller.restore_local_stroke(stroke);
        self.undo_depth = (self.undo_depth + 1).min(MAX_UNDO_HISTORY);
        true
    }

    /// Clear the drawing, broadcast `Clear`, and forget undo/redo history.
    pub fn clear(&mut self, controller: &mut SyncController) {
        controller.clear_local();
        self.reset();
    }

    /// Forget all pending state and history.
    pub fn reset(&mut self) {
        self.stroke_pending = false;
        self.undo_depth = 0;
        self.redo_stack.clear();
    }
}
