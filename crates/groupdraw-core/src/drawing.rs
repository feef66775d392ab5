//! Drawing document: one peer's ordered stroke history.

use serde::{Deserialize, Serialize};

use crate::stroke::Stroke;

/// An ordered sequence of strokes; insertion order is drawing order.
///
/// Drawings are never merged stroke by stroke. They change by appending a
/// single stroke, removing the last one, or being replaced wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Drawing {
    strokes: Vec<Stroke>,
}

impl Drawing {
    /// Create an empty drawing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a drawing from existing strokes.
    pub fn from_strokes(strokes: Vec<Stroke>) -> Self {
        Self { strokes }
    }

    /// Append a stroke to the end of the sequence.
    pub fn append(&mut self, stroke: Stroke) {
        self.strokes.push(stroke);
    }

    /// Remove the most recent stroke. No-op on an empty drawing.
    pub fn remove_last(&mut self) -> Option<Stroke> {
        self.strokes.pop()
    }

    /// Replace the whole sequence with another drawing's.
    pub fn replace(&mut self, other: Drawing) {
        self.strokes = other.strokes;
    }

    /// Reset to an empty drawing.
    pub fn clear(&mut self) {
        self.strokes.clear();
    }

    pub fn stroke_count(&self) -> usize {
        self.strokes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn last_stroke(&self) -> Option<&Stroke> {
        self.strokes.last()
    }

    /// Immutable copy for sending.
    pub fn snapshot(&self) -> Drawing {
        self.clone()
    }

    /// A drawing holding only this drawing's last stroke, if any.
    pub fn with_last_stroke(&self) -> Option<Drawing> {
        self.last_stroke()
            .map(|stroke| Drawing::from_strokes(vec![stroke.clone()]))
    }
}
