//! The shared text buffer owned by a room.
//!
//! Operation positions count UTF-16 code units, matching the string
//! semantics editor clients compute positions in. The buffer therefore
//! stores code units directly so positional insert/delete are plain
//! splices, and renders to a `String` only when a snapshot goes on the
//! wire.

/// Errors from positional edits. Rooms validate before applying, so these
/// only surface if an operation races past validation; the buffer is left
/// unchanged in that case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentError {
    OutOfBounds { position: usize, length: usize },
}

impl std::fmt::Display for DocumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentError::OutOfBounds { position, length } => {
                write!(f, "Edit out of bounds: position {position}, length {length}")
            }
        }
    }
}

impl std::error::Error for DocumentError {}

/// A mutable sequence of UTF-16 code units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    units: Vec<u16>,
}

impl Document {
    pub fn new(text: &str) -> Self {
        Self {
            units: text.encode_utf16().collect(),
        }
    }

    /// Length in UTF-16 code units, the unit operation positions index.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Insert `content` before `position`. `position == len()` appends.
    pub fn insert(&mut self, position: usize, content: &str) -> Result<(), DocumentError> {
        if position > self.units.len() {
            return Err(DocumentError::OutOfBounds {
                position,
                length: 0,
            });
        }
        self.units
            .splice(position..position, content.encode_utf16());
        Ok(())
    }

    /// Remove `length` code units starting at `position`.
    pub fn delete(&mut self, position: usize, length: usize) -> Result<(), DocumentError> {
        let end = position.checked_add(length).ok_or(DocumentError::OutOfBounds {
            position,
            length,
        })?;
        if end > self.units.len() {
            return Err(DocumentError::OutOfBounds { position, length });
        }
        self.units.drain(position..end);
        Ok(())
    }

    /// Snapshot as a `String` for the wire. Unpaired surrogates (only
    /// producible by a delete that splits a surrogate pair) render as the
    /// replacement character.
    pub fn text(&self) -> String {
        String::from_utf16_lossy(&self.units)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new("")
    }
}
