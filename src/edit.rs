use thiserror::Error;

/// The fundamental edit primitive: byte-span replacement against the original
/// text of one artifact.
///
/// Offsets always refer to the unedited text. A batch of edits is realized in
/// one pass by the rewriter, so the order edits were produced in does not
/// matter as long as no two of them intersect.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Edit does nothing until handed to a RangeRewriter"]
pub struct Edit {
    /// Starting byte offset (inclusive)
    pub start: usize,
    /// Ending byte offset (exclusive)
    pub end: usize,
    /// Text that replaces [start, end)
    pub replacement: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error("Overlapping edits: [{first_start}, {first_end}) intersects [{second_start}, {second_end})")]
    OverlappingEdits {
        first_start: usize,
        first_end: usize,
        second_start: usize,
        second_end: usize,
    },

    #[error("Invalid byte range: [{start}, {end}) in text of length {text_len}")]
    InvalidByteRange {
        start: usize,
        end: usize,
        text_len: usize,
    },

    #[error("Edit offset {offset} is not on a UTF-8 character boundary")]
    NotCharBoundary { offset: usize },
}

impl Edit {
    pub fn new(start: usize, end: usize, replacement: impl Into<String>) -> Self {
        Self {
            start,
            end,
            replacement: replacement.into(),
        }
    }

    /// Number of original bytes this edit removes.
    pub fn removed_len(&self) -> usize {
        self.end - self.start
    }

    /// Whether this edit's span intersects `other`'s.
    ///
    /// Touching spans do not intersect, and an insertion only intersects a
    /// span that strictly contains its offset.
    pub fn overlaps(&self, other: &Edit) -> bool {
        let (first, second) = if (self.start, self.end) <= (other.start, other.end) {
            (self, other)
        } else {
            (other, self)
        };
        first.end > second.start
    }

    fn validate(&self, text: &str) -> Result<(), EditError> {
        if self.start > self.end {
            return Err(EditError::InvalidByteRange {
                start: self.start,
                end: self.end,
                text_len: text.len(),
            });
        }
        for offset in [self.start, self.end] {
            if !text.is_char_boundary(offset) {
                return Err(EditError::NotCharBoundary { offset });
            }
        }
        Ok(())
    }
}

/// Prepare a batch of edits for a single pass over `text`.
///
/// End offsets past the text are clamped with a warning. The result is sorted
/// by `(start, end)`, ties between insertions broken by replacement text, and
/// guaranteed free of intersections.
pub fn normalize(mut edits: Vec<Edit>, text: &str) -> Result<Vec<Edit>, EditError> {
    let text_len = text.len();

    for edit in &mut edits {
        if edit.end > text_len {
            log::warn!(
                "edit [{}, {}) ends past text of length {}; clamping",
                edit.start,
                edit.end,
                text_len
            );
            edit.end = text_len;
        }
        edit.validate(text)?;
    }

    edits.sort_by(|a, b| {
        (a.start, a.end, &a.replacement).cmp(&(b.start, b.end, &b.replacement))
    });

    for window in edits.windows(2) {
        let (earlier, later) = (&window[0], &window[1]);
        if earlier.end > later.start {
            return Err(EditError::OverlappingEdits {
                first_start: earlier.start,
                first_end: earlier.end,
                second_start: later.start,
                second_end: later.end,
            });
        }
    }

    Ok(edits)
}
