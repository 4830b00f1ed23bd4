//! Applies a batch of edits to an artifact in one pass.
//!
//! The rewritten artifact is a layered view: original spans of the input with
//! override spans laid over the edited ranges. The view is walked once, in
//! offset order, and that single walk produces the output text and, when the
//! input carries a source map, the adjusted mappings.
//!
//! Mapping rules during the walk:
//! - a mapping that sat inside an original span moves with its text;
//! - an override gets one mapping at its start, copied from the mapping that
//!   covered the edit's start offset in the input;
//! - where original text resumes after an override, the mapping covering the
//!   resume offset is repeated so the tail stays attributed.

use crate::artifact::TextArtifact;
use crate::edit::{normalize, Edit, EditError};
use crate::sourcemap::{LineIndex, Mapping, OriginalLocation, Position, SourceMap, SourceMapError};
use std::ops::Range;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error(transparent)]
    Edit(#[from] EditError),

    #[error("cannot adjust source map: {0}")]
    SourceMap(#[from] SourceMapError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'e> {
    Original(Range<usize>),
    Override { at: Range<usize>, text: &'e str },
}

/// Layer normalized edits over `[0, text_len)`.
fn segments(text_len: usize, edits: &[Edit]) -> Vec<Segment<'_>> {
    let mut out = Vec::with_capacity(edits.len() * 2 + 1);
    let mut cursor = 0;
    for edit in edits {
        if edit.start > cursor {
            out.push(Segment::Original(cursor..edit.start));
        }
        out.push(Segment::Override {
            at: edit.start..edit.end,
            text: &edit.replacement,
        });
        cursor = edit.end;
    }
    if cursor < text_len {
        out.push(Segment::Original(cursor..text_len));
    }
    out
}

/// An input mapping pinned to the byte offset it starts at.
#[derive(Debug, Clone, Copy)]
struct Anchor {
    offset: usize,
    line: u32,
    original: Option<OriginalLocation>,
}

/// Mapping side of the walk.
struct MappingWalk<'t> {
    index: LineIndex<'t>,
    anchors: Vec<Anchor>,
    next: usize,
    emitted: Vec<Mapping>,
}

impl<'t> MappingWalk<'t> {
    fn new(text: &'t str, map: &SourceMap) -> Result<Self, SourceMapError> {
        let index = LineIndex::new(text);
        let mut anchors = Vec::new();
        for mapping in map.decode_mappings()? {
            let position = Position {
                line: mapping.generated_line,
                column: mapping.generated_column,
            };
            match index.offset_of(position) {
                Some(offset) => anchors.push(Anchor {
                    offset,
                    line: mapping.generated_line,
                    original: mapping.original,
                }),
                None => log::debug!(
                    "dropping mapping for generated line {} past end of text",
                    mapping.generated_line
                ),
            }
        }
        anchors.sort_by_key(|anchor| anchor.offset);

        Ok(Self {
            index,
            anchors,
            next: 0,
            emitted: Vec::new(),
        })
    }

    /// The input mapping in effect at `offset`: the last one at or before it
    /// on the same generated line.
    fn covering(&self, offset: usize) -> Option<Anchor> {
        let after = self.anchors.partition_point(|a| a.offset <= offset);
        let anchor = *self.anchors.get(after.checked_sub(1)?)?;
        (anchor.line == self.index.line_of(offset)).then_some(anchor)
    }

    fn has_anchor_at(&self, offset: usize) -> bool {
        self.anchors
            .binary_search_by_key(&offset, |a| a.offset)
            .is_ok()
    }

    fn emit(&mut self, at: Position, original: Option<OriginalLocation>) {
        let mapping = Mapping {
            generated_line: at.line,
            generated_column: at.column,
            original,
        };
        match self.emitted.last_mut() {
            Some(last)
                if last.generated_line == at.line && last.generated_column == at.column =>
            {
                *last = mapping;
            }
            _ => self.emitted.push(mapping),
        }
    }

    fn last_on_line_is_mapped(&self, line: u32) -> bool {
        self.emitted
            .last()
            .is_some_and(|m| m.generated_line == line && m.original.is_some())
    }

    /// Re-establish attribution where original text resumes after an override.
    fn resume(&mut self, offset: usize, at: Position) {
        if self.has_anchor_at(offset) {
            return;
        }
        match self.covering(offset) {
            Some(anchor) => self.emit(at, anchor.original),
            None if self.last_on_line_is_mapped(at.line) => self.emit(at, None),
            None => {}
        }
    }
}

/// Realizes edit batches against artifacts.
#[derive(Debug, Clone, Copy)]
pub struct RangeRewriter {
    source_maps: bool,
}

impl Default for RangeRewriter {
    fn default() -> Self {
        Self { source_maps: true }
    }
}

impl RangeRewriter {
    pub fn new(source_maps: bool) -> Self {
        Self { source_maps }
    }

    pub fn source_maps(&self) -> bool {
        self.source_maps
    }

    /// Apply `edits` to `artifact`, producing a new artifact.
    ///
    /// The output carries a source map only when the input has one and map
    /// handling is enabled.
    pub fn rewrite(
        &self,
        artifact: &TextArtifact,
        edits: Vec<Edit>,
    ) -> Result<TextArtifact, RewriteError> {
        let text = artifact.text.as_str();
        let edits = normalize(edits, text)?;

        let mut walk = match (&artifact.source_map, self.source_maps) {
            (Some(map), true) => Some(MappingWalk::new(text, map)?),
            _ => None,
        };

        let growth: usize = edits.iter().map(|e| e.replacement.len()).sum();
        let mut out = String::with_capacity(text.len() + growth);
        let mut position = Position::default();
        let mut after_override = false;

        for segment in segments(text.len(), &edits) {
            match segment {
                Segment::Original(range) => {
                    let Some(walk) = walk.as_mut() else {
                        out.push_str(&text[range]);
                        continue;
                    };

                    if after_override {
                        walk.resume(range.start, position);
                    }

                    let mut copied = range.start;
                    while let Some(anchor) = walk.anchors.get(walk.next).copied() {
                        if anchor.offset >= range.end {
                            break;
                        }
                        walk.next += 1;
                        // Anchors below the span sat inside an override.
                        if anchor.offset < range.start {
                            continue;
                        }
                        let chunk = &text[copied..anchor.offset];
                        out.push_str(chunk);
                        position.advance(chunk);
                        copied = anchor.offset;
                        walk.emit(position, anchor.original);
                    }

                    let tail = &text[copied..range.end];
                    out.push_str(tail);
                    position.advance(tail);
                    after_override = false;
                }
                Segment::Override { at, text: replacement } => {
                    if let Some(walk) = walk.as_mut() {
                        if let Some(anchor) = walk.covering(at.start) {
                            walk.emit(position, anchor.original);
                        }
                        position.advance(replacement);
                    }
                    out.push_str(replacement);
                    after_override = true;
                }
            }
        }

        let source_map = match (walk, &artifact.source_map) {
            (Some(walk), Some(map)) => Some(map.with_mappings(&walk.emitted)),
            _ => None,
        };

        Ok(TextArtifact {
            text: out,
            source_map,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sourcemap::decode_mappings;

    fn map(mappings: &str) -> SourceMap {
        SourceMap {
            version: 3,
            file: Some("out.js".to_string()),
            source_root: None,
            sources: vec![Some("in.js".to_string())],
            sources_content: None,
            names: Vec::new(),
            mappings: mappings.to_string(),
        }
    }

    /// (generated line, generated column, original line, original column)
    fn table(artifact: &TextArtifact) -> Vec<(u32, u32, Option<(u32, u32)>)> {
        let map = artifact.source_map.as_ref().expect("source map");
        decode_mappings(&map.mappings)
            .unwrap()
            .into_iter()
            .map(|m| {
                (
                    m.generated_line,
                    m.generated_column,
                    m.original.map(|o| (o.line, o.column)),
                )
            })
            .collect()
    }

    #[test]
    fn test_segments_cover_text() {
        let edits = vec![Edit::new(2, 4, "X"), Edit::new(6, 6, "Y")];
        let segs = segments(8, &edits);
        assert_eq!(
            segs,
            vec![
                Segment::Original(0..2),
                Segment::Override { at: 2..4, text: "X" },
                Segment::Original(4..6),
                Segment::Override { at: 6..6, text: "Y" },
                Segment::Original(6..8),
            ]
        );
    }

    #[test]
    fn test_plain_splice() {
        let artifact = TextArtifact::new("VERSION=dev; MODE=dev");
        let edits = vec![Edit::new(18, 21, "prod"), Edit::new(8, 11, "1.2.3")];
        let out = RangeRewriter::new(false).rewrite(&artifact, edits).unwrap();
        assert_eq!(out.text, "VERSION=1.2.3; MODE=prod");
        assert!(out.source_map.is_none());
    }

    #[test]
    fn test_no_edits_copies_text() {
        let artifact = TextArtifact::new("unchanged");
        let out = RangeRewriter::default().rewrite(&artifact, Vec::new()).unwrap();
        assert_eq!(out, artifact);
    }

    #[test]
    fn test_overlap_is_rejected() {
        let artifact = TextArtifact::new("0123456789");
        let edits = vec![Edit::new(0, 5, "a"), Edit::new(3, 8, "b")];
        let result = RangeRewriter::default().rewrite(&artifact, edits);
        assert!(matches!(
            result,
            Err(RewriteError::Edit(EditError::OverlappingEdits { .. }))
        ));
    }

    #[test]
    fn test_end_past_text_is_clamped() {
        let artifact = TextArtifact::new("abc");
        let out = RangeRewriter::default()
            .rewrite(&artifact, vec![Edit::new(1, 99, "Z")])
            .unwrap();
        assert_eq!(out.text, "aZ");
    }

    #[test]
    fn test_disabled_maps_drop_map() {
        let artifact = TextArtifact::with_source_map("abc", map("AAAA"));
        let out = RangeRewriter::new(false)
            .rewrite(&artifact, vec![Edit::new(0, 1, "x")])
            .unwrap();
        assert_eq!(out.text, "xbc");
        assert!(out.source_map.is_none());
    }

    #[test]
    fn test_mappings_after_edit_shift() {
        // `var a = dev;` with mappings at columns 0, 4 and 8
        let artifact = TextArtifact::with_source_map("var a = dev;", map("AAAA,IAAI,IAAI"));
        let out = RangeRewriter::default()
            .rewrite(&artifact, vec![Edit::new(8, 11, "\"1.2.3\"")])
            .unwrap();
        assert_eq!(out.text, "var a = \"1.2.3\";");
        assert_eq!(
            table(&out),
            vec![
                (0, 0, Some((0, 0))),
                (0, 4, Some((0, 4))),
                (0, 8, Some((0, 8))),
                (0, 15, Some((0, 8))),
            ]
        );
    }

    #[test]
    fn test_mapping_shift_on_later_lines() {
        let artifact =
            TextArtifact::with_source_map("a = dev;\nb = 1;", map("AAAA,IAAI;AACJ,IAAI"));
        let out = RangeRewriter::default()
            .rewrite(&artifact, vec![Edit::new(4, 7, "x\ny")])
            .unwrap();
        assert_eq!(out.text, "a = x\ny;\nb = 1;");
        assert_eq!(
            table(&out),
            vec![
                (0, 0, Some((0, 0))),
                (0, 4, Some((0, 4))),
                (1, 1, Some((0, 4))),
                (2, 0, Some((1, 0))),
                (2, 4, Some((1, 4))),
            ]
        );
    }

    #[test]
    fn test_override_inherits_covering_mapping() {
        // single mapping at column 0 covers the whole line
        let artifact = TextArtifact::with_source_map("foo(dev)", map("AAAA"));
        let out = RangeRewriter::default()
            .rewrite(&artifact, vec![Edit::new(4, 7, "production")])
            .unwrap();
        assert_eq!(out.text, "foo(production)");
        assert_eq!(
            table(&out),
            vec![
                (0, 0, Some((0, 0))),
                (0, 4, Some((0, 0))),
                (0, 14, Some((0, 0))),
            ]
        );
    }

    #[test]
    fn test_mappings_inside_edit_are_dropped() {
        let artifact = TextArtifact::with_source_map("abcdef", map("AAAA,EAAE,EAAE"));
        let out = RangeRewriter::default()
            .rewrite(&artifact, vec![Edit::new(1, 5, "")])
            .unwrap();
        assert_eq!(out.text, "af");
        // columns 2 and 4 were inside the removed range; column 5 resumes with
        // the mapping that covered it (original column 4)
        assert_eq!(table(&out), vec![(0, 0, Some((0, 0))), (0, 1, Some((0, 4)))]);
    }

    #[test]
    fn test_insertion_keeps_anchor_at_offset() {
        let artifact = TextArtifact::with_source_map("ab", map("AAAA,CAAC"));
        let out = RangeRewriter::default()
            .rewrite(&artifact, vec![Edit::new(1, 1, "++")])
            .unwrap();
        assert_eq!(out.text, "a++b");
        assert_eq!(
            table(&out),
            vec![
                (0, 0, Some((0, 0))),
                (0, 1, Some((0, 1))),
                (0, 3, Some((0, 1))),
            ]
        );
    }

    #[test]
    fn test_unmapped_resume_ends_override_attribution() {
        // the edit swallows the newline, so the resumed text came from a line
        // whose start had no mapping; the override's attribution must stop
        let artifact = TextArtifact::with_source_map("a\nbcd", map("AAAA;EAAE"));
        let out = RangeRewriter::default()
            .rewrite(&artifact, vec![Edit::new(1, 3, "X")])
            .unwrap();
        assert_eq!(out.text, "aXcd");
        assert_eq!(
            table(&out),
            vec![
                (0, 0, Some((0, 0))),
                (0, 1, Some((0, 0))),
                (0, 2, None),
                (0, 3, Some((0, 2))),
            ]
        );
    }

    #[test]
    fn test_columns_count_utf16_units() {
        // the emoji is two UTF-16 units wide
        let artifact = TextArtifact::with_source_map("😀=dev", map("AAAA,EAAE,CAAC"));
        let out = RangeRewriter::default()
            .rewrite(&artifact, vec![Edit::new(0, 4, "é")])
            .unwrap();
        assert_eq!(out.text, "é=dev");
        assert_eq!(
            table(&out),
            vec![
                (0, 0, Some((0, 0))),
                (0, 1, Some((0, 2))),
                (0, 2, Some((0, 3))),
            ]
        );
    }

    #[test]
    fn test_output_is_deterministic() {
        let artifact = TextArtifact::with_source_map("x = dev + dev", map("AAAA,IAAI,MAAM"));
        let edits = || vec![Edit::new(4, 7, "p"), Edit::new(10, 13, "q")];
        let first = RangeRewriter::default().rewrite(&artifact, edits()).unwrap();
        let second = RangeRewriter::default().rewrite(&artifact, edits()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_map_is_reported() {
        let artifact = TextArtifact::with_source_map("abc", map("A*"));
        let result = RangeRewriter::default().rewrite(&artifact, vec![Edit::new(0, 1, "x")]);
        assert!(matches!(result, Err(RewriteError::SourceMap(_))));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// Non-overlapping edits laid out left to right over `text`.
        fn layout(text: &str, plan: &[(usize, usize, String)]) -> Vec<Edit> {
            let mut edits = Vec::new();
            let mut cursor = 0;
            for (gap, len, replacement) in plan {
                let start = cursor + gap;
                let end = start + len;
                if end > text.len() {
                    break;
                }
                edits.push(Edit::new(start, end, replacement.clone()));
                cursor = end;
            }
            edits
        }

        proptest! {
            #[test]
            fn output_length_accounts_for_every_edit(
                text in "[a-z \\n]{0,80}",
                plan in prop::collection::vec((0usize..8, 0usize..6, "[A-Z]{0,5}"), 0..10),
            ) {
                let edits = layout(&text, &plan);
                let removed: usize = edits.iter().map(Edit::removed_len).sum();
                let added: usize = edits.iter().map(|e| e.replacement.len()).sum();

                let out = RangeRewriter::new(false)
                    .rewrite(&TextArtifact::new(text.clone()), edits)
                    .unwrap();
                prop_assert_eq!(out.text.len(), text.len() - removed + added);
            }

            #[test]
            fn edit_order_does_not_change_output(
                text in "[a-z \\n]{0,80}",
                plan in prop::collection::vec((0usize..8, 0usize..6, "[A-Z]{0,5}"), 0..10),
            ) {
                let edits = layout(&text, &plan);
                let mut reversed = edits.clone();
                reversed.reverse();

                let artifact = TextArtifact::with_source_map(text.clone(), map("AAAA,CAAC"));
                let forward = RangeRewriter::default().rewrite(&artifact, edits).unwrap();
                let backward = RangeRewriter::default().rewrite(&artifact, reversed).unwrap();
                prop_assert_eq!(forward, backward);
            }
        }
    }
}
