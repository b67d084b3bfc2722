//! Three-way (diff3-style) merge of a single file's content.
//!
//! Both branches are diffed independently against the common ancestor, and
//! the two sets of changes are walked side by side in base order. Where the
//! changed spans don't overlap, both land in the output; where they do,
//! identical edits are accepted and differing ones become a conflict hunk.

use crate::{ConflictStyle, ContentMergeResult, MergeOptions};
use git_diff::algorithm::{diff_edits, split_lines, Edit, EditOp};

/// Labels used in `<<<<<<<`/`|||||||`/`>>>>>>>` conflict markers.
#[derive(Debug, Clone)]
pub struct MergeLabels<'a> {
    pub base: &'a str,
    pub ours: &'a str,
    pub theirs: &'a str,
}

impl<'a> Default for MergeLabels<'a> {
    fn default() -> Self {
        Self {
            base: "base",
            ours: "ours",
            theirs: "theirs",
        }
    }
}

/// Merge `ours` and `theirs`, both derived from `base`, into one buffer.
pub fn merge_content(
    base: &[u8],
    ours: &[u8],
    theirs: &[u8],
    options: &MergeOptions,
    labels: &MergeLabels<'_>,
) -> ContentMergeResult {
    if ours == theirs {
        return ContentMergeResult::Clean(ours.to_vec());
    }
    if base == ours {
        return ContentMergeResult::Clean(theirs.to_vec());
    }
    if base == theirs {
        return ContentMergeResult::Clean(ours.to_vec());
    }

    let base_lines = split_lines(base);
    let ours_lines = split_lines(ours);
    let theirs_lines = split_lines(theirs);

    let ours_spans = diverged_spans(&diff_edits(base, ours, options.diff_algorithm));
    let theirs_spans = diverged_spans(&diff_edits(base, theirs, options.diff_algorithm));

    Interleaver {
        base_lines: &base_lines,
        ours_lines: &ours_lines,
        theirs_lines: &theirs_lines,
        style: options.conflict_style,
        labels,
        out: Vec::new(),
        conflicts: 0,
        base_cursor: 0,
    }
    .run(&ours_spans, &theirs_spans)
}

/// Where one side's edit replaced base lines `base_start..base_start+base_len`
/// with that side's lines `side_start..side_start+side_len`.
#[derive(Debug, Clone, Copy)]
struct DivergedSpan {
    base_start: usize,
    base_len: usize,
    side_start: usize,
    side_len: usize,
}

impl DivergedSpan {
    fn base_end(&self) -> usize {
        self.base_start + self.base_len
    }
}

/// Collapse a diff's edit stream into maximal runs of non-`Equal` ops.
fn diverged_spans(edits: &[Edit]) -> Vec<DivergedSpan> {
    let mut spans = Vec::new();
    let mut open: Option<DivergedSpan> = None;

    for edit in edits.iter().chain(std::iter::once(&Edit {
        op: EditOp::Equal,
        old_index: usize::MAX,
        new_index: usize::MAX,
    })) {
        if edit.op == EditOp::Equal {
            if let Some(span) = open.take() {
                spans.push(span);
            }
            continue;
        }

        let span = open.get_or_insert(DivergedSpan {
            base_start: edit.old_index,
            base_len: 0,
            side_start: edit.new_index,
            side_len: 0,
        });
        match edit.op {
            EditOp::Delete => span.base_len = edit.old_index + 1 - span.base_start,
            EditOp::Insert => span.side_len = edit.new_index + 1 - span.side_start,
            EditOp::Equal => unreachable!(),
        }
    }

    spans
}

/// Walks two sides' diverged spans in base order, emitting unchanged base
/// lines in between and resolving each non-overlapping or overlapping pair.
struct Interleaver<'a> {
    base_lines: &'a [&'a [u8]],
    ours_lines: &'a [&'a [u8]],
    theirs_lines: &'a [&'a [u8]],
    style: ConflictStyle,
    labels: &'a MergeLabels<'a>,
    out: Vec<u8>,
    conflicts: usize,
    base_cursor: usize,
}

impl<'a> Interleaver<'a> {
    fn run(mut self, ours: &[DivergedSpan], theirs: &[DivergedSpan]) -> ContentMergeResult {
        let mut oi = 0;
        let mut ti = 0;

        while oi < ours.len() || ti < theirs.len() {
            match (ours.get(oi), theirs.get(ti)) {
                (Some(o), Some(t)) if o.base_end() <= t.base_start => {
                    self.take_side(o, self.ours_lines);
                    oi += 1;
                }
                (Some(o), Some(t)) if t.base_end() <= o.base_start => {
                    self.take_side(t, self.theirs_lines);
                    ti += 1;
                }
                (Some(o), Some(t)) => {
                    self.resolve_overlap(o, t);
                    oi += 1;
                    ti += 1;
                }
                (Some(o), None) => {
                    self.take_side(o, self.ours_lines);
                    oi += 1;
                }
                (None, Some(t)) => {
                    self.take_side(t, self.theirs_lines);
                    ti += 1;
                }
                (None, None) => unreachable!(),
            }
        }

        self.fill_base_through(self.base_lines.len());

        if self.conflicts > 0 {
            ContentMergeResult::Conflict {
                content: self.out,
                conflict_count: self.conflicts,
            }
        } else {
            ContentMergeResult::Clean(self.out)
        }
    }

    /// Emit untouched base lines up through `up_to` (exclusive), then a
    /// side's replacement lines, and advance the base cursor past the span.
    fn take_side(&mut self, span: &DivergedSpan, lines: &[&[u8]]) {
        self.fill_base_through(span.base_start);
        self.emit(lines, span.side_start, span.side_len);
        self.base_cursor = span.base_end();
    }

    fn resolve_overlap(&mut self, ours: &DivergedSpan, theirs: &DivergedSpan) {
        let region_start = ours.base_start.min(theirs.base_start);
        let region_end = ours.base_end().max(theirs.base_end());
        self.fill_base_through(region_start);

        let ours_text = slice_text(self.ours_lines, ours.side_start, ours.side_len);
        let theirs_text = slice_text(self.theirs_lines, theirs.side_start, theirs.side_len);

        if ours_text == theirs_text {
            self.out.extend_from_slice(&ours_text);
        } else {
            self.conflicts += 1;
            let base_text = slice_text(self.base_lines, region_start, region_end - region_start);
            self.emit_conflict_markers(&ours_text, &theirs_text, &base_text);
        }

        self.base_cursor = region_end;
    }

    fn emit(&mut self, lines: &[&[u8]], start: usize, len: usize) {
        self.out.extend_from_slice(&slice_text(lines, start, len));
    }

    fn fill_base_through(&mut self, up_to: usize) {
        for line in &self.base_lines[self.base_cursor.min(self.base_lines.len())..up_to.min(self.base_lines.len())]
        {
            self.out.extend_from_slice(line);
        }
        self.base_cursor = up_to;
    }

    fn emit_conflict_markers(&mut self, ours: &[u8], theirs: &[u8], base: &[u8]) {
        self.out.extend_from_slice(b"<<<<<<< ");
        self.out.extend_from_slice(self.labels.ours.as_bytes());
        self.out.push(b'\n');
        self.out.extend_from_slice(ours);

        if self.style == ConflictStyle::Diff3 {
            self.out.extend_from_slice(b"||||||| ");
            self.out.extend_from_slice(self.labels.base.as_bytes());
            self.out.push(b'\n');
            self.out.extend_from_slice(base);
        }

        self.out.extend_from_slice(b"=======\n");
        self.out.extend_from_slice(theirs);

        self.out.extend_from_slice(b">>>>>>> ");
        self.out.extend_from_slice(self.labels.theirs.as_bytes());
        self.out.push(b'\n');
    }
}

/// Concatenate `len` lines starting at `start`, each with its own trailing
/// newline already attached by `split_lines` (or none, for a final partial
/// line), so the result is byte-exact with no re-insertion of separators.
fn slice_text(lines: &[&[u8]], start: usize, len: usize) -> Vec<u8> {
    let end = (start + len).min(lines.len());
    let mut buf = Vec::new();
    for line in &lines[start.min(lines.len())..end] {
        buf.extend_from_slice(line);
    }
    buf
}
