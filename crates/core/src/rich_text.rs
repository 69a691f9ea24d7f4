//! Styled text runs and their reconciliation against plain text
//!
//! The editable surface's plain text is the source of truth. Runs are patched
//! from it with a prefix/suffix diff so that only the changed middle segment is
//! spliced, keeping style boundaries elsewhere intact. All offsets are in
//! `char`s, never bytes.
//!
//! Invariants after every public operation:
//! - concatenated run text equals the plain text
//! - no run is empty
//! - no two adjacent runs share a style

use crate::annotation::Color;
use serde::{Deserialize, Serialize};
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    #[default]
    Normal,
    Bold,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Visual style shared by every character of a run
///
/// `font_size` is in pixels while a box is being edited and a fraction of
/// page height once stored in an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    pub color: Color,
    pub font_size: f64,
    #[serde(default)]
    pub font_weight: FontWeight,
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub underline: bool,
}

impl TextStyle {
    pub fn new(color: Color, font_size: f64) -> Self {
        Self {
            color,
            font_size,
            font_weight: FontWeight::Normal,
            italic: false,
            underline: false,
        }
    }

    pub fn is_bold(&self) -> bool {
        self.font_weight == FontWeight::Bold
    }

    /// Same style with the font size multiplied by `factor`
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            font_size: self.font_size * factor,
            ..*self
        }
    }
}

/// Contiguous text sharing one style
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    #[serde(flatten)]
    pub style: TextStyle,
}

impl TextRun {
    pub fn new(text: impl Into<String>, style: TextStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }

    fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Partial style change applied to a character range
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StylePatch {
    pub color: Option<Color>,
    pub font_size: Option<f64>,
    pub font_weight: Option<FontWeight>,
    pub italic: Option<bool>,
    pub underline: Option<bool>,
}

impl StylePatch {
    pub fn bold(on: bool) -> Self {
        Self {
            font_weight: Some(if on { FontWeight::Bold } else { FontWeight::Normal }),
            ..Self::default()
        }
    }

    pub fn italic(on: bool) -> Self {
        Self {
            italic: Some(on),
            ..Self::default()
        }
    }

    pub fn underline(on: bool) -> Self {
        Self {
            underline: Some(on),
            ..Self::default()
        }
    }

    pub fn color(color: Color) -> Self {
        Self {
            color: Some(color),
            ..Self::default()
        }
    }

    pub fn font_size(size: f64) -> Self {
        Self {
            font_size: Some(size),
            ..Self::default()
        }
    }

    pub fn apply(&self, style: &TextStyle) -> TextStyle {
        TextStyle {
            color: self.color.unwrap_or(style.color),
            font_size: self.font_size.unwrap_or(style.font_size),
            font_weight: self.font_weight.unwrap_or(style.font_weight),
            italic: self.italic.unwrap_or(style.italic),
            underline: self.underline.unwrap_or(style.underline),
        }
    }
}

/// The changed middle segment between two texts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDiff {
    /// Char offset where old and new first differ
    pub start: usize,
    /// Chars removed from the old text at `start`
    pub removed: usize,
    /// Text inserted at `start`
    pub inserted: String,
}

/// Common-prefix/common-suffix diff; `None` when the texts are equal
pub fn diff_texts(old: &str, new: &str) -> Option<TextDiff> {
    if old == new {
        return None;
    }
    let old_chars: Vec<char> = old.chars().collect();
    let new_chars: Vec<char> = new.chars().collect();

    let prefix = old_chars
        .iter()
        .zip(new_chars.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let max_suffix = old_chars.len().min(new_chars.len()) - prefix;
    let suffix = old_chars
        .iter()
        .rev()
        .zip(new_chars.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    Some(TextDiff {
        start: prefix,
        removed: old_chars.len() - prefix - suffix,
        inserted: new_chars[prefix..new_chars.len() - suffix].iter().collect(),
    })
}

pub fn plain_text(runs: &[TextRun]) -> String {
    runs.iter().map(|r| r.text.as_str()).collect()
}

pub fn char_len(runs: &[TextRun]) -> usize {
    runs.iter().map(TextRun::char_len).sum()
}

/// Drop empty runs and merge neighbours with identical style
pub fn normalize_runs(runs: Vec<TextRun>) -> Vec<TextRun> {
    let mut out: Vec<TextRun> = Vec::with_capacity(runs.len());
    for run in runs {
        if run.text.is_empty() {
            continue;
        }
        match out.last_mut() {
            Some(last) if last.style == run.style => last.text.push_str(&run.text),
            _ => out.push(run),
        }
    }
    out
}

/// Style that text inserted at `offset` inherits
///
/// The character before the caret wins; at the very start the first run's
/// style is used.
pub fn style_at(runs: &[TextRun], offset: usize) -> Option<TextStyle> {
    if offset == 0 {
        return runs.first().map(|r| r.style);
    }
    let mut pos = 0;
    for run in runs {
        let len = run.char_len();
        if offset <= pos + len {
            return Some(run.style);
        }
        pos += len;
    }
    runs.last().map(|r| r.style)
}

/// Ensure a run boundary exists at `offset`
fn split_at(runs: Vec<TextRun>, offset: usize) -> Vec<TextRun> {
    let mut out = Vec::with_capacity(runs.len() + 1);
    let mut pos = 0;
    for run in runs {
        let len = run.char_len();
        if offset > pos && offset < pos + len {
            let cut = byte_index(&run.text, offset - pos);
            out.push(TextRun::new(&run.text[..cut], run.style));
            out.push(TextRun::new(&run.text[cut..], run.style));
        } else {
            out.push(run);
        }
        pos += len;
    }
    out
}

fn byte_index(text: &str, char_offset: usize) -> usize {
    text.char_indices()
        .nth(char_offset)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

/// Remove the chars in `range`
pub fn delete_range(runs: &[TextRun], range: Range<usize>) -> Vec<TextRun> {
    if range.start >= range.end {
        return normalize_runs(runs.to_vec());
    }
    let split = split_at(split_at(runs.to_vec(), range.start), range.end);
    let mut pos = 0;
    let mut out = Vec::with_capacity(split.len());
    for run in split {
        let len = run.char_len();
        let inside = pos >= range.start && pos + len <= range.end;
        if !inside {
            out.push(run);
        }
        pos += len;
    }
    normalize_runs(out)
}

/// Insert `text` at `offset` with `style`
pub fn insert_text(runs: &[TextRun], offset: usize, text: &str, style: TextStyle) -> Vec<TextRun> {
    if text.is_empty() {
        return normalize_runs(runs.to_vec());
    }
    let split = split_at(runs.to_vec(), offset);
    let mut out = Vec::with_capacity(split.len() + 1);
    let mut pos = 0;
    let mut inserted = false;
    for run in split {
        if !inserted && pos >= offset {
            out.push(TextRun::new(text, style));
            inserted = true;
        }
        pos += run.char_len();
        out.push(run);
    }
    if !inserted {
        out.push(TextRun::new(text, style));
    }
    normalize_runs(out)
}

/// Bring `runs` in line with `new_text`, assuming they currently spell `old_text`
///
/// Inserted text takes `insert_style` when given, otherwise the style of the
/// character before the change, otherwise `fallback`.
pub fn reconcile_runs(
    runs: &[TextRun],
    old_text: &str,
    new_text: &str,
    insert_style: Option<TextStyle>,
    fallback: TextStyle,
) -> Vec<TextRun> {
    let Some(diff) = diff_texts(old_text, new_text) else {
        return normalize_runs(runs.to_vec());
    };
    let style = insert_style
        .or_else(|| style_at(runs, diff.start))
        .unwrap_or(fallback);
    let trimmed = delete_range(runs, diff.start..diff.start + diff.removed);
    insert_text(&trimmed, diff.start, &diff.inserted, style)
}

/// Apply `patch` to the chars in `range` only
pub fn apply_style(runs: &[TextRun], range: Range<usize>, patch: &StylePatch) -> Vec<TextRun> {
    let end = range.end.min(char_len(runs));
    if range.start >= end {
        return normalize_runs(runs.to_vec());
    }
    let split = split_at(split_at(runs.to_vec(), range.start), end);
    let mut pos = 0;
    let mut out = Vec::with_capacity(split.len());
    for mut run in split {
        let len = run.char_len();
        if pos >= range.start && pos + len <= end {
            run.style = patch.apply(&run.style);
        }
        pos += len;
        out.push(run);
    }
    normalize_runs(out)
}

/// Runs with every font size multiplied by `factor`
pub fn scale_runs(runs: &[TextRun], factor: f64) -> Vec<TextRun> {
    runs.iter()
        .map(|r| TextRun::new(r.text.clone(), r.style.scaled(factor)))
        .collect()
}
