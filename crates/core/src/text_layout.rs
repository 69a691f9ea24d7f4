//! Greedy word-wrap of styled runs into a text box
//!
//! Characters accumulate on a line while the measured width fits the box's
//! inner width. On overflow the line breaks after its last space, or before the
//! overflowing character when the line has no space. A character that is wider
//! than an empty line is emitted alone so layout always makes progress.
//! Explicit newlines always break.

use crate::rich_text::{TextRun, TextStyle};

/// Width measurement for a string rendered in a style (`font_size` in pixels)
pub trait TextMeasurer {
    fn measure(&self, text: &str, style: &TextStyle) -> f64;
}

/// Fixed-advance measurer for headless use
///
/// Estimates every character as `font_size * char_width_ratio`, bold text
/// slightly wider.
#[derive(Debug, Clone, Copy)]
pub struct MonospaceMeasurer {
    pub char_width_ratio: f64,
}

impl Default for MonospaceMeasurer {
    fn default() -> Self {
        Self {
            char_width_ratio: 0.6,
        }
    }
}

impl TextMeasurer for MonospaceMeasurer {
    fn measure(&self, text: &str, style: &TextStyle) -> f64 {
        let weight = if style.is_bold() { 1.1 } else { 1.0 };
        text.chars().count() as f64 * style.font_size * self.char_width_ratio * weight
    }
}

/// Same-style slice of one laid-out line
#[derive(Debug, Clone, PartialEq)]
pub struct LaidOutFragment {
    pub text: String,
    pub style: TextStyle,
    /// Offset from the line start
    pub x: f64,
    pub width: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaidOutLine {
    pub fragments: Vec<LaidOutFragment>,
    /// Top of the line relative to the first line
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl LaidOutLine {
    pub fn text(&self) -> String {
        self.fragments.iter().map(|f| f.text.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextLayout {
    pub lines: Vec<LaidOutLine>,
    /// Widest line
    pub width: f64,
    pub height: f64,
}

#[derive(Default)]
struct LineBuf {
    glyphs: Vec<(char, TextStyle, f64)>,
    width: f64,
}

impl LineBuf {
    fn push(&mut self, c: char, style: TextStyle, w: f64) {
        self.glyphs.push((c, style, w));
        self.width += w;
    }

    fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// Split after the last space; returns the carried tail
    fn break_at_last_space(&mut self) -> Option<LineBuf> {
        let idx = self.glyphs.iter().rposition(|(c, _, _)| c.is_whitespace())?;
        let tail: Vec<_> = self.glyphs.drain(idx + 1..).collect();
        self.glyphs.truncate(idx);
        self.width = self.glyphs.iter().map(|g| g.2).sum();
        let mut carried = LineBuf::default();
        for (c, s, w) in tail {
            carried.push(c, s, w);
        }
        Some(carried)
    }
}

struct Builder<'a> {
    lines: Vec<LaidOutLine>,
    y: f64,
    line_height_multiplier: f64,
    measurer: &'a dyn TextMeasurer,
}

impl Builder<'_> {
    fn finish(&mut self, line: LineBuf, fallback: TextStyle) {
        let max_font = line
            .glyphs
            .iter()
            .map(|g| g.1.font_size)
            .fold(0.0_f64, f64::max);
        let font = if max_font > 0.0 { max_font } else { fallback.font_size };
        let height = font * self.line_height_multiplier;

        let mut fragments: Vec<LaidOutFragment> = Vec::new();
        let mut x = 0.0;
        for (c, style, _) in line.glyphs {
            match fragments.last_mut() {
                Some(last) if last.style == style => last.text.push(c),
                _ => fragments.push(LaidOutFragment {
                    text: c.to_string(),
                    style,
                    x: 0.0,
                    width: 0.0,
                }),
            }
        }
        for fragment in &mut fragments {
            fragment.x = x;
            fragment.width = self.measurer.measure(&fragment.text, &fragment.style);
            x += fragment.width;
        }

        self.lines.push(LaidOutLine {
            fragments,
            y: self.y,
            width: x,
            height,
        });
        self.y += height;
    }
}

/// Wrap `runs` (pixel font sizes) into lines no wider than `max_width`
pub fn layout_runs(
    runs: &[TextRun],
    max_width: f64,
    line_height_multiplier: f64,
    measurer: &dyn TextMeasurer,
) -> TextLayout {
    let mut builder = Builder {
        lines: Vec::new(),
        y: 0.0,
        line_height_multiplier,
        measurer,
    };
    let Some(first) = runs.first() else {
        return TextLayout::default();
    };
    let mut last_style = first.style;
    let mut line = LineBuf::default();

    for run in runs {
        for c in run.text.chars() {
            last_style = run.style;
            if c == '\n' {
                builder.finish(std::mem::take(&mut line), run.style);
                continue;
            }
            let mut buf = [0u8; 4];
            let w = measurer.measure(c.encode_utf8(&mut buf), &run.style);

            if line.width + w <= max_width {
                line.push(c, run.style, w);
                continue;
            }
            if line.is_empty() {
                if !c.is_whitespace() {
                    line.push(c, run.style, w);
                }
                builder.finish(std::mem::take(&mut line), run.style);
                continue;
            }
            if c.is_whitespace() {
                builder.finish(std::mem::take(&mut line), run.style);
                continue;
            }
            match line.break_at_last_space() {
                Some(carried) => {
                    builder.finish(std::mem::replace(&mut line, carried), run.style);
                }
                None => {
                    builder.finish(std::mem::take(&mut line), run.style);
                }
            }
            if line.width + w > max_width && !line.is_empty() {
                builder.finish(std::mem::take(&mut line), run.style);
            }
            line.push(c, run.style, w);
        }
    }

    let ends_with_newline = runs
        .last()
        .map(|r| r.text.ends_with('\n'))
        .unwrap_or(false);
    if !line.is_empty() || ends_with_newline {
        builder.finish(line, last_style);
    }

    let width = builder.lines.iter().map(|l| l.width).fold(0.0, f64::max);
    let height = builder.y;
    TextLayout {
        lines: builder.lines,
        width,
        height,
    }
}
