//! In-place rich-text editing session for one text box
//!
//! The host's editable surface owns the plain text and the caret. The session
//! mirrors it as styled runs (pixel font sizes while editing) and patches them
//! from each input with [`reconcile_runs`]. Input that arrives during IME
//! composition is ignored until the composition ends.

use crate::annotation::{Annotation, AnnotationData, AnnotationId, TextBoxData};
use crate::config::TextBoxConfig;
use crate::geometry::{NormRect, Rect, Size};
use crate::host::EditableSurface;
use crate::rich_text::{
    apply_style, char_len, normalize_runs, plain_text, reconcile_runs, scale_runs, style_at,
    StylePatch, TextRun, TextStyle,
};
use crate::store::PageSnapshot;
use crate::text_layout::{layout_runs, TextMeasurer};

/// Result of closing an editor
#[derive(Debug, Clone, PartialEq)]
pub enum EditorOutcome {
    /// The text was empty; the annotation should be removed
    Empty,
    /// Final box geometry and normalized runs
    Commit(TextBoxData),
}

#[derive(Debug, Clone)]
pub struct EditorSession {
    annotation_id: AnnotationId,
    page: u32,
    page_size: Size,
    /// Box rectangle in page-local pixels at open time
    rect: Rect,
    runs: Vec<TextRun>,
    last_text: String,
    composing: bool,
    pending_style: Option<TextStyle>,
    default_style: TextStyle,
    /// Store state of the page before the box was created or opened
    before: PageSnapshot,
}

impl EditorSession {
    /// Open a session over a text box annotation
    ///
    /// Returns `None` when the annotation is not a text box.
    pub fn open(
        annotation: &Annotation,
        page_size: Size,
        default_style: TextStyle,
        before: PageSnapshot,
        surface: Option<&mut (dyn EditableSurface + 'static)>,
    ) -> Option<Self> {
        let AnnotationData::TextBox(text) = &annotation.data else {
            return None;
        };
        let runs = normalize_runs(scale_runs(&text.runs, page_size.height));
        let session = Self {
            annotation_id: annotation.id.clone(),
            page: annotation.page,
            page_size,
            rect: text.rect.to_pixels(page_size),
            last_text: plain_text(&runs),
            runs,
            composing: false,
            pending_style: None,
            default_style,
            before,
        };
        if let Some(surface) = surface {
            surface.present_runs(&session.runs);
            let end = char_len(&session.runs);
            surface.set_selection(end..end);
        }
        Some(session)
    }

    pub fn annotation_id(&self) -> &AnnotationId {
        &self.annotation_id
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn runs(&self) -> &[TextRun] {
        &self.runs
    }

    pub fn plain_text(&self) -> &str {
        &self.last_text
    }

    pub fn is_composing(&self) -> bool {
        self.composing
    }

    pub fn before(&self) -> &PageSnapshot {
        &self.before
    }

    /// Pull the surface's plain text into the runs
    pub fn on_input(&mut self, surface: &mut dyn EditableSurface) {
        if self.composing {
            return;
        }
        self.sync_from(surface);
    }

    fn sync_from(&mut self, surface: &mut dyn EditableSurface) {
        let text = surface.plain_text();
        if text == self.last_text {
            return;
        }
        self.runs = reconcile_runs(
            &self.runs,
            &self.last_text,
            &text,
            self.pending_style.take(),
            self.default_style,
        );
        self.last_text = text;

        let selection = surface.selection();
        surface.present_runs(&self.runs);
        if let Some(selection) = selection {
            surface.set_selection(selection);
        }
    }

    pub fn composition_start(&mut self) {
        self.composing = true;
    }

    pub fn composition_end(&mut self, surface: &mut dyn EditableSurface) {
        self.composing = false;
        self.sync_from(surface);
    }

    /// Style the selected range, or arm the style for the next typed text when
    /// the selection is collapsed
    pub fn apply_style(&mut self, patch: &StylePatch, surface: &mut dyn EditableSurface) {
        let Some(selection) = surface.selection() else {
            return;
        };
        if selection.start >= selection.end {
            let base = self
                .pending_style
                .or_else(|| style_at(&self.runs, selection.start))
                .unwrap_or(self.default_style);
            self.pending_style = Some(patch.apply(&base));
            return;
        }
        self.runs = apply_style(&self.runs, selection.clone(), patch);
        surface.present_runs(&self.runs);
        surface.set_selection(selection);
    }

    /// Close the session and compute what the store should hold
    pub fn finish(
        mut self,
        surface: Option<&mut (dyn EditableSurface + 'static)>,
        config: &TextBoxConfig,
        measurer: &dyn TextMeasurer,
        clamp_max: f64,
    ) -> (EditorOutcome, PageSnapshot) {
        let mut measured = None;
        if let Some(surface) = surface {
            self.composing = false;
            self.sync_from(&mut *surface);
            measured = surface.measured_size();
        }

        if self.last_text.trim().is_empty() {
            return (EditorOutcome::Empty, self.before);
        }

        let size = measured.unwrap_or_else(|| {
            let inner = (self.rect.width - config.padding * 2.0).max(0.0);
            let laid_out = layout_runs(&self.runs, inner, config.line_height_multiplier, measurer);
            Size::new(
                self.rect.width,
                (laid_out.height + config.padding * 2.0).max(self.rect.height),
            )
        });
        let size = Size::new(
            size.width.max(config.min_width),
            size.height.max(config.min_height),
        );
        let rect = NormRect::from_pixels(
            Rect::new(self.rect.x, self.rect.y, size.width, size.height),
            self.page_size,
        )
        .clamped(clamp_max);

        let data = TextBoxData {
            rect,
            runs: scale_runs(&self.runs, 1.0 / self.page_size.height),
        };
        (EditorOutcome::Commit(data), self.before)
    }
}
