//! In-engine annotation clipboard
//!
//! Holds deep copies of annotations. Every paste produces fresh ids and shifts
//! geometry by a growing nudge so repeated pastes do not stack exactly.

use crate::annotation::{unix_now, Annotation, AnnotationId};

#[derive(Debug, Clone, Default)]
pub struct Clipboard {
    items: Vec<Annotation>,
    /// Nudge steps applied to the next paste
    next_step: u32,
}

impl Clipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the clipboard; the first paste lands one nudge away from the originals
    pub fn copy(&mut self, annotations: Vec<Annotation>) {
        self.items = annotations;
        self.next_step = 1;
    }

    /// Like [`Clipboard::copy`], but the originals are gone so the first paste
    /// lands exactly where they were
    pub fn cut(&mut self, annotations: Vec<Annotation>) {
        self.items = annotations;
        self.next_step = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Fresh copies for one paste
    ///
    /// With `target_page` every copy goes to that page at its original
    /// fractional position; otherwise each stays on its source page.
    pub fn paste(
        &mut self,
        target_page: Option<u32>,
        nudge: f64,
        clamp_max: f64,
    ) -> Vec<Annotation> {
        if self.items.is_empty() {
            return Vec::new();
        }
        let offset = nudge * self.next_step as f64;
        self.next_step += 1;

        let now = unix_now();
        self.items
            .iter()
            .map(|item| {
                let mut data = item.data.clone();
                data.translate(offset, offset, clamp_max);
                Annotation {
                    id: AnnotationId::new(),
                    page: target_page.unwrap_or(item.page).max(1),
                    data,
                    created_at: now,
                    updated_at: now,
                    author_id: None,
                }
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.next_step = 0;
    }
}
