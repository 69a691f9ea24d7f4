//! Text-selection highlights
//!
//! Raw selection rectangles (one per text span) are grouped per page, merged
//! into per-line segments and stored as one highlight per page. Rectangle
//! highlights are painted by the host as overlay elements placed just behind
//! each page's text layer, so glyphs stay on top of the highlight color. They
//! never enter the canvas scene.

use crate::annotation::{Annotation, AnnotationData, AnnotationId, Color, HighlightRectsData};
use crate::config::{HighlightSettings, MergeConfig};
use crate::geometry::{NormRect, Point, Rect};
use crate::host::OverlayHost;
use crate::layout::PageLayout;
use crate::store::AnnotationStore;
use std::collections::BTreeMap;

fn vertical_overlap_ratio(a: &Rect, b: &Rect) -> f64 {
    let overlap = a.bottom().min(b.bottom()) - a.y.max(b.y);
    let smaller = a.height.min(b.height);
    if smaller <= 0.0 {
        return 0.0;
    }
    overlap.max(0.0) / smaller
}

fn mergeable(a: &Rect, b: &Rect, config: &MergeConfig) -> bool {
    let gap = (b.x - a.right()).max(a.x - b.right());
    gap < config.gap_tolerance_px && vertical_overlap_ratio(a, b) > config.min_vertical_overlap
}

/// Union mergeable pairs of one line until none is left; returns whether anything merged
fn merge_line(line: &mut Vec<Rect>, config: &MergeConfig) -> bool {
    line.sort_by(|a, b| a.x.total_cmp(&b.x));
    let mut changed = false;
    'scan: loop {
        for i in 0..line.len() {
            for j in i + 1..line.len() {
                if mergeable(&line[i], &line[j], config) {
                    let other = line.remove(j);
                    line[i] = line[i].union(&other);
                    changed = true;
                    continue 'scan;
                }
            }
        }
        return changed;
    }
}

/// Merge per-span rectangles into per-line segments
///
/// Rectangles are grouped by a rounded vertical center and merged when the
/// horizontal gap is under the tolerance and the vertical overlap ratio
/// exceeds the threshold. A union can move a segment's center into another
/// line, so grouping and merging repeat until a pass changes nothing; the
/// result is therefore its own fixed point. Segments are ordered top to
/// bottom, left to right and capped at `max_segments_per_page`.
pub fn merge_rects(rects: &[Rect], config: &MergeConfig) -> Vec<Rect> {
    let key_step = if config.line_key_px > 0.0 {
        config.line_key_px
    } else {
        1.0
    };

    let mut merged: Vec<Rect> = rects
        .iter()
        .filter(|r| r.width > 0.0 && r.height > 0.0)
        .copied()
        .collect();
    loop {
        let mut lines: BTreeMap<i64, Vec<Rect>> = BTreeMap::new();
        for rect in merged.drain(..) {
            let key = (rect.center_y() / key_step).round() as i64;
            lines.entry(key).or_default().push(rect);
        }

        let mut changed = false;
        for mut line in lines.into_values() {
            changed |= merge_line(&mut line, config);
            merged.extend(line);
        }
        if !changed {
            break;
        }
    }

    merged.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));
    merged.truncate(config.max_segments_per_page);
    merged
}

/// Assign client-space selection rectangles to pages, in page-local pixels
///
/// A rectangle belongs to the page containing its center and is clipped to
/// that page. Rectangles outside every page are dropped.
pub fn split_by_page(
    client_rects: &[Rect],
    layout: &PageLayout,
    container_origin: Point,
) -> BTreeMap<u32, Vec<Rect>> {
    let mut pages: BTreeMap<u32, Vec<Rect>> = BTreeMap::new();
    for rect in client_rects {
        let doc = rect.translate(-container_origin.x, -container_origin.y);
        let center = Point::new(doc.x + doc.width / 2.0, doc.center_y());
        let Some(metrics) = layout.page_at(center) else {
            continue;
        };
        let Some(clipped) = doc.intersection(&metrics.rect()) else {
            continue;
        };
        pages
            .entry(metrics.page)
            .or_default()
            .push(clipped.translate(-metrics.x, -metrics.y));
    }
    pages
}

/// One highlight annotation per page touched by the selection
pub fn highlights_from_selection(
    client_rects: &[Rect],
    layout: &PageLayout,
    container_origin: Point,
    settings: &HighlightSettings,
    merge: &MergeConfig,
    clamp_max: f64,
) -> Vec<Annotation> {
    split_by_page(client_rects, layout, container_origin)
        .into_iter()
        .filter_map(|(page, rects)| {
            let size = layout.get(page)?.size();
            let segments = merge_rects(&rects, merge);
            if segments.is_empty() {
                return None;
            }
            let norm = segments
                .iter()
                .map(|r| NormRect::from_pixels(*r, size).clamped(clamp_max))
                .collect();
            Some(Annotation::new(
                page,
                AnnotationData::HighlightRects(HighlightRectsData::new(
                    norm,
                    settings.color,
                    settings.opacity,
                )),
            ))
        })
        .collect()
}

/// A positioned overlay rectangle, in page-local pixels
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayElement {
    pub annotation_id: AnnotationId,
    pub rect: Rect,
    pub color: Color,
    pub opacity: f64,
}

/// Keeps each page's highlight overlay in step with the store
#[derive(Debug, Default)]
pub struct HighlightOverlay {
    mounted: BTreeMap<u32, Vec<OverlayElement>>,
}

impl HighlightOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild every page's overlay from normalized geometry
    pub fn sync(
        &mut self,
        store: &AnnotationStore,
        layout: &PageLayout,
        host: Option<&mut (dyn OverlayHost + 'static)>,
    ) {
        let Some(host) = host else {
            return;
        };

        let mut next: BTreeMap<u32, Vec<OverlayElement>> = BTreeMap::new();
        for metrics in layout.iter() {
            let size = metrics.size();
            let elements: Vec<OverlayElement> = store
                .page(metrics.page)
                .iter()
                .filter_map(|annotation| match &annotation.data {
                    AnnotationData::HighlightRects(h) => Some((annotation, h)),
                    _ => None,
                })
                .flat_map(|(annotation, h)| {
                    h.rects.iter().map(move |r| OverlayElement {
                        annotation_id: annotation.id.clone(),
                        rect: r.to_pixels(size),
                        color: h.color,
                        opacity: h.opacity,
                    })
                })
                .collect();
            if !elements.is_empty() {
                next.insert(metrics.page, elements);
            }
        }

        for page in self.mounted.keys() {
            if !next.contains_key(page) {
                host.unmount(*page);
            }
        }
        next.retain(|page, elements| {
            let mounted = host.mount(*page, elements);
            if !mounted {
                log::debug!("page {page} has no text layer yet; overlay deferred");
            }
            mounted
        });
        self.mounted = next;
    }

    /// Topmost overlay element under a document point
    pub fn hit_test(&self, point: Point, layout: &PageLayout) -> Option<&AnnotationId> {
        let metrics = layout.page_at(point)?;
        let local = metrics.to_page(point);
        self.mounted
            .get(&metrics.page)?
            .iter()
            .rev()
            .find(|e| e.rect.contains(&local))
            .map(|e| &e.annotation_id)
    }

    pub fn mounted_pages(&self) -> impl Iterator<Item = u32> + '_ {
        self.mounted.keys().copied()
    }

    pub fn elements(&self, page: u32) -> &[OverlayElement] {
        self.mounted.get(&page).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Remove every mounted overlay
    pub fn clear(&mut self, host: Option<&mut (dyn OverlayHost + 'static)>) {
        if let Some(host) = host {
            for page in self.mounted.keys() {
                host.unmount(*page);
            }
        }
        self.mounted.clear();
    }
}
