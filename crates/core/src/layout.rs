//! Page layout provider
//!
//! Converts the renderer's per-page viewports into document-space page
//! rectangles. Measured page elements are authoritative; the stacked formula
//! (vertical stack, horizontally centered, fixed padding and gap) is used only
//! when the pages cannot all be measured, e.g. before first paint.

use crate::config::LayoutConfig;
use crate::geometry::{Point, Rect, Size};
use crate::host::PageSource;
use std::collections::BTreeMap;

/// Document-space position and size of one rendered page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageMetrics {
    /// 1-based page number
    pub page: u32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PageMetrics {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Document point → page-local point
    pub fn to_page(&self, point: Point) -> Point {
        Point::new(point.x - self.x, point.y - self.y)
    }

    /// Page-local point → document point
    pub fn to_document(&self, point: Point) -> Point {
        Point::new(point.x + self.x, point.y + self.y)
    }
}

/// Where the current metrics came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayoutSource {
    #[default]
    Empty,
    Measured,
    Formula,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    metrics: BTreeMap<u32, PageMetrics>,
    source: LayoutSource,
}

impl PageLayout {
    /// Compute metrics for every page the source reports
    ///
    /// Pure function of its inputs: unchanged inputs yield identical metrics.
    pub fn compute(source: &dyn PageSource, config: &LayoutConfig) -> Self {
        let count = source.page_count();
        if count == 0 {
            return Self::default();
        }

        let measured: Option<BTreeMap<u32, PageMetrics>> = (1..=count)
            .map(|page| {
                let rect = source.measure_page(page)?;
                Some((
                    page,
                    PageMetrics {
                        page,
                        x: rect.x,
                        y: rect.y,
                        width: rect.width,
                        height: rect.height,
                    },
                ))
            })
            .collect();

        if let Some(metrics) = measured {
            return Self {
                metrics,
                source: LayoutSource::Measured,
            };
        }

        Self::stacked(source, config)
    }

    /// Sequential vertical stacking with horizontal centering
    pub fn stacked(source: &dyn PageSource, config: &LayoutConfig) -> Self {
        let sizes: Vec<(u32, Size)> = (1..=source.page_count())
            .filter_map(|page| source.page_viewport(page).map(|size| (page, size)))
            .filter(|(_, size)| size.is_usable())
            .collect();

        let max_width = sizes.iter().map(|(_, s)| s.width).fold(0.0, f64::max);
        let mut y = config.padding;
        let mut metrics = BTreeMap::new();
        for (page, size) in sizes {
            let x = config.padding + (max_width - size.width) / 2.0;
            metrics.insert(
                page,
                PageMetrics {
                    page,
                    x,
                    y,
                    width: size.width,
                    height: size.height,
                },
            );
            y += size.height + config.gap;
        }

        let source = if metrics.is_empty() {
            LayoutSource::Empty
        } else {
            LayoutSource::Formula
        };
        Self { metrics, source }
    }

    pub fn get(&self, page: u32) -> Option<&PageMetrics> {
        self.metrics.get(&page)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageMetrics> {
        self.metrics.values()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn source(&self) -> LayoutSource {
        self.source
    }

    /// Extent of the union of all page rectangles, measured from the document origin
    pub fn content_size(&self) -> Size {
        self.metrics.values().fold(Size::default(), |acc, m| {
            Size::new(acc.width.max(m.x + m.width), acc.height.max(m.y + m.height))
        })
    }

    /// Page whose rectangle contains a document point
    pub fn page_at(&self, point: Point) -> Option<&PageMetrics> {
        self.metrics.values().find(|m| m.rect().contains(&point))
    }

    /// Pages whose rectangle intersects a document rectangle
    pub fn pages_in(&self, rect: &Rect) -> Vec<u32> {
        self.metrics
            .values()
            .filter(|m| m.rect().intersects(rect))
            .map(|m| m.page)
            .collect()
    }
}
