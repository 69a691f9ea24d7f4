//! Viewport window management
//!
//! The render surface only ever covers the visible, clipped part of the
//! document. Its position inside the document container is the camera offset;
//! both drawing layers are translated by `-offset` so primitives can stay in
//! document space.
//!
//! Scroll and resize can fire many times per frame. [`FrameCoalescer`] folds a
//! burst into a single scheduled update.

use crate::geometry::{Point, Rect, Size};
use crate::host::{ClipSources, FrameScheduler, RenderSurface};

/// Visible slice of the document in document-space pixels
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewportWindow {
    /// Camera offset: top-left of the visible slice
    pub offset: Point,
    pub size: Size,
}

impl ViewportWindow {
    pub fn rect(&self) -> Rect {
        Rect::new(self.offset.x, self.offset.y, self.size.width, self.size.height)
    }
}

/// Clamp one axis of the camera offset into `[0, max(0, content - viewport)]`
pub fn clamp_offset(offset: f64, content: f64, viewport: f64) -> f64 {
    let max = (content - viewport).max(0.0);
    if offset.is_nan() {
        return 0.0;
    }
    offset.clamp(0.0, max)
}

/// Intersect the scroll clips and map the result into document space
///
/// Each axis falls back to the window independently when no scrolling
/// ancestor exists on it. Returns `None` when nothing is visible.
pub fn compute_window(clip: &ClipSources, content: Size) -> Option<ViewportWindow> {
    let horizontal = clip.horizontal.unwrap_or(clip.window);
    let vertical = clip.vertical.unwrap_or(clip.window);
    let visible = horizontal.intersection(&vertical)?;
    if visible.width <= 0.0 || visible.height <= 0.0 {
        return None;
    }

    let local_x = visible.x - clip.container_origin.x;
    let local_y = visible.y - clip.container_origin.y;

    Some(ViewportWindow {
        offset: Point::new(
            clamp_offset(local_x, content.width, visible.width),
            clamp_offset(local_y, content.height, visible.height),
        ),
        size: visible.size(),
    })
}

/// Tracks the applied window and drives the render surface
#[derive(Debug, Default)]
pub struct ViewportManager {
    current: Option<ViewportWindow>,
}

impl ViewportManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<ViewportWindow> {
        self.current
    }

    /// Recompute the window and push it to the surface
    ///
    /// Returns the new window, or `None` when the container is not visible; the
    /// previous window is kept in that case.
    pub fn update(
        &mut self,
        clip: Option<ClipSources>,
        content: Size,
        surface: Option<&mut (dyn RenderSurface + 'static)>,
    ) -> Option<ViewportWindow> {
        let window = compute_window(&clip?, content)?;
        if self.current == Some(window) {
            return Some(window);
        }
        log::trace!(
            "viewport window {:.1}x{:.1} at ({:.1}, {:.1})",
            window.size.width,
            window.size.height,
            window.offset.x,
            window.offset.y
        );

        if let Some(surface) = surface {
            surface.resize(window.size);
            surface.set_position(window.offset);
            surface.set_camera(Point::new(-window.offset.x, -window.offset.y));
        }
        self.current = Some(window);
        Some(window)
    }

    /// Forget the applied window so the next update re-applies it
    pub fn invalidate(&mut self) {
        self.current = None;
    }
}

/// Pending-flag gate that turns bursts of requests into one frame callback
#[derive(Debug, Default)]
pub struct FrameCoalescer {
    pending: bool,
}

impl FrameCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a frame unless one is already pending
    ///
    /// Returns `true` if a new frame was requested.
    pub fn request(&mut self, scheduler: Option<&mut (dyn FrameScheduler + 'static)>) -> bool {
        if self.pending {
            return false;
        }
        self.pending = true;
        if let Some(scheduler) = scheduler {
            scheduler.request_frame();
        }
        true
    }

    /// Consume the pending flag at frame time
    pub fn take(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn cancel(&mut self) {
        self.pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn clip(window: Rect, container_origin: Point) -> ClipSources {
        ClipSources {
            window,
            horizontal: None,
            vertical: None,
            container_origin,
        }
    }

    #[test]
    fn test_axes_fall_back_independently() {
        let mut sources = clip(Rect::new(0.0, 0.0, 1000.0, 800.0), Point::new(0.0, -300.0));
        sources.vertical = Some(Rect::new(100.0, 50.0, 600.0, 700.0));

        let window = compute_window(&sources, Size::new(2000.0, 5000.0)).unwrap();
        // x from the window-backed horizontal clip, y from the scroller
        assert_eq!(window.size, Size::new(600.0, 700.0));
        assert_eq!(window.offset, Point::new(100.0, 350.0));
    }

    #[test]
    fn test_offset_clamped_past_content_end() {
        let sources = clip(Rect::new(0.0, 0.0, 800.0, 600.0), Point::new(-50.0, -9000.0));
        let window = compute_window(&sources, Size::new(820.0, 2000.0)).unwrap();
        assert_eq!(window.offset, Point::new(20.0, 1400.0));
    }

    #[test]
    fn test_content_smaller_than_viewport_pins_to_zero() {
        let sources = clip(Rect::new(0.0, 0.0, 800.0, 600.0), Point::new(-30.0, -30.0));
        let window = compute_window(&sources, Size::new(400.0, 300.0)).unwrap();
        assert_eq!(window.offset, Point::new(0.0, 0.0));
    }

    #[test]
    fn test_disjoint_clips_yield_nothing() {
        let mut sources = clip(Rect::new(0.0, 0.0, 800.0, 600.0), Point::default());
        sources.horizontal = Some(Rect::new(0.0, 0.0, 100.0, 100.0));
        sources.vertical = Some(Rect::new(500.0, 500.0, 100.0, 100.0));
        assert!(compute_window(&sources, Size::new(1000.0, 1000.0)).is_none());
    }

    #[test]
    fn test_clamp_holds_for_random_scroll_positions() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            let content = Size::new(rng.gen_range(0.0..5000.0), rng.gen_range(0.0..50_000.0));
            let window = Rect::new(
                0.0,
                0.0,
                rng.gen_range(1.0..2000.0),
                rng.gen_range(1.0..2000.0),
            );
            let origin = Point::new(
                rng.gen_range(-60_000.0..60_000.0),
                rng.gen_range(-60_000.0..60_000.0),
            );

            let w = compute_window(&clip(window, origin), content).unwrap();
            let max_x = (content.width - w.size.width).max(0.0);
            let max_y = (content.height - w.size.height).max(0.0);
            assert!(w.offset.x >= 0.0 && w.offset.x <= max_x);
            assert!(w.offset.y >= 0.0 && w.offset.y <= max_y);
        }
    }

    #[test]
    fn test_coalescer_requests_once_per_burst() {
        struct Counter(u32);
        impl FrameScheduler for Counter {
            fn request_frame(&mut self) {
                self.0 += 1;
            }
        }

        let mut scheduler = Counter(0);
        let mut coalescer = FrameCoalescer::new();
        for _ in 0..10 {
            coalescer.request(Some(&mut scheduler));
        }
        assert_eq!(scheduler.0, 1);
        assert!(coalescer.take());
        assert!(!coalescer.take());

        coalescer.request(Some(&mut scheduler));
        assert_eq!(scheduler.0, 2);
    }
}
