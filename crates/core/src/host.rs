//! Collaborator interfaces supplied by the embedding host
//!
//! The engine never touches a document renderer, a DOM or a network directly.
//! Each capability it needs is one trait here; hosts implement the ones they
//! support and the engine degrades to a no-op when one is missing.

use crate::error::GatewayResult;
use crate::geometry::{Point, Rect, Size};
use crate::highlight::OverlayElement;
use crate::rich_text::TextRun;
use crate::scene::Primitive;
use crate::wire::StoredAnnotation;
use std::collections::BTreeMap;
use std::ops::Range;

/// Page geometry reported by the document renderer
pub trait PageSource {
    /// Number of pages currently known to the renderer
    fn page_count(&self) -> u32;

    /// Pixel size of a 1-based page at the current zoom
    fn page_viewport(&self, page: u32) -> Option<Size>;

    /// Rendered page rectangle in document space, when the page element can be measured
    fn measure_page(&self, _page: u32) -> Option<Rect> {
        None
    }
}

/// Client-space rectangles that bound what the user can see
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipSources {
    pub window: Rect,
    /// Nearest ancestor that scrolls horizontally
    pub horizontal: Option<Rect>,
    /// Nearest ancestor that scrolls vertically
    pub vertical: Option<Rect>,
    /// Client position of the document container's top-left corner
    pub container_origin: Point,
}

pub trait ScrollHost {
    /// `None` while the document container is not mounted
    fn clip_sources(&self) -> Option<ClipSources>;
}

/// The two stacked drawing layers of the render surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    /// Committed annotations
    Scene,
    /// Previews, marquee, selection outline
    Interaction,
}

/// Bounded drawing surface positioned over the visible part of the document
pub trait RenderSurface {
    fn resize(&mut self, size: Size);

    /// Place the surface at a document-space offset inside the container
    fn set_position(&mut self, offset: Point);

    /// Translate both layers; the engine passes `-offset`
    fn set_camera(&mut self, translation: Point);

    /// Let pointer events fall through to the text layer underneath
    fn set_pointer_passthrough(&mut self, passthrough: bool);

    /// Replace a layer's content; primitives are in document space
    fn present(&mut self, layer: Layer, primitives: &[Primitive]);
}

/// Animation-frame scheduling
pub trait FrameScheduler {
    /// Ask for one `AnnotationEngine::on_animation_frame` call before the next paint
    fn request_frame(&mut self);
}

/// Native text selection over the renderer's text layer
pub trait SelectionSource {
    /// One client-space rectangle per selected text span
    fn client_rects(&self) -> Vec<Rect>;

    fn clear(&mut self);
}

/// Paints highlight rectangles behind a page's text layer
pub trait OverlayHost {
    /// Insert or replace the page's overlay just before its text layer.
    /// Returns `false` when the page or its text layer is not mounted.
    fn mount(&mut self, page: u32, elements: &[OverlayElement]) -> bool;

    fn unmount(&mut self, page: u32);
}

/// In-place editable text area backing the rich-text editor
pub trait EditableSurface {
    fn plain_text(&self) -> String;

    /// Selected char range; collapsed for a caret, `None` without focus
    fn selection(&self) -> Option<Range<usize>>;

    fn set_selection(&mut self, range: Range<usize>);

    /// Re-render styled runs; must not change the plain text
    fn present_runs(&mut self, runs: &[TextRun]);

    /// Final rendered size of the content, if the host can measure it
    fn measured_size(&self) -> Option<Size> {
        None
    }
}

/// Stores annotation sets per (document, user) pair
pub trait PersistenceGateway {
    fn load(
        &self,
        document_id: &str,
        user_id: &str,
    ) -> GatewayResult<BTreeMap<u32, Vec<StoredAnnotation>>>;

    fn save(
        &self,
        document_id: &str,
        user_id: &str,
        pages: &BTreeMap<u32, Vec<StoredAnnotation>>,
    ) -> GatewayResult<()>;
}
