//! Markup Core Library
//!
//! Annotation overlay engine for paginated, zoomable documents: ink strokes,
//! text highlights and rich-text boxes stored in page-relative coordinates,
//! drawn on a surface that tracks the host's scroll and zoom.

pub mod annotation;
pub mod clipboard;
pub mod config;
pub mod editor;
pub mod engine;
pub mod error;
pub mod events;
pub mod geometry;
pub mod highlight;
pub mod history;
pub mod host;
pub mod interaction;
pub mod layout;
pub mod rich_text;
pub mod scene;
pub mod store;
pub mod text_layout;
pub mod viewport;
pub mod wire;

pub use annotation::{
    Annotation, AnnotationData, AnnotationId, AnnotationKind, Color, HighlightRectsData,
    StrokeData, TextBoxData,
};
pub use config::{
    EngineConfig, HighlightSettings, InkSettings, LayoutConfig, MergeConfig, TextBoxConfig,
};
pub use editor::{EditorOutcome, EditorSession};
pub use engine::{AnnotationEngine, Hosts, LoadTicket};
pub use error::{ConfigError, EngineError, EngineResult, GatewayError, GatewayResult};
pub use events::{EngineEvent, EventKind, ListenerId};
pub use geometry::{NormPoint, NormRect, Point, Rect, Size};
pub use host::{
    ClipSources, EditableSurface, FrameScheduler, Layer, OverlayHost, PageSource,
    PersistenceGateway, RenderSurface, ScrollHost, SelectionSource,
};
pub use interaction::{InputEvent, Key, Mode, Modifiers};
pub use layout::{PageLayout, PageMetrics};
pub use rich_text::{FontWeight, StylePatch, TextRun, TextStyle};
pub use scene::{Drawable, Primitive};
pub use store::AnnotationStore;
pub use text_layout::{MonospaceMeasurer, TextMeasurer};
pub use viewport::ViewportWindow;
pub use wire::{Envelope, StoredAnnotation, FORMAT_VERSION};
