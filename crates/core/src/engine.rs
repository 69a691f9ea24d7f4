//! Annotation engine
//!
//! Owns the store, the derived scene and every piece of transient state, and
//! exposes the operations a toolbar drives. Host capabilities arrive as boxed
//! trait objects in [`Hosts`]; any of them may be absent, in which case the
//! matching behavior is skipped.
//!
//! The engine is single-threaded. Work that the host performs asynchronously
//! (loading, frame callbacks) re-enters through methods that check the
//! lifecycle and the load generation before touching state.

use crate::annotation::{Annotation, AnnotationData, AnnotationId};
use crate::clipboard::Clipboard;
use crate::config::{EngineConfig, HighlightSettings, InkSettings};
use crate::editor::{EditorOutcome, EditorSession};
use crate::error::{EngineError, EngineResult, GatewayError, GatewayResult};
use crate::events::{EngineEvent, EventKind, ListenerId, Listeners};
use crate::geometry::{Point, Size};
use crate::highlight::HighlightOverlay;
use crate::history::{UndoEntry, UndoManager};
use crate::host::{
    EditableSurface, FrameScheduler, Layer, OverlayHost, PageSource, PersistenceGateway,
    RenderSurface, ScrollHost, SelectionSource,
};
use crate::interaction::{InteractionState, Mode};
use crate::layout::PageLayout;
use crate::rich_text::{StylePatch, TextStyle};
use crate::scene::Scene;
use crate::store::{AnnotationStore, PageSnapshot};
use crate::text_layout::{MonospaceMeasurer, TextMeasurer};
use crate::viewport::{FrameCoalescer, ViewportManager, ViewportWindow};
use crate::wire::{from_stored, to_stored, LegacyDefaults, StoredAnnotation};
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Host collaborators; every one is optional
#[derive(Default)]
pub struct Hosts {
    pub pages: Option<Box<dyn PageSource>>,
    pub scroll: Option<Box<dyn ScrollHost>>,
    pub surface: Option<Box<dyn RenderSurface>>,
    pub scheduler: Option<Box<dyn FrameScheduler>>,
    pub selection: Option<Box<dyn SelectionSource>>,
    pub overlay: Option<Box<dyn OverlayHost>>,
    pub editable: Option<Box<dyn EditableSurface>>,
    pub gateway: Option<Box<dyn PersistenceGateway>>,
}

impl Hosts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pages(mut self, pages: impl PageSource + 'static) -> Self {
        self.pages = Some(Box::new(pages));
        self
    }

    pub fn with_scroll(mut self, scroll: impl ScrollHost + 'static) -> Self {
        self.scroll = Some(Box::new(scroll));
        self
    }

    pub fn with_surface(mut self, surface: impl RenderSurface + 'static) -> Self {
        self.surface = Some(Box::new(surface));
        self
    }

    pub fn with_scheduler(mut self, scheduler: impl FrameScheduler + 'static) -> Self {
        self.scheduler = Some(Box::new(scheduler));
        self
    }

    pub fn with_selection(mut self, selection: impl SelectionSource + 'static) -> Self {
        self.selection = Some(Box::new(selection));
        self
    }

    pub fn with_overlay(mut self, overlay: impl OverlayHost + 'static) -> Self {
        self.overlay = Some(Box::new(overlay));
        self
    }

    pub fn with_editable(mut self, editable: impl EditableSurface + 'static) -> Self {
        self.editable = Some(Box::new(editable));
        self
    }

    pub fn with_gateway(mut self, gateway: impl PersistenceGateway + 'static) -> Self {
        self.gateway = Some(Box::new(gateway));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Ready,
    Destroyed,
}

/// Proof of a started load; only the newest ticket may complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
}

impl LoadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

fn guarded(label: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        warn!("{label} panicked during teardown; ignored");
    }
}

pub struct AnnotationEngine {
    document_id: String,
    user_id: String,
    pub(crate) config: EngineConfig,
    pub(crate) hosts: Hosts,
    pub(crate) measurer: Box<dyn TextMeasurer>,
    pub(crate) store: AnnotationStore,
    pub(crate) layout: PageLayout,
    pub(crate) scene: Scene,
    pub(crate) overlay: HighlightOverlay,
    pub(crate) history: UndoManager,
    pub(crate) interaction: InteractionState,
    pub(crate) editor: Option<EditorSession>,
    viewport: ViewportManager,
    frames: FrameCoalescer,
    clipboard: Clipboard,
    listeners: Listeners,
    cleanups: Vec<Box<dyn FnOnce()>>,
    lifecycle: Lifecycle,
    generation: u64,
    dirty: bool,
}

impl AnnotationEngine {
    pub fn new(
        document_id: impl Into<String>,
        user_id: impl Into<String>,
        config: EngineConfig,
        hosts: Hosts,
    ) -> Self {
        let history = UndoManager::new(config.undo_depth);
        Self {
            document_id: document_id.into(),
            user_id: user_id.into(),
            config,
            hosts,
            measurer: Box::new(MonospaceMeasurer::default()),
            store: AnnotationStore::new(),
            layout: PageLayout::default(),
            scene: Scene::new(),
            overlay: HighlightOverlay::new(),
            history,
            interaction: InteractionState::default(),
            editor: None,
            viewport: ViewportManager::new(),
            frames: FrameCoalescer::new(),
            clipboard: Clipboard::new(),
            listeners: Listeners::new(),
            cleanups: Vec::new(),
            lifecycle: Lifecycle::Created,
            generation: 0,
            dirty: false,
        }
    }

    /// Replace the headless text measurer with the host's font metrics
    pub fn with_measurer(mut self, measurer: impl TextMeasurer + 'static) -> Self {
        self.measurer = Box::new(measurer);
        self
    }

    // ---- lifecycle -------------------------------------------------------

    /// Compute layout, size the surface and load the document's annotations
    ///
    /// A gateway failure leaves the store empty and is returned to the caller.
    pub fn init(&mut self) -> EngineResult<usize> {
        let ticket = self.begin_load()?;
        let result = match self.hosts.gateway.as_deref() {
            Some(gateway) => gateway.load(&self.document_id, &self.user_id),
            None => Ok(BTreeMap::new()),
        };
        self.complete_load(ticket, result)?;
        Ok(self.store.len())
    }

    /// Activate the engine and start a load performed by the host
    pub fn begin_load(&mut self) -> EngineResult<LoadTicket> {
        if self.lifecycle == Lifecycle::Destroyed {
            return Err(EngineError::Destroyed);
        }
        if self.lifecycle == Lifecycle::Created {
            self.activate();
        }
        self.generation += 1;
        debug!("load started for {} (generation {})", self.document_id, self.generation);
        Ok(LoadTicket {
            generation: self.generation,
        })
    }

    /// Apply a load result
    ///
    /// Returns `Ok(false)` when the ticket is stale (a newer load started or the
    /// engine was destroyed) and the result was discarded.
    pub fn complete_load(
        &mut self,
        ticket: LoadTicket,
        result: GatewayResult<BTreeMap<u32, Vec<StoredAnnotation>>>,
    ) -> EngineResult<bool> {
        if self.lifecycle == Lifecycle::Destroyed || ticket.generation != self.generation {
            debug!(
                "discarding stale load (ticket {}, current {})",
                ticket.generation, self.generation
            );
            return Ok(false);
        }

        self.commit_editor();
        self.interaction.reset();
        self.history.clear();
        self.store.clear();

        let records = match result {
            Ok(records) => records,
            Err(err) => {
                warn!("annotation load failed for {}: {err}", self.document_id);
                self.dirty = false;
                self.sync_all();
                return Err(EngineError::Load(err));
            }
        };

        let defaults = self.legacy_defaults();
        let mut loaded: BTreeMap<u32, Vec<Annotation>> = BTreeMap::new();
        {
            let pages = self.hosts.pages.as_deref();
            let layout = &self.layout;
            let page_size = |page: u32| {
                pages
                    .and_then(|p| p.page_viewport(page))
                    .or_else(|| layout.get(page).map(|m| m.size()))
            };
            for record in records.values().flatten() {
                match from_stored(record, &page_size, &defaults) {
                    Ok(annotation) => loaded.entry(annotation.page).or_default().push(annotation),
                    Err(err) => warn!("dropping annotation {}: {err}", record.id),
                }
            }
        }

        self.store = AnnotationStore::from_pages(loaded);
        self.dirty = false;
        self.sync_all();
        let count = self.store.len();
        debug!("loaded {count} annotations for {}", self.document_id);
        self.emit(EngineEvent::Loaded { count });
        Ok(true)
    }

    fn activate(&mut self) {
        self.lifecycle = Lifecycle::Ready;
        if let Some(pages) = self.hosts.pages.as_deref() {
            self.layout = PageLayout::compute(pages, &self.config.layout);
        }
        self.viewport.invalidate();
        self.update_viewport();
        let passthrough = self.interaction.mode == Mode::Highlight;
        if let Some(surface) = self.hosts.surface.as_deref_mut() {
            surface.set_pointer_passthrough(passthrough);
        }
    }

    /// Tear down: cancel pending work, clear host output and run cleanup closures
    ///
    /// Panics raised by host callbacks during teardown are caught and logged.
    /// Safe to call more than once.
    pub fn destroy(&mut self) {
        if self.lifecycle == Lifecycle::Destroyed {
            return;
        }
        debug!("destroying engine for {}", self.document_id);
        self.lifecycle = Lifecycle::Destroyed;
        self.generation += 1;
        self.frames.cancel();
        self.interaction.reset();
        self.editor = None;
        self.scene.clear();

        let overlay = &mut self.overlay;
        let overlay_host = self.hosts.overlay.as_deref_mut();
        guarded("overlay teardown", || overlay.clear(overlay_host));

        if let Some(surface) = self.hosts.surface.as_deref_mut() {
            guarded("surface teardown", || {
                surface.present(Layer::Scene, &[]);
                surface.present(Layer::Interaction, &[]);
            });
        }
        for cleanup in self.cleanups.drain(..) {
            guarded("cleanup", cleanup);
        }
        self.listeners.clear();
    }

    /// Register a closure run once by [`AnnotationEngine::destroy`], e.g. to
    /// detach host scroll and resize listeners
    pub fn add_cleanup(&mut self, cleanup: impl FnOnce() + 'static) {
        if self.lifecycle == Lifecycle::Destroyed {
            guarded("cleanup", cleanup);
            return;
        }
        self.cleanups.push(Box::new(cleanup));
    }

    pub fn is_destroyed(&self) -> bool {
        self.lifecycle == Lifecycle::Destroyed
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.lifecycle == Lifecycle::Ready
    }

    fn ensure_ready(&self) -> EngineResult<()> {
        match self.lifecycle {
            Lifecycle::Ready => Ok(()),
            Lifecycle::Created => Err(EngineError::NotInitialized),
            Lifecycle::Destroyed => Err(EngineError::Destroyed),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    // ---- modes and settings ----------------------------------------------

    pub fn mode(&self) -> Mode {
        self.interaction.mode
    }

    /// Switch tools; resets gestures, clears the selection and closes the editor
    pub fn set_mode(&mut self, mode: Mode) {
        let previous = self.interaction.mode;
        if self.is_destroyed() || previous == mode {
            return;
        }
        self.commit_editor();
        let had_selection = !self.interaction.selection.is_empty();
        self.interaction.set_mode(mode);
        if let Some(surface) = self.hosts.surface.as_deref_mut() {
            surface.set_pointer_passthrough(mode == Mode::Highlight);
        }
        if self.is_ready() {
            // a drag preview may have moved drawables away from the store
            self.sync_all();
        }
        debug!("mode {previous} -> {mode}");
        self.emit(EngineEvent::ModeChanged { mode, previous });
        if had_selection {
            self.emit(EngineEvent::SelectionChanged {
                selected: Vec::new(),
            });
        }
    }

    pub fn ink_settings(&self) -> InkSettings {
        self.config.ink
    }

    pub fn set_ink_settings(&mut self, settings: InkSettings) {
        let width = if settings.width.is_finite() && settings.width > 0.0 {
            settings.width
        } else {
            self.config.ink.width
        };
        self.config.ink = InkSettings {
            color: settings.color,
            width,
        };
    }

    pub fn highlight_settings(&self) -> HighlightSettings {
        self.config.highlight
    }

    pub fn set_highlight_settings(&mut self, settings: HighlightSettings) {
        let opacity = if settings.opacity.is_nan() {
            self.config.highlight.opacity
        } else {
            settings.opacity.clamp(0.0, 1.0)
        };
        self.config.highlight = HighlightSettings {
            color: settings.color,
            opacity,
        };
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ---- layout and viewport ---------------------------------------------

    /// Re-read page geometry with new fallback padding and gap
    pub fn update_pages_from_pdf_layout(&mut self, padding: f64, gap: f64) {
        self.config.layout.padding = padding;
        self.config.layout.gap = gap;
        self.refresh_layout();
    }

    /// Recompute page metrics after a zoom, resize or page-count change and
    /// rebuild every drawable
    pub fn refresh_layout(&mut self) {
        if !self.is_ready() {
            return;
        }
        let Some(pages) = self.hosts.pages.as_deref() else {
            return;
        };
        self.layout = PageLayout::compute(pages, &self.config.layout);
        self.viewport.invalidate();
        self.update_viewport();
        self.sync_all();
    }

    /// Ask for a viewport update on the next animation frame; bursts coalesce
    pub fn request_viewport_update(&mut self) {
        if !self.is_ready() {
            return;
        }
        self.frames.request(self.hosts.scheduler.as_deref_mut());
    }

    /// Frame callback scheduled through [`FrameScheduler`]
    pub fn on_animation_frame(&mut self) {
        if !self.is_ready() {
            return;
        }
        if self.frames.take() {
            self.update_viewport();
        }
    }

    fn update_viewport(&mut self) {
        let clip = self.hosts.scroll.as_ref().and_then(|s| s.clip_sources());
        let content = self.layout.content_size();
        self.viewport
            .update(clip, content, self.hosts.surface.as_deref_mut());
    }

    pub fn viewport_window(&self) -> Option<ViewportWindow> {
        self.viewport.current()
    }

    /// Client position of the document container, or the client origin when unmounted
    pub(crate) fn container_origin(&self) -> Point {
        self.hosts
            .scroll
            .as_ref()
            .and_then(|s| s.clip_sources())
            .map(|c| c.container_origin)
            .unwrap_or_default()
    }

    /// Client point → document point
    pub(crate) fn to_document(&self, client: Point) -> Point {
        let origin = self.container_origin();
        Point::new(client.x - origin.x, client.y - origin.y)
    }

    pub(crate) fn page_count(&self) -> u32 {
        self.hosts.pages.as_ref().map(|p| p.page_count()).unwrap_or(0)
    }

    /// Page under the center of the visible window
    pub(crate) fn focused_page(&self) -> Option<u32> {
        let window = self.viewport.current()?.rect();
        let center = Point::new(window.x + window.width / 2.0, window.center_y());
        self.layout
            .page_at(center)
            .map(|m| m.page)
            .or_else(|| self.layout.pages_in(&window).first().copied())
    }

    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn overlay(&self) -> &HighlightOverlay {
        &self.overlay
    }

    // ---- selection -------------------------------------------------------

    pub fn selection(&self) -> Vec<AnnotationId> {
        self.interaction.selection.iter().cloned().collect()
    }

    /// Replace the selection; ids without a drawable are ignored
    pub fn set_selection(&mut self, ids: impl IntoIterator<Item = AnnotationId>) {
        let scene = &self.scene;
        let ids: BTreeSet<AnnotationId> = ids
            .into_iter()
            .filter(|id| scene.get(id).is_some())
            .collect();
        self.set_selection_ids(ids);
    }

    pub(crate) fn set_selection_ids(&mut self, ids: BTreeSet<AnnotationId>) {
        if self.interaction.selection == ids {
            return;
        }
        self.interaction.selection = ids;
        self.render_interaction();
        let selected = self.selection();
        self.emit(EngineEvent::SelectionChanged { selected });
    }

    // ---- editing operations ----------------------------------------------

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> bool {
        if !self.is_ready() {
            return false;
        }
        self.commit_editor();
        self.interaction.reset_gesture();
        let Some(pages) = self.history.undo(&mut self.store) else {
            return false;
        };
        debug!("undo on pages {pages:?}");
        self.after_mutation(pages);
        true
    }

    pub fn redo(&mut self) -> bool {
        if !self.is_ready() {
            return false;
        }
        self.commit_editor();
        self.interaction.reset_gesture();
        let Some(pages) = self.history.redo(&mut self.store) else {
            return false;
        };
        debug!("redo on pages {pages:?}");
        self.after_mutation(pages);
        true
    }

    /// Remove every selected annotation as one undo step
    pub fn delete_selected(&mut self) -> usize {
        if !self.is_ready() || self.interaction.selection.is_empty() {
            return 0;
        }
        let ids = self.selection();
        let pages: BTreeSet<u32> = ids.iter().filter_map(|id| self.store.page_of(id)).collect();
        let removed = self.history.record(&mut self.store, pages.clone(), |store| {
            ids.iter().filter(|id| store.remove(id).is_some()).count()
        });
        debug!("deleted {removed} annotations");
        self.set_selection_ids(BTreeSet::new());
        self.after_mutation(pages);
        removed
    }

    fn selected_annotations(&self) -> Vec<Annotation> {
        self.interaction
            .selection
            .iter()
            .filter_map(|id| self.store.get(id).cloned())
            .collect()
    }

    pub fn copy_selected_to_clipboard(&mut self) -> usize {
        if !self.is_ready() {
            return 0;
        }
        let items = self.selected_annotations();
        let count = items.len();
        if count > 0 {
            self.clipboard.copy(items);
        }
        count
    }

    pub fn cut_selected_to_clipboard(&mut self) -> usize {
        if !self.is_ready() {
            return 0;
        }
        let items = self.selected_annotations();
        if items.is_empty() {
            return 0;
        }
        self.clipboard.cut(items);
        self.delete_selected()
    }

    /// Paste fresh copies, onto `target_page` or each copy's source page
    ///
    /// The pasted annotations become the selection in select mode.
    pub fn paste_from_clipboard(&mut self, target_page: Option<u32>) -> Vec<AnnotationId> {
        if !self.is_ready() || self.clipboard.is_empty() {
            return Vec::new();
        }
        if let Some(page) = target_page {
            let count = self.page_count();
            if page == 0 || (count > 0 && page > count) {
                return Vec::new();
            }
        }
        self.commit_editor();

        let pasted = self.clipboard.paste(
            target_page,
            self.config.paste_nudge,
            self.config.norm_clamp_max,
        );
        let ids: Vec<AnnotationId> = pasted.iter().map(|a| a.id.clone()).collect();
        let pages: BTreeSet<u32> = pasted.iter().map(|a| a.page).collect();
        self.history.record(&mut self.store, pages.clone(), |store| {
            for annotation in pasted {
                store.add(annotation);
            }
        });
        debug!("pasted {} annotations", ids.len());
        self.after_mutation(pages);
        if self.interaction.mode == Mode::Select {
            self.set_selection(ids.clone());
        }
        ids
    }

    /// Commit a finished mutation: mark dirty, rebuild and notify
    pub(crate) fn after_mutation(&mut self, pages: BTreeSet<u32>) {
        self.dirty = true;
        self.sync_all();
        self.emit(EngineEvent::StoreChanged { pages });
    }

    // ---- rich-text editor ------------------------------------------------

    pub fn editor(&self) -> Option<&EditorSession> {
        self.editor.as_ref()
    }

    pub(crate) fn default_text_style(&self) -> TextStyle {
        TextStyle::new(self.config.text_box.color, self.config.text_box.default_font_size)
    }

    /// Open the editor over a text box; `before` is the page state the eventual
    /// commit is undone to
    pub(crate) fn open_editor(&mut self, id: &AnnotationId, before: PageSnapshot) -> bool {
        self.commit_editor();
        let default_style = self.default_text_style();
        let Some(annotation) = self.store.get(id) else {
            return false;
        };
        let Some(size) = self.layout.get(annotation.page).map(|m| m.size()) else {
            return false;
        };
        let Some(session) = EditorSession::open(
            annotation,
            size,
            default_style,
            before,
            self.hosts.editable.as_deref_mut(),
        ) else {
            return false;
        };
        debug!("editor opened on {id}");
        self.scene.set_hidden(Some(id.clone()));
        self.editor = Some(session);
        self.set_selection_ids(BTreeSet::new());
        self.sync_all();
        self.emit(EngineEvent::EditorOpened { id: id.clone() });
        true
    }

    /// Forward an input notification from the editable surface
    pub fn editor_input(&mut self) {
        if let (Some(session), Some(surface)) =
            (self.editor.as_mut(), self.hosts.editable.as_deref_mut())
        {
            session.on_input(surface);
        }
    }

    pub fn editor_composition_start(&mut self) {
        if let Some(session) = self.editor.as_mut() {
            session.composition_start();
        }
    }

    pub fn editor_composition_end(&mut self) {
        if let (Some(session), Some(surface)) =
            (self.editor.as_mut(), self.hosts.editable.as_deref_mut())
        {
            session.composition_end(surface);
        }
    }

    /// Style the editor's selected text (or the next typed text)
    pub fn apply_text_style(&mut self, patch: StylePatch) {
        if let (Some(session), Some(surface)) =
            (self.editor.as_mut(), self.hosts.editable.as_deref_mut())
        {
            session.apply_style(&patch, surface);
        }
    }

    /// Close the open editor, storing its text or removing an empty box
    ///
    /// Returns `true` if the box was kept.
    pub fn commit_editor(&mut self) -> bool {
        let Some(session) = self.editor.take() else {
            return false;
        };
        let id = session.annotation_id().clone();
        let page = session.page();
        let (outcome, before) = session.finish(
            self.hosts.editable.as_deref_mut(),
            &self.config.text_box,
            self.measurer.as_ref(),
            self.config.norm_clamp_max,
        );

        let kept = match outcome {
            EditorOutcome::Empty => {
                self.store.remove(&id);
                false
            }
            EditorOutcome::Commit(data) => {
                if let Some(annotation) = self.store.get_mut(&id) {
                    let data = AnnotationData::TextBox(data);
                    if annotation.data != data {
                        annotation.data = data;
                        annotation.touch();
                    }
                }
                true
            }
        };

        let pages: BTreeSet<u32> = [page].into_iter().collect();
        let after = self.store.snapshot(&pages);
        let recorded = self.history.push(UndoEntry {
            pages: pages.clone(),
            before,
            after,
        });
        self.scene.set_hidden(None);
        debug!("editor closed on {id} (kept: {kept}, recorded: {recorded})");
        if recorded {
            self.after_mutation(pages);
        } else {
            self.sync_all();
        }
        self.emit(EngineEvent::EditorClosed { id, kept });
        kept
    }

    // ---- persistence -----------------------------------------------------

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write the whole store through the gateway
    pub fn save(&mut self) -> EngineResult<usize> {
        self.ensure_ready()?;
        self.commit_editor();

        let mut pages: BTreeMap<u32, Vec<StoredAnnotation>> = BTreeMap::new();
        for annotation in self.store.iter() {
            let mut record = to_stored(annotation, self.config.norm_clamp_max)
                .map_err(|err| EngineError::Save(GatewayError::Serde(err)))?;
            record.author_id.get_or_insert_with(|| self.user_id.clone());
            pages.entry(annotation.page).or_default().push(record);
        }
        let count = pages.values().map(Vec::len).sum();

        let gateway = self.hosts.gateway.as_deref().ok_or(EngineError::NoGateway)?;
        gateway
            .save(&self.document_id, &self.user_id, &pages)
            .map_err(|err| {
                warn!("annotation save failed for {}: {err}", self.document_id);
                EngineError::Save(err)
            })?;

        self.dirty = false;
        debug!("saved {count} annotations for {}", self.document_id);
        self.emit(EngineEvent::Saved { count });
        Ok(count)
    }

    fn legacy_defaults(&self) -> LegacyDefaults {
        LegacyDefaults {
            ink_color: self.config.ink.color,
            ink_width_px: self.config.ink.width,
            highlight_color: self.config.highlight.color,
            highlight_opacity: self.config.highlight.opacity,
            text_color: self.config.text_box.color,
            font_size_px: self.config.text_box.default_font_size,
        }
    }

    // ---- events ----------------------------------------------------------

    pub fn on(
        &mut self,
        kind: EventKind,
        handler: impl FnMut(&EngineEvent) + 'static,
    ) -> ListenerId {
        self.listeners.add(kind, handler)
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub(crate) fn emit(&mut self, event: EngineEvent) {
        self.listeners.emit(&event);
    }

    // ---- rendering -------------------------------------------------------

    /// Rebuild drawables and overlays from the store and repaint
    pub(crate) fn sync_all(&mut self) {
        self.scene
            .sync(&self.store, &self.layout, &self.config, self.measurer.as_ref());
        self.overlay
            .sync(&self.store, &self.layout, self.hosts.overlay.as_deref_mut());

        let scene = &self.scene;
        let before = self.interaction.selection.len();
        self.interaction.selection.retain(|id| scene.get(id).is_some());
        if self.interaction.selection.len() != before {
            let selected = self.selection();
            self.emit(EngineEvent::SelectionChanged { selected });
        }
        self.render();
    }

    pub(crate) fn render(&mut self) {
        let primitives = self.scene.primitives();
        if let Some(surface) = self.hosts.surface.as_deref_mut() {
            surface.present(Layer::Scene, &primitives);
        }
        self.render_interaction();
    }

    pub(crate) fn render_interaction(&mut self) {
        let primitives = self.interaction_primitives();
        if let Some(surface) = self.hosts.surface.as_deref_mut() {
            surface.present(Layer::Interaction, &primitives);
        }
    }

    pub(crate) fn page_size(&self, page: u32) -> Option<Size> {
        self.layout.get(page).map(|m| m.size())
    }
}

impl Drop for AnnotationEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for AnnotationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationEngine")
            .field("document_id", &self.document_id)
            .field("user_id", &self.user_id)
            .field("lifecycle", &self.lifecycle)
            .field("generation", &self.generation)
            .field("mode", &self.interaction.mode)
            .field("annotations", &self.store.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}
