//! Input routing and per-tool gesture handling
//!
//! The engine owns a single router: the host forwards every pointer, keyboard,
//! scroll and editor notification to [`AnnotationEngine::handle_input`], which
//! dispatches on the current [`Mode`]. Nothing is attached or detached when
//! the tool changes; switching modes only resets the gesture state.
//!
//! Pointer positions arrive in client space and are converted to document
//! space immediately, so a drag that spans a scroll keeps tracking the pointer.

use crate::annotation::{
    Annotation, AnnotationData, AnnotationId, AnnotationKind, Color, StrokeData, TextBoxData,
};
use crate::engine::AnnotationEngine;
use crate::geometry::{NormPoint, NormRect, Point, Rect, Size};
use crate::highlight::highlights_from_selection;
use crate::scene::Primitive;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

const SELECTION_COLOR: Color = Color::rgb(0x25, 0x63, 0xeb);

/// Padding between selected drawables and their outline / drag handle
const SELECTION_PAD: f64 = 4.0;

/// Active tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Select,
    Ink,
    Highlight,
    Eraser,
    #[serde(rename = "freetext")]
    FreeText,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Select => "select",
            Mode::Ink => "ink",
            Mode::Highlight => "highlight",
            Mode::Eraser => "eraser",
            Mode::FreeText => "freetext",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub meta: bool,
    pub alt: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        shift: false,
        ctrl: false,
        meta: false,
        alt: false,
    };

    pub fn shift() -> Self {
        Self {
            shift: true,
            ..Self::NONE
        }
    }

    pub fn command() -> Self {
        Self {
            ctrl: true,
            ..Self::NONE
        }
    }

    /// Ctrl or Cmd
    pub fn has_command(&self) -> bool {
        self.ctrl || self.meta
    }

    /// Modifier that extends rather than replaces a selection
    pub fn is_additive(&self) -> bool {
        self.shift || self.ctrl || self.meta
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Delete,
    Backspace,
    Escape,
    Character(char),
}

/// Everything the host forwards to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    PointerDown { client: Point, modifiers: Modifiers },
    PointerMove { client: Point, modifiers: Modifiers },
    PointerUp { client: Point, modifiers: Modifiers },
    DoubleClick { client: Point },
    KeyDown { key: Key, modifiers: Modifiers },
    /// Any scroll ancestor scrolled
    Scroll,
    /// Window or container resized
    Resize,
    /// The editable surface's content changed
    TextInput,
    CompositionStart,
    CompositionEnd,
}

impl InputEvent {
    pub fn down(x: f64, y: f64) -> Self {
        InputEvent::PointerDown {
            client: Point::new(x, y),
            modifiers: Modifiers::NONE,
        }
    }

    pub fn moved(x: f64, y: f64) -> Self {
        InputEvent::PointerMove {
            client: Point::new(x, y),
            modifiers: Modifiers::NONE,
        }
    }

    pub fn up(x: f64, y: f64) -> Self {
        InputEvent::PointerUp {
            client: Point::new(x, y),
            modifiers: Modifiers::NONE,
        }
    }

    pub fn key(key: Key, modifiers: Modifiers) -> Self {
        InputEvent::KeyDown { key, modifiers }
    }
}

/// In-progress pointer gesture; document-space coordinates
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) enum Gesture {
    #[default]
    Idle,
    Marquee {
        origin: Point,
        current: Point,
        additive: bool,
    },
    Drag {
        last: Point,
        moved: Point,
    },
    Stroke {
        page: u32,
        points: Vec<Point>,
    },
    Erase {
        erased: HashSet<AnnotationId>,
    },
    BoxCreate {
        page: u32,
        origin: Point,
        current: Point,
    },
}

/// Mode, gesture and selection
#[derive(Debug, Default)]
pub struct InteractionState {
    pub(crate) mode: Mode,
    pub(crate) gesture: Gesture,
    pub(crate) selection: BTreeSet<AnnotationId>,
}

impl InteractionState {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_idle(&self) -> bool {
        self.gesture == Gesture::Idle
    }

    /// Enter a mode: every transient flag and the selection are dropped
    pub(crate) fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        self.reset();
    }

    pub(crate) fn reset(&mut self) {
        self.gesture = Gesture::Idle;
        self.selection.clear();
    }

    pub(crate) fn reset_gesture(&mut self) {
        self.gesture = Gesture::Idle;
    }
}

fn outline(rect: Rect, dashed: bool) -> Primitive {
    Primitive::Rect {
        rect,
        fill: None,
        stroke: Some(SELECTION_COLOR),
        stroke_width: 1.0,
        opacity: 1.0,
        dashed,
    }
}

fn clamp_to(rect: &Rect, point: Point) -> Point {
    Point::new(
        point.x.clamp(rect.x, rect.right()),
        point.y.clamp(rect.y, rect.bottom()),
    )
}

impl AnnotationEngine {
    /// Route one host input event; returns whether the engine consumed it
    pub fn handle_input(&mut self, event: InputEvent) -> bool {
        if !self.is_ready() {
            return false;
        }
        match event {
            InputEvent::PointerDown { client, modifiers } => {
                // a press outside the editor commits it
                self.commit_editor();
                let doc = self.to_document(client);
                match self.interaction.mode {
                    Mode::Select => self.select_down(doc, modifiers),
                    Mode::Ink => self.ink_down(doc),
                    Mode::Highlight => false,
                    Mode::Eraser => self.erase_down(doc),
                    Mode::FreeText => self.box_down(doc),
                }
            }
            InputEvent::PointerMove { client, .. } => {
                let doc = self.to_document(client);
                match self.interaction.mode {
                    Mode::Select => self.select_move(doc),
                    Mode::Ink => self.ink_move(doc),
                    Mode::Highlight => false,
                    Mode::Eraser => self.erase_move(doc),
                    Mode::FreeText => self.box_move(doc),
                }
            }
            InputEvent::PointerUp { client, .. } => {
                let doc = self.to_document(client);
                match self.interaction.mode {
                    Mode::Select => self.select_up(doc),
                    Mode::Ink => self.ink_up(doc),
                    Mode::Highlight => self.highlight_up(),
                    Mode::Eraser => self.erase_up(),
                    Mode::FreeText => self.box_up(doc),
                }
            }
            InputEvent::DoubleClick { client } => {
                let doc = self.to_document(client);
                self.interaction.mode == Mode::Select && self.edit_at(doc)
            }
            InputEvent::KeyDown { key, modifiers } => self.key_down(key, modifiers),
            InputEvent::Scroll | InputEvent::Resize => {
                self.request_viewport_update();
                true
            }
            InputEvent::TextInput => {
                self.editor_input();
                self.editor.is_some()
            }
            InputEvent::CompositionStart => {
                self.editor_composition_start();
                self.editor.is_some()
            }
            InputEvent::CompositionEnd => {
                self.editor_composition_end();
                self.editor.is_some()
            }
        }
    }

    /// Add finished annotations as one undo step
    fn commit_new(&mut self, annotations: Vec<Annotation>) -> Vec<AnnotationId> {
        let ids: Vec<AnnotationId> = annotations.iter().map(|a| a.id.clone()).collect();
        let pages: BTreeSet<u32> = annotations.iter().map(|a| a.page).collect();
        self.history.record(&mut self.store, pages.clone(), |store| {
            for annotation in annotations {
                store.add(annotation);
            }
        });
        self.interaction.reset_gesture();
        self.after_mutation(pages);
        ids
    }

    // ---- select ----------------------------------------------------------

    fn select_down(&mut self, doc: Point, modifiers: Modifiers) -> bool {
        let additive = modifiers.is_additive();

        // the selection's union box is the drag handle
        if !additive {
            if let Some(bounds) = self.scene.bounds_of(&self.interaction.selection) {
                if bounds.inflate(SELECTION_PAD).contains(&doc) {
                    self.interaction.gesture = Gesture::Drag {
                        last: doc,
                        moved: Point::default(),
                    };
                    return true;
                }
            }
        }

        if let Some(id) = self.scene.hit_test(doc).map(|d| d.id.clone()) {
            let mut selection = if additive {
                self.interaction.selection.clone()
            } else {
                BTreeSet::new()
            };
            selection.insert(id);
            self.set_selection_ids(selection);
            self.interaction.gesture = Gesture::Drag {
                last: doc,
                moved: Point::default(),
            };
            return true;
        }

        if !additive {
            self.set_selection_ids(BTreeSet::new());
        }
        self.interaction.gesture = Gesture::Marquee {
            origin: doc,
            current: doc,
            additive,
        };
        self.render_interaction();
        true
    }

    fn select_move(&mut self, doc: Point) -> bool {
        let delta = match &mut self.interaction.gesture {
            Gesture::Marquee { current, .. } => {
                *current = doc;
                None
            }
            Gesture::Drag { last, moved } => {
                let delta = (doc.x - last.x, doc.y - last.y);
                *last = doc;
                moved.x += delta.0;
                moved.y += delta.1;
                Some(delta)
            }
            _ => return false,
        };

        match delta {
            Some((dx, dy)) => {
                self.scene.translate(&self.interaction.selection, dx, dy);
                self.render();
            }
            None => self.render_interaction(),
        }
        true
    }

    fn select_up(&mut self, doc: Point) -> bool {
        match std::mem::take(&mut self.interaction.gesture) {
            Gesture::Marquee {
                origin, additive, ..
            } => {
                let rect = Rect::from_corners(origin, doc);
                let threshold = self.config.click_threshold;
                if rect.width >= threshold || rect.height >= threshold {
                    let mut selection = if additive {
                        self.interaction.selection.clone()
                    } else {
                        BTreeSet::new()
                    };
                    selection.extend(self.scene.intersecting(&rect));
                    self.set_selection_ids(selection);
                }
                self.render_interaction();
                true
            }
            Gesture::Drag { moved, .. } => {
                if moved.x != 0.0 || moved.y != 0.0 {
                    self.commit_move(moved.x, moved.y);
                }
                true
            }
            _ => false,
        }
    }

    /// Turn the drag's pixel delta into per-page fraction deltas and store them
    fn commit_move(&mut self, dx: f64, dy: f64) {
        let ids = self.selection();
        let pages: BTreeSet<u32> = ids.iter().filter_map(|id| self.store.page_of(id)).collect();
        let sizes: BTreeMap<u32, Size> = pages
            .iter()
            .filter_map(|page| Some((*page, self.page_size(*page)?)))
            .collect();
        let clamp = self.config.norm_clamp_max;

        self.history.record(&mut self.store, pages.clone(), |store| {
            for id in &ids {
                let Some(annotation) = store.get_mut(id) else {
                    continue;
                };
                let Some(size) = sizes.get(&annotation.page) else {
                    continue;
                };
                annotation
                    .data
                    .translate(dx / size.width, dy / size.height, clamp);
                annotation.touch();
            }
        });
        debug!("moved {} annotations by ({dx:.1}, {dy:.1})", ids.len());
        self.after_mutation(pages);
    }

    /// Reopen the editor on a text box under the pointer
    fn edit_at(&mut self, doc: Point) -> bool {
        let Some(drawable) = self.scene.hit_test(doc) else {
            return false;
        };
        if drawable.kind != AnnotationKind::FreeText {
            return false;
        }
        let id = drawable.id.clone();
        let pages: BTreeSet<u32> = [drawable.page].into_iter().collect();
        self.interaction.reset_gesture();
        let before = self.store.snapshot(&pages);
        self.open_editor(&id, before)
    }

    // ---- ink -------------------------------------------------------------

    fn ink_down(&mut self, doc: Point) -> bool {
        let Some(page) = self.layout.page_at(doc).map(|m| m.page) else {
            return false;
        };
        self.interaction.gesture = Gesture::Stroke {
            page,
            points: vec![doc],
        };
        self.render_interaction();
        true
    }

    fn ink_move(&mut self, doc: Point) -> bool {
        let min = self.config.min_point_distance;
        let Gesture::Stroke { points, .. } = &mut self.interaction.gesture else {
            return false;
        };
        if points.last().is_some_and(|last| last.distance_to(&doc) < min) {
            return true;
        }
        points.push(doc);
        self.render_interaction();
        true
    }

    fn ink_up(&mut self, doc: Point) -> bool {
        let gesture = std::mem::take(&mut self.interaction.gesture);
        let Gesture::Stroke { page, mut points } = gesture else {
            return false;
        };
        if points
            .last()
            .map_or(true, |last| last.distance_to(&doc) >= self.config.min_point_distance)
        {
            points.push(doc);
        }
        let Some(metrics) = self.layout.get(page).copied() else {
            self.render_interaction();
            return false;
        };

        let size = metrics.size();
        let clamp = self.config.norm_clamp_max;
        let stroke = StrokeData {
            points: points
                .iter()
                .map(|p| NormPoint::from_pixels(metrics.to_page(*p), size).clamped(clamp))
                .collect(),
            color: self.config.ink.color,
            width: self.config.ink.width / size.width,
            opacity: 1.0,
        };
        debug!("ink stroke with {} points on page {page}", stroke.points.len());
        self.commit_new(vec![Annotation::new(page, AnnotationData::Ink(stroke))]);
        true
    }

    // ---- highlight -------------------------------------------------------

    /// Convert the native text selection into one highlight per page
    fn highlight_up(&mut self) -> bool {
        let Some(source) = self.hosts.selection.as_deref() else {
            return false;
        };
        let rects = source.client_rects();
        if rects.is_empty() {
            return false;
        }
        let highlights = highlights_from_selection(
            &rects,
            &self.layout,
            self.container_origin(),
            &self.config.highlight,
            &self.config.merge,
            self.config.norm_clamp_max,
        );
        if highlights.is_empty() {
            return false;
        }
        if let Some(source) = self.hosts.selection.as_deref_mut() {
            source.clear();
        }
        debug!("highlighting selection on {} pages", highlights.len());
        self.commit_new(highlights);
        true
    }

    // ---- eraser ----------------------------------------------------------

    fn erase_down(&mut self, doc: Point) -> bool {
        self.interaction.gesture = Gesture::Erase {
            erased: HashSet::new(),
        };
        self.erase_at(doc);
        true
    }

    fn erase_move(&mut self, doc: Point) -> bool {
        if !matches!(self.interaction.gesture, Gesture::Erase { .. }) {
            return false;
        }
        self.erase_at(doc);
        true
    }

    fn erase_up(&mut self) -> bool {
        matches!(
            std::mem::take(&mut self.interaction.gesture),
            Gesture::Erase { .. }
        )
    }

    /// Canvas drawables first, then overlay highlights
    fn erase_at(&mut self, doc: Point) {
        let hit = self
            .scene
            .hit_test(doc)
            .map(|d| d.id.clone())
            .or_else(|| self.overlay.hit_test(doc, &self.layout).cloned());
        let Some(id) = hit else {
            return;
        };
        let Gesture::Erase { erased } = &mut self.interaction.gesture else {
            return;
        };
        if !erased.insert(id.clone()) {
            return;
        }
        let Some(page) = self.store.page_of(&id) else {
            return;
        };

        let pages: BTreeSet<u32> = [page].into_iter().collect();
        self.history.record(&mut self.store, pages.clone(), |store| {
            store.remove(&id);
        });
        debug!("erased {id}");
        self.after_mutation(pages);
    }

    // ---- freetext --------------------------------------------------------

    fn box_down(&mut self, doc: Point) -> bool {
        let Some(page) = self.layout.page_at(doc).map(|m| m.page) else {
            return false;
        };
        self.interaction.gesture = Gesture::BoxCreate {
            page,
            origin: doc,
            current: doc,
        };
        self.render_interaction();
        true
    }

    fn box_move(&mut self, doc: Point) -> bool {
        let Gesture::BoxCreate { page, current, .. } = &mut self.interaction.gesture else {
            return false;
        };
        let Some(metrics) = self.layout.get(*page) else {
            return false;
        };
        *current = clamp_to(&metrics.rect(), doc);
        self.render_interaction();
        true
    }

    /// Create the box at its minimum size or larger and open the editor on it
    fn box_up(&mut self, doc: Point) -> bool {
        let gesture = std::mem::take(&mut self.interaction.gesture);
        let Gesture::BoxCreate { page, origin, .. } = gesture else {
            return false;
        };
        let Some(metrics) = self.layout.get(page).copied() else {
            self.render_interaction();
            return false;
        };

        let page_rect = metrics.rect();
        let drawn = Rect::from_corners(origin, clamp_to(&page_rect, doc));
        let config = &self.config.text_box;
        let width = drawn.width.max(config.min_width).min(page_rect.width);
        let height = drawn.height.max(config.min_height).min(page_rect.height);
        // keep the enlarged box on its page
        let x = drawn.x.min(page_rect.right() - width).max(page_rect.x);
        let y = drawn.y.min(page_rect.bottom() - height).max(page_rect.y);

        let local = Rect::new(x - metrics.x, y - metrics.y, width, height);
        let annotation = Annotation::new(
            page,
            AnnotationData::TextBox(TextBoxData {
                rect: NormRect::from_pixels(local, metrics.size())
                    .clamped(self.config.norm_clamp_max),
                runs: Vec::new(),
            }),
        );
        let id = annotation.id.clone();
        let pages: BTreeSet<u32> = [page].into_iter().collect();
        let before = self.store.snapshot(&pages);

        // the undo entry is pushed when the editor commits
        self.store.add(annotation);
        if !self.open_editor(&id, before) {
            self.store.remove(&id);
            self.render_interaction();
            return false;
        }
        true
    }

    // ---- keyboard --------------------------------------------------------

    fn key_down(&mut self, key: Key, modifiers: Modifiers) -> bool {
        if self.editor.is_some() {
            // typing belongs to the editable surface
            if key == Key::Escape {
                self.commit_editor();
                return true;
            }
            return false;
        }

        match key {
            Key::Delete | Key::Backspace => self.delete_selected() > 0,
            Key::Escape => {
                let busy = !self.interaction.is_idle() || !self.interaction.selection.is_empty();
                self.interaction.reset_gesture();
                self.set_selection_ids(BTreeSet::new());
                self.sync_all();
                busy
            }
            Key::Character(c) if modifiers.has_command() => match c.to_ascii_lowercase() {
                'z' if modifiers.shift => self.redo(),
                'z' => self.undo(),
                'y' => self.redo(),
                'c' => self.copy_selected_to_clipboard() > 0,
                'x' => self.cut_selected_to_clipboard() > 0,
                'v' => {
                    let target = self.focused_page();
                    !self.paste_from_clipboard(target).is_empty()
                }
                _ => false,
            },
            _ => false,
        }
    }

    // ---- previews --------------------------------------------------------

    /// Interaction-layer content: gesture previews and the selection outline
    pub(crate) fn interaction_primitives(&self) -> Vec<Primitive> {
        let mut primitives = Vec::new();
        match &self.interaction.gesture {
            Gesture::Marquee {
                origin, current, ..
            }
            | Gesture::BoxCreate {
                origin, current, ..
            } => primitives.push(outline(Rect::from_corners(*origin, *current), true)),
            Gesture::Stroke { points, .. } => primitives.push(Primitive::Polyline {
                points: points.clone(),
                width: self.config.ink.width,
                color: self.config.ink.color,
                opacity: 1.0,
            }),
            Gesture::Idle | Gesture::Drag { .. } | Gesture::Erase { .. } => {}
        }
        if self.interaction.mode == Mode::Select {
            if let Some(bounds) = self.scene.bounds_of(&self.interaction.selection) {
                primitives.push(outline(bounds.inflate(SELECTION_PAD), false));
            }
        }
        primitives
    }
}
