//! End-to-end engine scenarios against in-memory hosts

use markup_core::annotation::{Annotation, AnnotationData, AnnotationKind};
use markup_core::engine::{AnnotationEngine, Hosts};
use markup_core::error::{EngineError, GatewayError, GatewayResult};
use markup_core::events::{EngineEvent, EventKind};
use markup_core::geometry::{Point, Rect, Size};
use markup_core::highlight::OverlayElement;
use markup_core::host::{
    ClipSources, EditableSurface, FrameScheduler, Layer, OverlayHost, PageSource,
    PersistenceGateway, RenderSurface, ScrollHost, SelectionSource,
};
use markup_core::interaction::{InputEvent, Key, Mode, Modifiers};
use markup_core::rich_text::{StylePatch, TextRun};
use markup_core::scene::Primitive;
use markup_core::wire::StoredAnnotation;
use markup_core::EngineConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::rc::Rc;

const PAGE_W: f64 = 600.0;
const PAGE_H: f64 = 800.0;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Default)]
struct HostState {
    zoom: f64,
    page_count: u32,
    origin: Point,
    frames_requested: usize,
    camera: Option<Point>,
    scene_presents: usize,
    last_scene: Vec<Primitive>,
    passthrough: bool,
    selection_rects: Vec<Rect>,
    selection_cleared: bool,
    mounted: BTreeMap<u32, Vec<OverlayElement>>,
    text: String,
    caret: Option<Range<usize>>,
}

type Shared = Rc<RefCell<HostState>>;

struct Pages(Shared);

impl PageSource for Pages {
    fn page_count(&self) -> u32 {
        self.0.borrow().page_count
    }

    fn page_viewport(&self, page: u32) -> Option<Size> {
        let state = self.0.borrow();
        (page >= 1 && page <= state.page_count)
            .then(|| Size::new(PAGE_W * state.zoom, PAGE_H * state.zoom))
    }
}

struct Scroll(Shared);

impl ScrollHost for Scroll {
    fn clip_sources(&self) -> Option<ClipSources> {
        Some(ClipSources {
            window: Rect::new(0.0, 0.0, 800.0, 600.0),
            horizontal: None,
            vertical: None,
            container_origin: self.0.borrow().origin,
        })
    }
}

struct Surface(Shared);

impl RenderSurface for Surface {
    fn resize(&mut self, _size: Size) {}

    fn set_position(&mut self, _offset: Point) {}

    fn set_camera(&mut self, translation: Point) {
        self.0.borrow_mut().camera = Some(translation);
    }

    fn set_pointer_passthrough(&mut self, passthrough: bool) {
        self.0.borrow_mut().passthrough = passthrough;
    }

    fn present(&mut self, layer: Layer, primitives: &[Primitive]) {
        if layer == Layer::Scene {
            let mut state = self.0.borrow_mut();
            state.scene_presents += 1;
            state.last_scene = primitives.to_vec();
        }
    }
}

struct Scheduler(Shared);

impl FrameScheduler for Scheduler {
    fn request_frame(&mut self) {
        self.0.borrow_mut().frames_requested += 1;
    }
}

struct Selection(Shared);

impl SelectionSource for Selection {
    fn client_rects(&self) -> Vec<Rect> {
        self.0.borrow().selection_rects.clone()
    }

    fn clear(&mut self) {
        let mut state = self.0.borrow_mut();
        state.selection_rects.clear();
        state.selection_cleared = true;
    }
}

struct Overlay(Shared);

impl OverlayHost for Overlay {
    fn mount(&mut self, page: u32, elements: &[OverlayElement]) -> bool {
        self.0.borrow_mut().mounted.insert(page, elements.to_vec());
        true
    }

    fn unmount(&mut self, page: u32) {
        self.0.borrow_mut().mounted.remove(&page);
    }
}

struct Editable(Shared);

impl EditableSurface for Editable {
    fn plain_text(&self) -> String {
        self.0.borrow().text.clone()
    }

    fn selection(&self) -> Option<Range<usize>> {
        self.0.borrow().caret.clone()
    }

    fn set_selection(&mut self, range: Range<usize>) {
        self.0.borrow_mut().caret = Some(range);
    }

    fn present_runs(&mut self, _runs: &[TextRun]) {}
}

type Sets = Rc<RefCell<HashMap<(String, String), BTreeMap<u32, Vec<StoredAnnotation>>>>>;

#[derive(Clone, Default)]
struct Gateway {
    sets: Sets,
    fail_load: bool,
}

impl PersistenceGateway for Gateway {
    fn load(
        &self,
        document_id: &str,
        user_id: &str,
    ) -> GatewayResult<BTreeMap<u32, Vec<StoredAnnotation>>> {
        if self.fail_load {
            return Err(GatewayError::Remote("503 from annotation service".to_string()));
        }
        Ok(self
            .sets
            .borrow()
            .get(&(document_id.to_string(), user_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn save(
        &self,
        document_id: &str,
        user_id: &str,
        pages: &BTreeMap<u32, Vec<StoredAnnotation>>,
    ) -> GatewayResult<()> {
        self.sets
            .borrow_mut()
            .insert((document_id.to_string(), user_id.to_string()), pages.clone());
        Ok(())
    }
}

fn shared_state() -> Shared {
    Rc::new(RefCell::new(HostState {
        zoom: 1.0,
        page_count: 2,
        ..HostState::default()
    }))
}

fn hosts(state: &Shared, gateway: Gateway) -> Hosts {
    Hosts::new()
        .with_pages(Pages(state.clone()))
        .with_scroll(Scroll(state.clone()))
        .with_surface(Surface(state.clone()))
        .with_scheduler(Scheduler(state.clone()))
        .with_selection(Selection(state.clone()))
        .with_overlay(Overlay(state.clone()))
        .with_editable(Editable(state.clone()))
        .with_gateway(gateway)
}

fn engine_with(state: &Shared, gateway: Gateway) -> AnnotationEngine {
    init_logging();
    let mut engine = AnnotationEngine::new(
        "doc-1",
        "alice",
        EngineConfig::default(),
        hosts(state, gateway),
    );
    engine.init().expect("init should succeed");
    engine
}

fn engine(state: &Shared) -> AnnotationEngine {
    engine_with(state, Gateway::default())
}

fn set_zoom(engine: &mut AnnotationEngine, state: &Shared, zoom: f64) {
    state.borrow_mut().zoom = zoom;
    engine.refresh_layout();
}

/// Draw a stroke through document points (container origin is the client origin)
fn draw(engine: &mut AnnotationEngine, points: &[(f64, f64)]) -> Annotation {
    engine.set_mode(Mode::Ink);
    let existing: Vec<_> = engine.store().iter().map(|a| a.id.clone()).collect();
    let (first, rest) = points.split_first().expect("at least one point");
    assert!(engine.handle_input(InputEvent::down(first.0, first.1)));
    for (x, y) in rest {
        engine.handle_input(InputEvent::moved(*x, *y));
    }
    let last = points.last().expect("at least one point");
    assert!(engine.handle_input(InputEvent::up(last.0, last.1)));
    engine
        .store()
        .iter()
        .find(|a| !existing.contains(&a.id))
        .cloned()
        .expect("stroke should be stored")
}

fn polyline(engine: &AnnotationEngine, annotation: &Annotation) -> Vec<Point> {
    let drawable = engine.scene().get(&annotation.id).expect("drawable");
    match &drawable.primitives[0] {
        Primitive::Polyline { points, .. } => points.clone(),
        other => panic!("expected polyline, got {other:?}"),
    }
}

fn sorted(engine: &AnnotationEngine) -> Vec<Annotation> {
    let mut all: Vec<Annotation> = engine.store().iter().cloned().collect();
    all.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
    all
}

fn assert_close(a: Point, b: Point) {
    assert!(
        (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9,
        "{a:?} != {b:?}"
    );
}

const STROKE: [(f64, f64); 5] = [
    (116.0, 116.0),
    (136.0, 126.0),
    (156.0, 136.0),
    (176.0, 146.0),
    (196.0, 156.0),
];

#[test]
fn ink_stroke_follows_zoom_round_trip() {
    let state = shared_state();
    let mut engine = engine(&state);
    let stroke = draw(&mut engine, &STROKE);

    let AnnotationData::Ink(data) = &stroke.data else {
        panic!("expected ink");
    };
    assert_eq!(data.points.len(), 5);
    assert!((data.points[0].x - 100.0 / PAGE_W).abs() < 1e-12);
    assert!((data.width - 2.0 / PAGE_W).abs() < 1e-12);

    set_zoom(&mut engine, &state, 2.0);
    let zoomed = polyline(&engine, &stroke);
    assert_close(zoomed[0], Point::new(216.0, 216.0));
    assert_close(zoomed[4], Point::new(16.0 + 180.0 * 2.0, 16.0 + 140.0 * 2.0));

    set_zoom(&mut engine, &state, 1.0);
    let restored = polyline(&engine, &stroke);
    for (point, (x, y)) in restored.iter().zip(STROKE) {
        assert_close(*point, Point::new(x, y));
    }
}

#[test]
fn two_line_selection_becomes_one_highlight() {
    let state = shared_state();
    let mut engine = engine(&state);
    engine.set_mode(Mode::Highlight);
    assert!(state.borrow().passthrough);

    state.borrow_mut().selection_rects = vec![
        Rect::new(66.0, 116.0, 100.0, 14.0),
        Rect::new(167.0, 116.0, 80.0, 14.0),
        Rect::new(66.0, 136.0, 200.0, 14.0),
    ];
    assert!(engine.handle_input(InputEvent::up(200.0, 140.0)));

    assert_eq!(engine.store().len(), 1);
    let highlight = engine.store().iter().next().cloned().expect("highlight");
    assert_eq!(highlight.page, 1);
    let AnnotationData::HighlightRects(data) = &highlight.data else {
        panic!("expected rect highlight");
    };
    assert_eq!(data.rects.len(), 2);
    assert!(state.borrow().selection_cleared);

    // painted behind the text layer, not on the canvas
    assert!(engine.scene().get(&highlight.id).is_none());
    assert_eq!(state.borrow().mounted.get(&1).map(Vec::len), Some(2));

    // the eraser reaches overlay highlights
    engine.set_mode(Mode::Eraser);
    assert!(!state.borrow().passthrough);
    engine.handle_input(InputEvent::down(100.0, 120.0));
    engine.handle_input(InputEvent::up(100.0, 120.0));
    assert!(engine.store().is_empty());
    assert!(state.borrow().mounted.get(&1).map_or(true, Vec::is_empty));
}

#[test]
fn text_box_with_bold_prefix() {
    let state = shared_state();
    let mut engine = engine(&state);
    engine.set_mode(Mode::FreeText);

    engine.handle_input(InputEvent::down(116.0, 116.0));
    engine.handle_input(InputEvent::moved(316.0, 166.0));
    assert!(engine.handle_input(InputEvent::up(316.0, 166.0)));
    assert!(engine.editor().is_some());
    assert!(!engine.can_undo());

    {
        let mut host = state.borrow_mut();
        host.text = "Hello".to_string();
        host.caret = Some(5..5);
    }
    assert!(engine.handle_input(InputEvent::TextInput));
    state.borrow_mut().caret = Some(0..3);
    engine.apply_text_style(StylePatch::bold(true));

    assert!(engine.commit_editor());
    let text_box = engine.store().iter().next().cloned().expect("text box");
    let AnnotationData::TextBox(data) = &text_box.data else {
        panic!("expected text box");
    };
    assert_eq!(data.runs.len(), 2);
    assert_eq!(data.runs[0].text, "Hel");
    assert!(data.runs[0].style.is_bold());
    assert_eq!(data.runs[1].text, "lo");
    assert!(!data.runs[1].style.is_bold());
    assert!((data.rect.x - 100.0 / PAGE_W).abs() < 1e-12);
    assert!((data.rect.width - 200.0 / PAGE_W).abs() < 1e-12);
    assert!(engine.scene().get(&text_box.id).is_some());

    // creation and text are a single undo step
    assert!(engine.undo());
    assert!(engine.store().is_empty());
    assert!(!engine.can_undo());
    assert!(engine.redo());
    assert_eq!(engine.store().len(), 1);
}

#[test]
fn empty_text_box_is_discarded_without_history() {
    let state = shared_state();
    let mut engine = engine(&state);
    engine.set_mode(Mode::FreeText);

    engine.handle_input(InputEvent::down(116.0, 116.0));
    engine.handle_input(InputEvent::up(118.0, 118.0));
    assert!(engine.editor().is_some());
    assert_eq!(engine.store().len(), 1);

    assert!(engine.handle_input(InputEvent::key(Key::Escape, Modifiers::NONE)));
    assert!(engine.editor().is_none());
    assert!(engine.store().is_empty());
    assert!(!engine.can_undo());
}

#[test]
fn delete_then_undo_restores_same_annotation() {
    let state = shared_state();
    let mut engine = engine(&state);
    let stroke = draw(&mut engine, &STROKE);

    engine.set_mode(Mode::Select);
    engine.handle_input(InputEvent::down(116.0, 116.0));
    engine.handle_input(InputEvent::up(116.0, 116.0));
    assert_eq!(engine.selection(), vec![stroke.id.clone()]);

    assert!(engine.handle_input(InputEvent::key(Key::Delete, Modifiers::NONE)));
    assert!(engine.store().is_empty());
    assert!(engine.selection().is_empty());

    assert!(engine.handle_input(InputEvent::key(Key::Character('z'), Modifiers::command())));
    let restored = engine.store().get(&stroke.id).cloned().expect("restored");
    assert_eq!(restored, stroke);
    assert!(engine.scene().get(&stroke.id).is_some());
}

#[test]
fn drag_moves_selection_in_page_fractions() {
    let state = shared_state();
    let mut engine = engine(&state);
    let stroke = draw(&mut engine, &STROKE);

    engine.set_mode(Mode::Select);
    engine.handle_input(InputEvent::down(116.0, 116.0));
    engine.handle_input(InputEvent::moved(126.0, 136.0));
    engine.handle_input(InputEvent::up(126.0, 136.0));

    let moved = engine.store().get(&stroke.id).cloned().expect("moved");
    let (AnnotationData::Ink(before), AnnotationData::Ink(after)) = (&stroke.data, &moved.data)
    else {
        panic!("expected ink");
    };
    assert!((after.points[0].x - before.points[0].x - 10.0 / PAGE_W).abs() < 1e-12);
    assert!((after.points[0].y - before.points[0].y - 20.0 / PAGE_H).abs() < 1e-12);

    assert!(engine.undo());
    assert_eq!(engine.store().get(&stroke.id).map(|a| &a.data), Some(&stroke.data));
}

#[test]
fn marquee_selects_intersecting_drawables() {
    let state = shared_state();
    let mut engine = engine(&state);
    let first = draw(&mut engine, &STROKE);
    let second = draw(&mut engine, &[(116.0, 516.0), (196.0, 556.0)]);

    engine.set_mode(Mode::Select);
    engine.handle_input(InputEvent::down(90.0, 90.0));
    engine.handle_input(InputEvent::moved(150.0, 150.0));
    engine.handle_input(InputEvent::up(150.0, 150.0));
    assert_eq!(engine.selection(), vec![first.id.clone()]);

    // additive marquee keeps the first selection
    engine.handle_input(InputEvent::PointerDown {
        client: Point::new(90.0, 490.0),
        modifiers: Modifiers::shift(),
    });
    engine.handle_input(InputEvent::up(250.0, 600.0));
    let selected = engine.selection();
    assert_eq!(selected.len(), 2);
    assert!(selected.contains(&second.id));

    // a click on empty space clears it
    engine.handle_input(InputEvent::down(400.0, 700.0));
    engine.handle_input(InputEvent::up(400.0, 700.0));
    assert!(engine.selection().is_empty());
}

#[test]
fn undo_redo_is_symmetric() {
    let state = shared_state();
    let mut engine = engine(&state);
    let mut rng = StdRng::seed_from_u64(17);

    let mut states = vec![sorted(&engine)];
    for _ in 0..12 {
        let page = rng.gen_range(0..2) as f64;
        let x = rng.gen_range(40.0..500.0);
        let y = 16.0 + page * (PAGE_H + 16.0) + rng.gen_range(40.0..700.0);
        draw(&mut engine, &[(x, y), (x + 30.0, y + 10.0), (x + 60.0, y + 5.0)]);
        states.push(sorted(&engine));
    }

    for expected in states.iter().rev().skip(1) {
        assert!(engine.undo());
        assert_eq!(&sorted(&engine), expected);
    }
    assert!(!engine.undo());

    for expected in states.iter().skip(1) {
        assert!(engine.redo());
        assert_eq!(&sorted(&engine), expected);
    }
    assert!(!engine.redo());
}

#[test]
fn copy_paste_creates_nudged_copies() {
    let state = shared_state();
    let mut engine = engine(&state);
    let stroke = draw(&mut engine, &STROKE);

    engine.set_mode(Mode::Select);
    engine.set_selection([stroke.id.clone()]);
    assert!(engine.handle_input(InputEvent::key(Key::Character('c'), Modifiers::command())));
    assert!(engine.handle_input(InputEvent::key(Key::Character('v'), Modifiers::command())));

    assert_eq!(engine.store().len(), 2);
    let copy = engine
        .store()
        .iter()
        .find(|a| a.id != stroke.id)
        .cloned()
        .expect("copy");
    assert_eq!(copy.page, 1);
    let (AnnotationData::Ink(original), AnnotationData::Ink(pasted)) = (&stroke.data, &copy.data)
    else {
        panic!("expected ink");
    };
    assert!((pasted.points[0].x - original.points[0].x - 0.02).abs() < 1e-12);
    assert_eq!(engine.selection(), vec![copy.id.clone()]);
}

#[test]
fn viewport_offset_is_clamped_to_content() {
    let state = shared_state();
    let mut engine = engine(&state);

    state.borrow_mut().origin = Point::new(0.0, -5000.0);
    engine.handle_input(InputEvent::Scroll);
    engine.handle_input(InputEvent::Scroll);
    engine.handle_input(InputEvent::Resize);
    assert_eq!(state.borrow().frames_requested, 1);

    engine.on_animation_frame();
    let content = engine.layout().content_size();
    let window = engine.viewport_window().expect("window");
    assert_eq!(window.offset.x, 0.0);
    assert_eq!(window.offset.y, content.height - 600.0);
    assert_eq!(state.borrow().camera, Some(Point::new(0.0, -(content.height - 600.0))));

    // a second frame without a request does nothing
    state.borrow_mut().origin = Point::default();
    engine.on_animation_frame();
    assert_eq!(engine.viewport_window().map(|w| w.offset.y), Some(content.height - 600.0));
}

#[test]
fn stale_load_is_discarded() {
    init_logging();
    let state = shared_state();
    let mut engine = AnnotationEngine::new(
        "doc-1",
        "alice",
        EngineConfig::default(),
        hosts(&state, Gateway::default()),
    );

    let mut records = BTreeMap::new();
    records.insert(
        1,
        vec![StoredAnnotation {
            id: "old".to_string(),
            kind: AnnotationKind::Ink,
            page: 1,
            data: json!({
                "v": 2,
                "kind": "ink",
                "pointsNorm": [{"x": 0.1, "y": 0.1}, {"x": 0.2, "y": 0.2}],
                "color": "#ff0000",
                "widthNorm": 0.004,
                "opacity": 1.0
            }),
            created_at: 1,
            updated_at: None,
            author_id: None,
        }],
    );

    let first = engine.begin_load().expect("begin");
    let second = engine.begin_load().expect("begin");
    assert!(!engine.complete_load(first, Ok(records.clone())).expect("stale is not an error"));
    assert!(engine.store().is_empty());

    assert!(engine.complete_load(second, Ok(records)).expect("current load"));
    assert_eq!(engine.store().len(), 1);
}

#[test]
fn load_failure_leaves_store_empty() {
    init_logging();
    let state = shared_state();
    let gateway = Gateway {
        fail_load: true,
        ..Gateway::default()
    };
    let mut engine = AnnotationEngine::new(
        "doc-1",
        "alice",
        EngineConfig::default(),
        hosts(&state, gateway),
    );

    let err = engine.init().expect_err("load should fail");
    assert!(matches!(err, EngineError::Load(GatewayError::Remote(_))));
    assert!(engine.store().is_empty());

    // still usable after the failure
    draw(&mut engine, &STROKE);
    assert_eq!(engine.store().len(), 1);
}

#[test]
fn destroy_is_idempotent_and_silences_callbacks() {
    let state = shared_state();
    let mut engine = engine(&state);
    let cleanups = Rc::new(RefCell::new(0));
    let counter = cleanups.clone();
    engine.add_cleanup(move || *counter.borrow_mut() += 1);
    let ticket = engine.begin_load().expect("begin");

    engine.destroy();
    engine.destroy();
    assert!(engine.is_destroyed());
    assert_eq!(*cleanups.borrow(), 1);
    assert!(state.borrow().last_scene.is_empty());

    let presents = state.borrow().scene_presents;
    assert!(!engine.handle_input(InputEvent::down(116.0, 116.0)));
    engine.request_viewport_update();
    engine.on_animation_frame();
    engine.refresh_layout();
    assert_eq!(state.borrow().scene_presents, presents);

    assert!(!engine.complete_load(ticket, Ok(BTreeMap::new())).expect("discarded"));
    assert!(matches!(engine.begin_load(), Err(EngineError::Destroyed)));
    assert!(matches!(engine.save(), Err(EngineError::Destroyed)));
}

#[test]
fn save_then_reload_in_new_engine() {
    let state = shared_state();
    let gateway = Gateway::default();
    let mut engine = engine_with(&state, gateway.clone());
    let stroke = draw(&mut engine, &STROKE);
    assert!(engine.is_dirty());

    let saved = Rc::new(RefCell::new(None));
    let sink = saved.clone();
    engine.on(EventKind::Saved, move |event| {
        if let EngineEvent::Saved { count } = event {
            *sink.borrow_mut() = Some(*count);
        }
    });
    assert_eq!(engine.save().expect("save"), 1);
    assert!(!engine.is_dirty());
    assert_eq!(*saved.borrow(), Some(1));
    engine.destroy();

    let reloaded = engine_with(&state, gateway);
    let loaded = reloaded.store().get(&stroke.id).cloned().expect("reloaded");
    assert_eq!(loaded.author_id.as_deref(), Some("alice"));
    let (AnnotationData::Ink(a), AnnotationData::Ink(b)) = (&stroke.data, &loaded.data) else {
        panic!("expected ink");
    };
    for (p, q) in a.points.iter().zip(&b.points) {
        assert!((p.x - q.x).abs() < 1e-12 && (p.y - q.y).abs() < 1e-12);
    }
}

#[test]
fn legacy_pixel_records_migrate_on_load() {
    let state = shared_state();
    let gateway = Gateway::default();
    let mut records = BTreeMap::new();
    records.insert(
        2,
        vec![StoredAnnotation {
            id: "legacy".to_string(),
            kind: AnnotationKind::Ink,
            page: 2,
            data: json!({
                "points": [{"x": 60.0, "y": 80.0}, {"x": 120.0, "y": 160.0}],
                "color": "#0000ff",
                "strokeWidth": 6.0,
                "pageWidth": 1200.0,
                "pageHeight": 1600.0
            }),
            created_at: 1,
            updated_at: None,
            author_id: None,
        }],
    );
    gateway
        .sets
        .borrow_mut()
        .insert(("doc-1".to_string(), "alice".to_string()), records);

    let engine = engine_with(&state, gateway);
    let annotation = engine.store().iter().next().cloned().expect("migrated");
    assert_eq!(annotation.page, 2);
    let AnnotationData::Ink(stroke) = &annotation.data else {
        panic!("expected ink");
    };
    assert!((stroke.points[0].x - 0.05).abs() < 1e-12);
    assert!((stroke.points[1].y - 0.1).abs() < 1e-12);
    assert!((stroke.width - 0.005).abs() < 1e-12);
}

#[test]
fn mode_change_resets_and_notifies() {
    let state = shared_state();
    let mut engine = engine(&state);
    let stroke = draw(&mut engine, &STROKE);
    engine.set_mode(Mode::Select);
    engine.set_selection([stroke.id.clone()]);

    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    engine.on(EventKind::ModeChanged, move |event| sink.borrow_mut().push(event.clone()));

    engine.set_mode(Mode::Ink);
    engine.set_mode(Mode::Ink);
    assert!(engine.selection().is_empty());
    assert_eq!(
        *events.borrow(),
        vec![EngineEvent::ModeChanged {
            mode: Mode::Ink,
            previous: Mode::Select
        }]
    );
}

fn assert_rect_close(a: Rect, b: Rect) {
    assert!(
        (a.x - b.x).abs() < 1e-9
            && (a.y - b.y).abs() < 1e-9
            && (a.width - b.width).abs() < 1e-9
            && (a.height - b.height).abs() < 1e-9,
        "{a:?} != {b:?}"
    );
}

/// Drawn bounds and first fragment font size of a text box
fn text_box_geometry(engine: &AnnotationEngine, annotation: &Annotation) -> (Rect, f64) {
    let drawable = engine.scene().get(&annotation.id).expect("drawable");
    let font_size = drawable
        .primitives
        .iter()
        .find_map(|primitive| match primitive {
            Primitive::Text { style, .. } => Some(style.font_size),
            _ => None,
        })
        .expect("text fragment");
    (drawable.bounds, font_size)
}

fn type_into_editor(engine: &mut AnnotationEngine, state: &Shared, text: &str) {
    {
        let mut host = state.borrow_mut();
        host.text = text.to_string();
        let end = text.chars().count();
        host.caret = Some(end..end);
    }
    assert!(engine.handle_input(InputEvent::TextInput));
}

#[test]
fn text_box_follows_zoom_round_trip() {
    let state = shared_state();
    let mut engine = engine(&state);
    engine.set_mode(Mode::FreeText);
    engine.handle_input(InputEvent::down(116.0, 116.0));
    engine.handle_input(InputEvent::moved(316.0, 166.0));
    engine.handle_input(InputEvent::up(316.0, 166.0));
    type_into_editor(&mut engine, &state, "Hello");
    assert!(engine.commit_editor());
    let text_box = engine.store().iter().next().cloned().expect("text box");

    let (bounds, font_size) = text_box_geometry(&engine, &text_box);
    assert_rect_close(bounds, Rect::new(116.0, 116.0, 200.0, 50.0));
    assert!((font_size - 14.0).abs() < 1e-9);

    set_zoom(&mut engine, &state, 2.0);
    let (bounds, font_size) = text_box_geometry(&engine, &text_box);
    assert_rect_close(bounds, Rect::new(216.0, 216.0, 400.0, 100.0));
    assert!((font_size - 28.0).abs() < 1e-9);

    set_zoom(&mut engine, &state, 1.0);
    let (bounds, font_size) = text_box_geometry(&engine, &text_box);
    assert_rect_close(bounds, Rect::new(116.0, 116.0, 200.0, 50.0));
    assert!((font_size - 14.0).abs() < 1e-9);

    // zoom never rewrites the stored geometry
    assert_eq!(engine.store().get(&text_box.id), Some(&text_box));
}

#[test]
fn highlight_overlay_follows_zoom_round_trip() {
    let state = shared_state();
    let mut engine = engine(&state);
    engine.set_mode(Mode::Highlight);
    state.borrow_mut().selection_rects = vec![
        Rect::new(66.0, 116.0, 100.0, 14.0),
        Rect::new(66.0, 136.0, 200.0, 14.0),
    ];
    assert!(engine.handle_input(InputEvent::up(200.0, 140.0)));

    let mounted = |state: &Shared| -> Vec<Rect> {
        state.borrow().mounted[&1].iter().map(|e| e.rect).collect()
    };
    let original = mounted(&state);
    assert_eq!(original.len(), 2);
    assert_rect_close(original[0], Rect::new(50.0, 100.0, 100.0, 14.0));

    set_zoom(&mut engine, &state, 2.0);
    let zoomed = mounted(&state);
    assert_eq!(zoomed.len(), original.len());
    for (z, o) in zoomed.iter().zip(&original) {
        assert_rect_close(*z, Rect::new(o.x * 2.0, o.y * 2.0, o.width * 2.0, o.height * 2.0));
    }

    set_zoom(&mut engine, &state, 1.0);
    for (r, o) in mounted(&state).iter().zip(&original) {
        assert_rect_close(*r, *o);
    }
}

#[test]
fn mixed_edits_undo_and_redo_symmetrically() {
    let state = shared_state();
    let mut engine = engine(&state);
    let mut rng = StdRng::seed_from_u64(41);

    let mut states = vec![sorted(&engine)];
    for step in 0..40 {
        let strokes: Vec<Annotation> = engine
            .store()
            .iter()
            .filter(|a| a.kind() == AnnotationKind::Ink)
            .cloned()
            .collect();
        let target = (!strokes.is_empty())
            .then(|| strokes[rng.gen_range(0..strokes.len())].clone());

        match (rng.gen_range(0..6), target) {
            (1, Some(target)) => {
                let anchor = polyline(&engine, &target)[0];
                let dx = rng.gen_range(5.0..30.0);
                let dy = rng.gen_range(5.0..30.0);
                engine.set_mode(Mode::Select);
                engine.set_selection([target.id.clone()]);
                engine.handle_input(InputEvent::down(anchor.x, anchor.y));
                engine.handle_input(InputEvent::moved(anchor.x + dx, anchor.y + dy));
                engine.handle_input(InputEvent::up(anchor.x + dx, anchor.y + dy));
            }
            (2, Some(target)) => {
                let anchor = polyline(&engine, &target)[0];
                engine.set_mode(Mode::Eraser);
                engine.handle_input(InputEvent::down(anchor.x, anchor.y));
                engine.handle_input(InputEvent::up(anchor.x, anchor.y));
            }
            (3, Some(target)) => {
                engine.set_mode(Mode::Select);
                engine.set_selection([target.id.clone()]);
                engine.handle_input(InputEvent::key(Key::Delete, Modifiers::NONE));
            }
            (4, Some(target)) => {
                engine.set_mode(Mode::Select);
                engine.set_selection([target.id.clone()]);
                engine.handle_input(InputEvent::key(Key::Character('c'), Modifiers::command()));
                engine.handle_input(InputEvent::key(Key::Character('v'), Modifiers::command()));
            }
            (5, _) => {
                let x = rng.gen_range(40.0..400.0);
                let y = rng.gen_range(40.0..600.0);
                engine.set_mode(Mode::FreeText);
                engine.handle_input(InputEvent::down(x, y));
                engine.handle_input(InputEvent::moved(x + 150.0, y + 40.0));
                engine.handle_input(InputEvent::up(x + 150.0, y + 40.0));
                type_into_editor(&mut engine, &state, &format!("note {step}"));
                assert!(engine.commit_editor());
            }
            _ => {
                let x = rng.gen_range(40.0..500.0);
                let y = rng.gen_range(40.0..700.0);
                draw(&mut engine, &[(x, y), (x + 30.0, y + 10.0), (x + 60.0, y + 5.0)]);
            }
        }

        let now = sorted(&engine);
        if states.last() != Some(&now) {
            states.push(now);
        }
    }
    assert!(states.len() > 20);

    for expected in states.iter().rev().skip(1) {
        assert!(engine.undo());
        assert_eq!(&sorted(&engine), expected);
    }
    assert!(!engine.undo());

    for expected in states.iter().skip(1) {
        assert!(engine.redo());
        assert_eq!(&sorted(&engine), expected);
    }
    assert!(!engine.redo());
}
