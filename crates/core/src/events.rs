//! Engine notifications for toolbars and other observers

use crate::annotation::AnnotationId;
use crate::interaction::Mode;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ModeChanged { mode: Mode, previous: Mode },
    SelectionChanged { selected: Vec<AnnotationId> },
    /// Committed store mutation; `pages` lists the pages whose lists changed
    StoreChanged { pages: BTreeSet<u32> },
    EditorOpened { id: AnnotationId },
    EditorClosed { id: AnnotationId, kept: bool },
    Loaded { count: usize },
    Saved { count: usize },
}

impl EngineEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            EngineEvent::ModeChanged { .. } => EventKind::ModeChanged,
            EngineEvent::SelectionChanged { .. } => EventKind::SelectionChanged,
            EngineEvent::StoreChanged { .. } => EventKind::StoreChanged,
            EngineEvent::EditorOpened { .. } => EventKind::EditorOpened,
            EngineEvent::EditorClosed { .. } => EventKind::EditorClosed,
            EngineEvent::Loaded { .. } => EventKind::Loaded,
            EngineEvent::Saved { .. } => EventKind::Saved,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ModeChanged,
    SelectionChanged,
    StoreChanged,
    EditorOpened,
    EditorClosed,
    Loaded,
    Saved,
}

/// Handle returned by `on`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

type Handler = Box<dyn FnMut(&EngineEvent)>;

#[derive(Default)]
pub struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, EventKind, Handler)>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        kind: EventKind,
        handler: impl FnMut(&EngineEvent) + 'static,
    ) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.entries.push((id, kind, Box::new(handler)));
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _, _)| *entry != id);
        self.entries.len() != before
    }

    /// Deliver to every handler subscribed to the event's kind, in subscription order
    pub fn emit(&mut self, event: &EngineEvent) {
        let kind = event.kind();
        for (_, subscribed, handler) in &mut self.entries {
            if *subscribed == kind {
                handler(event);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.entries.len())
            .finish()
    }
}
