//! Page-scoped undo/redo
//!
//! Entries hold full before/after copies of the affected pages, never deltas.
//! Restoring one replaces those pages wholesale.

use crate::store::{AnnotationStore, PageSnapshot};
use std::collections::{BTreeSet, VecDeque};

#[derive(Debug, Clone, PartialEq)]
pub struct UndoEntry {
    pub pages: BTreeSet<u32>,
    pub before: PageSnapshot,
    pub after: PageSnapshot,
}

impl UndoEntry {
    /// An entry whose restore would change nothing
    pub fn is_noop(&self) -> bool {
        self.before == self.after
    }
}

/// Depth-bounded undo stack with a redo stack
#[derive(Debug, Clone)]
pub struct UndoManager {
    undo: VecDeque<UndoEntry>,
    redo: Vec<UndoEntry>,
    depth: usize,
}

impl UndoManager {
    pub fn new(depth: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            depth: depth.max(1),
        }
    }

    /// Snapshot `pages`, run `mutate`, snapshot again and push the pair
    ///
    /// A mutation that leaves the pages unchanged pushes nothing.
    pub fn record<R>(
        &mut self,
        store: &mut AnnotationStore,
        pages: BTreeSet<u32>,
        mutate: impl FnOnce(&mut AnnotationStore) -> R,
    ) -> R {
        let before = store.snapshot(&pages);
        let result = mutate(store);
        let after = store.snapshot(&pages);
        self.push(UndoEntry {
            pages,
            before,
            after,
        });
        result
    }

    /// Push a prepared entry; clears the redo stack and drops the oldest entry past the depth
    pub fn push(&mut self, entry: UndoEntry) -> bool {
        if entry.is_noop() {
            return false;
        }
        self.undo.push_back(entry);
        while self.undo.len() > self.depth {
            self.undo.pop_front();
        }
        self.redo.clear();
        true
    }

    /// Restore the newest entry's `before`; returns the pages touched
    pub fn undo(&mut self, store: &mut AnnotationStore) -> Option<BTreeSet<u32>> {
        let entry = self.undo.pop_back()?;
        store.restore(&entry.before);
        let pages = entry.pages.clone();
        self.redo.push(entry);
        Some(pages)
    }

    /// Re-apply the newest undone entry's `after`; returns the pages touched
    pub fn redo(&mut self, store: &mut AnnotationStore) -> Option<BTreeSet<u32>> {
        let entry = self.redo.pop()?;
        store.restore(&entry.after);
        let pages = entry.pages.clone();
        self.undo.push_back(entry);
        Some(pages)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

impl Default for UndoManager {
    fn default() -> Self {
        Self::new(100)
    }
}
