//! Authoritative annotation store
//!
//! Keeps an ordered annotation list per page (insertion order is paint order)
//! plus an id → page index so lookups never scan every page.

use crate::annotation::{Annotation, AnnotationId};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Deep copy of some pages' annotation lists
///
/// A page present with an empty list means "this page had no annotations",
/// which restoring must apply as well.
pub type PageSnapshot = BTreeMap<u32, Vec<Annotation>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationStore {
    pages: BTreeMap<u32, Vec<Annotation>>,
    index: HashMap<AnnotationId, u32>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from loaded page lists; an annotation's own `page` wins
    /// over the key it was filed under
    pub fn from_pages(pages: BTreeMap<u32, Vec<Annotation>>) -> Self {
        let mut store = Self::new();
        for annotation in pages.into_values().flatten() {
            store.add(annotation);
        }
        store
    }

    /// Append an annotation to the end of its page; replaces any record with the same id
    pub fn add(&mut self, annotation: Annotation) {
        self.remove(&annotation.id);
        self.index.insert(annotation.id.clone(), annotation.page);
        self.pages.entry(annotation.page).or_default().push(annotation);
    }

    pub fn remove(&mut self, id: &AnnotationId) -> Option<Annotation> {
        let page = self.index.remove(id)?;
        let list = self.pages.get_mut(&page)?;
        let position = list.iter().position(|a| &a.id == id)?;
        let removed = list.remove(position);
        if list.is_empty() {
            self.pages.remove(&page);
        }
        Some(removed)
    }

    pub fn get(&self, id: &AnnotationId) -> Option<&Annotation> {
        let page = self.index.get(id)?;
        self.pages.get(page)?.iter().find(|a| &a.id == id)
    }

    /// Mutable access; the caller must not change `page`
    pub fn get_mut(&mut self, id: &AnnotationId) -> Option<&mut Annotation> {
        let page = self.index.get(id)?;
        self.pages.get_mut(page)?.iter_mut().find(|a| &a.id == id)
    }

    pub fn page_of(&self, id: &AnnotationId) -> Option<u32> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &AnnotationId) -> bool {
        self.index.contains_key(id)
    }

    pub fn page(&self, page: u32) -> &[Annotation] {
        self.pages.get(&page).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn pages(&self) -> impl Iterator<Item = (u32, &[Annotation])> {
        self.pages.iter().map(|(page, list)| (*page, list.as_slice()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.pages.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn clear(&mut self) {
        self.pages.clear();
        self.index.clear();
    }

    /// Deep copy of the given pages, including empty ones
    pub fn snapshot(&self, pages: &BTreeSet<u32>) -> PageSnapshot {
        pages
            .iter()
            .map(|page| (*page, self.page(*page).to_vec()))
            .collect()
    }

    /// Replace every page named in the snapshot with its copy
    pub fn restore(&mut self, snapshot: &PageSnapshot) {
        for (page, list) in snapshot {
            if let Some(old) = self.pages.remove(page) {
                for annotation in old {
                    self.index.remove(&annotation.id);
                }
            }
            for annotation in list {
                self.add(annotation.clone());
            }
        }
    }

    /// Whole store as page lists, for persistence
    pub fn to_pages(&self) -> BTreeMap<u32, Vec<Annotation>> {
        self.pages.clone()
    }
}
