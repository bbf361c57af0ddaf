use serde::{Deserialize, Serialize};

use crate::annotation::{Annotation, AnnotationId, AnnotationKind};

/// Append-ordered annotation sequence. Insertion order is paint order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationStore {
    items: Vec<Annotation>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Annotation] {
        &self.items
    }

    pub fn append(&mut self, annotation: Annotation) -> AnnotationId {
        let id = annotation.id;
        self.items.push(annotation);
        id
    }

    /// Out-of-range indices are ignored.
    pub fn remove_at(&mut self, index: usize) -> Option<Annotation> {
        if index < self.items.len() {
            Some(self.items.remove(index))
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.items.iter().find(|a| a.id == id)
    }

    pub fn get_mut(&mut self, id: AnnotationId) -> Option<&mut Annotation> {
        self.items.iter_mut().find(|a| a.id == id)
    }

    /// Applies `f` to the annotation with `id`. Returns `None` when there is no such annotation.
    pub fn mutate<R>(&mut self, id: AnnotationId, f: impl FnOnce(&mut Annotation) -> R) -> Option<R> {
        self.get_mut(id).map(f)
    }

    pub fn filter_by_page(&self, page: u32) -> impl Iterator<Item = (usize, &Annotation)> {
        self.items
            .iter()
            .enumerate()
            .filter(move |(_, a)| a.page == page)
    }

    pub fn filter_by_page_and_kinds<'a>(
        &'a self,
        page: u32,
        kinds: &'a [AnnotationKind],
    ) -> impl Iterator<Item = (usize, &'a Annotation)> + 'a {
        self.filter_by_page(page)
            .filter(move |(_, a)| kinds.contains(&a.kind()))
    }

    pub fn is_representable(&self) -> bool {
        self.items.iter().all(Annotation::is_representable)
    }
}
