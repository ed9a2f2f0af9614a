//! Flat id-keyed table

use std::collections::BTreeMap;

use super::StoreError;
use super::models::Id;

/// Rows of one entity type keyed by a monotonically assigned [`Id`]
///
/// Ids start at 1 and are never reused, even after removal.
#[derive(Debug, Clone)]
pub struct Table<T> {
    entity: &'static str,
    rows: BTreeMap<Id, T>,
    next_id: Id,
}

impl<T> Table<T> {
    pub fn new(entity: &'static str) -> Self {
        Self {
            entity,
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Insert a row built from its freshly assigned id
    pub fn insert_with(&mut self, build: impl FnOnce(Id) -> T) -> &T {
        let id = self.next_id;
        self.next_id += 1;
        self.rows.entry(id).or_insert(build(id))
    }

    pub fn get(&self, id: Id) -> Option<&T> {
        self.rows.get(&id)
    }

    pub fn get_mut(&mut self, id: Id) -> Option<&mut T> {
        self.rows.get_mut(&id)
    }

    /// Like [`get`](Self::get) but missing rows are an error
    pub fn require(&self, id: Id) -> Result<&T, StoreError> {
        self.rows.get(&id).ok_or(StoreError::NotFound {
            entity: self.entity,
            id,
        })
    }

    pub fn require_mut(&mut self, id: Id) -> Result<&mut T, StoreError> {
        let entity = self.entity;
        self.rows
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity, id })
    }

    pub fn remove(&mut self, id: Id) -> Option<T> {
        self.rows.remove(&id)
    }

    /// Remove every row matching `pred`; returns the removed ids
    pub fn remove_where(&mut self, mut pred: impl FnMut(&T) -> bool) -> Vec<Id> {
        let ids: Vec<Id> = self
            .rows
            .iter()
            .filter(|(_, row)| pred(row))
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            self.rows.remove(id);
        }
        ids
    }

    /// Rows in id order
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.rows.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.rows.values_mut()
    }

    pub fn find(&self, mut pred: impl FnMut(&T) -> bool) -> Option<&T> {
        self.rows.values().find(|row| pred(row))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_not_reused() {
        let mut table: Table<(Id, &str)> = Table::new("thing");
        let a = table.insert_with(|id| (id, "a")).0;
        let b = table.insert_with(|id| (id, "b")).0;
        assert_eq!((a, b), (1, 2));

        table.remove(b);
        let c = table.insert_with(|id| (id, "c")).0;
        assert_eq!(c, 3);
    }

    #[test]
    fn test_require_reports_entity() {
        let table: Table<u8> = Table::new("thing");
        let err = table.require(9).unwrap_err();
        assert_eq!(err.to_string(), "thing 9 not found");
    }

    #[test]
    fn test_remove_where() {
        let mut table: Table<u8> = Table::new("n");
        for v in [1, 2, 3, 4] {
            table.insert_with(|_| v);
        }
        let removed = table.remove_where(|v| v % 2 == 0);
        assert_eq!(removed, vec![2, 4]);
        assert_eq!(table.iter().copied().collect::<Vec<_>>(), vec![1, 3]);
    }
}
