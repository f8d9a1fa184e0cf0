//! String-keyed slots pairing a descriptor with its lazily created object.

use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TableError {
    #[error("'{0}' is already registered")]
    DuplicateName(String),
    #[error("'{0}' is not registered")]
    UnknownName(String),
}

#[derive(Debug)]
struct Slot<D, T> {
    desc: D,
    object: Option<T>,
    generation: u64,
}

/// One storage kind. Names iterate in sorted order so diagnostics are stable.
#[derive(Debug)]
pub struct Table<D, T> {
    slots: BTreeMap<String, Slot<D, T>>,
}

impl<D, T> Default for Table<D, T> {
    fn default() -> Self {
        Self {
            slots: BTreeMap::new(),
        }
    }
}

impl<D, T> Table<D, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, desc: D) -> Result<(), TableError> {
        if self.slots.contains_key(name) {
            return Err(TableError::DuplicateName(name.to_string()));
        }
        self.slots.insert(
            name.to_string(),
            Slot {
                desc,
                object: None,
                generation: 0,
            },
        );
        Ok(())
    }

    /// Swap the descriptor, dropping any realised object.
    pub fn replace(&mut self, name: &str, desc: D) -> Result<(), TableError> {
        let slot = self
            .slots
            .get_mut(name)
            .ok_or_else(|| TableError::UnknownName(name.to_string()))?;
        slot.desc = desc;
        slot.object = None;
        slot.generation += 1;
        Ok(())
    }

    pub fn realize(&mut self, name: &str, object: T) -> Result<(), TableError> {
        let slot = self
            .slots
            .get_mut(name)
            .ok_or_else(|| TableError::UnknownName(name.to_string()))?;
        slot.object = Some(object);
        Ok(())
    }

    /// Drop the object but keep the descriptor. Returns whether one was dropped.
    pub fn invalidate(&mut self, name: &str) -> bool {
        match self.slots.get_mut(name) {
            Some(slot) => slot.object.take().is_some(),
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&D> {
        self.slots.get(name).map(|slot| &slot.desc)
    }

    pub fn object(&self, name: &str) -> Option<&T> {
        self.slots.get(name).and_then(|slot| slot.object.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn is_realized(&self, name: &str) -> bool {
        self.object(name).is_some()
    }

    /// Bumped by every `replace`. Lets callers notice a descriptor swap.
    pub fn generation(&self, name: &str) -> Option<u64> {
        self.slots.get(name).map(|slot| slot.generation)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &D)> {
        self.slots.iter().map(|(name, slot)| (name.as_str(), &slot.desc))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn realized_count(&self) -> usize {
        self.slots.values().filter(|s| s.object.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_rejects_duplicates() {
        let mut t: Table<u32, String> = Table::new();
        t.insert("a", 1).unwrap();
        assert_eq!(t.insert("a", 2), Err(TableError::DuplicateName("a".into())));
        assert_eq!(t.get("a"), Some(&1));
    }

    #[test]
    fn test_realize_and_invalidate() {
        let mut t: Table<u32, String> = Table::new();
        t.insert("a", 1).unwrap();
        assert!(!t.is_realized("a"));
        t.realize("a", "obj".into()).unwrap();
        assert_eq!(t.object("a").map(String::as_str), Some("obj"));
        assert!(t.invalidate("a"));
        assert!(!t.invalidate("a"));
        // Descriptor survives invalidation
        assert_eq!(t.get("a"), Some(&1));
        assert!(t.realize("missing", "x".into()).is_err());
    }

    #[test]
    fn test_replace_bumps_generation() {
        let mut t: Table<u32, String> = Table::new();
        t.insert("a", 1).unwrap();
        t.realize("a", "obj".into()).unwrap();
        assert_eq!(t.generation("a"), Some(0));
        t.replace("a", 7).unwrap();
        assert_eq!(t.generation("a"), Some(1));
        assert_eq!(t.get("a"), Some(&7));
        assert!(!t.is_realized("a"));
        assert!(t.replace("b", 1).is_err());
    }

    #[test]
    fn test_names_sorted() {
        let mut t: Table<u32, ()> = Table::new();
        t.insert("zeta", 0).unwrap();
        t.insert("alpha", 0).unwrap();
        t.insert("mid", 0).unwrap();
        t.realize("mid", ()).unwrap();
        assert_eq!(t.names().collect::<Vec<_>>(), vec!["alpha", "mid", "zeta"]);
        assert_eq!(t.len(), 3);
        assert_eq!(t.realized_count(), 1);
    }
}
