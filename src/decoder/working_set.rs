//! Named language models and the selection of the active one

use crate::error::DecoderError;

/// One loaded model in a working set
#[derive(Debug, Clone)]
pub struct GrammarEntry<M> {
    /// Identifier clients use to select the model
    pub name: String,
    /// Engine-specific model handle
    pub model: M,
    /// Interpolation weight
    pub weight: f32,
}

/// Loaded models plus which one is active for decoding
#[derive(Debug, Clone)]
pub struct WorkingSet<M> {
    entries: Vec<GrammarEntry<M>>,
    active: Option<usize>,
}

impl<M> Default for WorkingSet<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> WorkingSet<M> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            active: None,
        }
    }

    /// Add a model under `name`. A model already registered under the
    /// same name is replaced; the active selection is left untouched.
    pub fn add(&mut self, model: M, name: &str, weight: f32) {
        let entry = GrammarEntry {
            name: name.to_string(),
            model,
            weight,
        };

        match self.position(name) {
            Some(idx) => self.entries[idx] = entry,
            None => self.entries.push(entry),
        }
    }

    /// Make `name` the active model
    pub fn select(&mut self, name: &str) -> Result<(), DecoderError> {
        let idx = self
            .position(name)
            .ok_or_else(|| DecoderError::UnknownModel(name.to_string()))?;
        self.active = Some(idx);
        Ok(())
    }

    pub fn active(&self) -> Option<&GrammarEntry<M>> {
        self.active.map(|idx| &self.entries[idx])
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active().map(|entry| entry.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&GrammarEntry<M>> {
        self.position(name).map(|idx| &self.entries[idx])
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_switches_active() {
        let mut set = WorkingSet::new();
        set.add(1u32, "g1.lm", 1.0);
        set.add(2u32, "g2.lm", 1.0);
        assert!(set.active().is_none());

        set.select("g1.lm").unwrap();
        assert_eq!(set.active_name(), Some("g1.lm"));

        set.select("g2.lm").unwrap();
        assert_eq!(set.active().map(|e| e.model), Some(2));
    }

    #[test]
    fn test_select_unknown_keeps_active() {
        let mut set = WorkingSet::new();
        set.add((), "g1.lm", 1.0);
        set.select("g1.lm").unwrap();

        let err = set.select("missing.lm").unwrap_err();
        assert!(matches!(err, DecoderError::UnknownModel(ref n) if n == "missing.lm"));
        assert_eq!(set.active_name(), Some("g1.lm"));
    }

    #[test]
    fn test_add_same_name_replaces() {
        let mut set = WorkingSet::new();
        set.add("old", "g1.lm", 1.0);
        set.add("new", "g1.lm", 0.5);

        assert_eq!(set.len(), 1);
        let entry = set.get("g1.lm").unwrap();
        assert_eq!(entry.model, "new");
        assert_eq!(entry.weight, 0.5);
    }
}
