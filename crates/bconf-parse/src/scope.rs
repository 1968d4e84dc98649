//! Lexical variable scopes.
//!
//! Scopes form a chain: a frame is pushed when the parser enters an object
//! and popped when it leaves, and resolution walks from the innermost frame
//! outward. Two frames always exist: a base frame holding caller-seeded
//! variables, and the document's root frame above it, so a root-level
//! declaration shadows a seed instead of colliding with it.

use indexmap::IndexMap;

use crate::Value;

/// Which frame a declaration targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VarScope {
    /// The innermost frame.
    #[default]
    Current,
    /// The document root frame.
    Root,
}

/// The scope chain, innermost frame last.
#[derive(Debug, Clone)]
pub struct ScopeStack {
    frames: Vec<IndexMap<String, Value>>,
}

/// Index of the document root frame (above the seed frame).
const ROOT: usize = 1;

impl ScopeStack {
    /// Create a scope chain with the given seed variables at its base.
    pub fn new(seeds: IndexMap<String, Value>) -> Self {
        Self {
            frames: vec![seeds, IndexMap::new()],
        }
    }

    /// Push a frame for a nested object.
    pub fn push(&mut self) {
        self.frames.push(IndexMap::new());
    }

    /// Pop the innermost frame.
    pub fn pop(&mut self) {
        debug_assert!(self.frames.len() > ROOT + 1, "cannot pop the root frame");
        self.frames.pop();
    }

    /// Resolve a name by walking the chain from the innermost frame outward.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    /// Resolve a name to a mutable binding in whichever frame holds it.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.frames
            .iter_mut()
            .rev()
            .find_map(|frame| frame.get_mut(name))
    }

    /// Whether the targeted frame already binds `name`.
    pub fn is_declared(&self, name: &str, target: VarScope) -> bool {
        self.frame(target).contains_key(name)
    }

    /// Declare or overwrite a binding in the targeted frame.
    ///
    /// Returns false (and leaves the chain untouched) when the frame already
    /// binds the name and `override_existing` is not set.
    pub fn declare(
        &mut self,
        name: &str,
        value: Value,
        target: VarScope,
        override_existing: bool,
    ) -> bool {
        if self.is_declared(name, target) && !override_existing {
            return false;
        }
        self.frame_mut(target).insert(name.to_string(), value);
        true
    }

    fn frame(&self, target: VarScope) -> &IndexMap<String, Value> {
        match target {
            VarScope::Current => self.frames.last().expect("scope chain is non-empty"),
            VarScope::Root => &self.frames[ROOT],
        }
    }

    fn frame_mut(&mut self, target: VarScope) -> &mut IndexMap<String, Value> {
        match target {
            VarScope::Current => self.frames.last_mut().expect("scope chain is non-empty"),
            VarScope::Root => &mut self.frames[ROOT],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeds() -> IndexMap<String, Value> {
        let mut map = IndexMap::new();
        map.insert("$seed".to_string(), Value::Int(1));
        map
    }

    #[test]
    fn test_nearest_binding_wins() {
        let mut scopes = ScopeStack::new(IndexMap::new());
        scopes.declare("$x", Value::Int(1), VarScope::Current, false);
        scopes.push();
        scopes.declare("$x", Value::Int(2), VarScope::Current, false);
        assert_eq!(scopes.get("$x"), Some(&Value::Int(2)));
        scopes.pop();
        assert_eq!(scopes.get("$x"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_child_binding_invisible_after_pop() {
        let mut scopes = ScopeStack::new(IndexMap::new());
        scopes.push();
        scopes.declare("$inner", Value::Bool(true), VarScope::Current, false);
        scopes.pop();
        assert_eq!(scopes.get("$inner"), None);
    }

    #[test]
    fn test_redeclaration_requires_override() {
        let mut scopes = ScopeStack::new(IndexMap::new());
        assert!(scopes.declare("$x", Value::Int(1), VarScope::Current, false));
        assert!(!scopes.declare("$x", Value::Int(2), VarScope::Current, false));
        assert_eq!(scopes.get("$x"), Some(&Value::Int(1)));
        assert!(scopes.declare("$x", Value::Int(2), VarScope::Current, true));
        assert_eq!(scopes.get("$x"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_seed_can_be_shadowed_at_root() {
        let mut scopes = ScopeStack::new(seeds());
        assert_eq!(scopes.get("$seed"), Some(&Value::Int(1)));
        // A root declaration does not collide with the seed frame.
        assert!(scopes.declare("$seed", Value::Int(9), VarScope::Current, false));
        assert_eq!(scopes.get("$seed"), Some(&Value::Int(9)));
    }

    #[test]
    fn test_root_targeting_from_nested_frame() {
        let mut scopes = ScopeStack::new(IndexMap::new());
        scopes.push();
        scopes.declare("$r", Value::Int(7), VarScope::Root, false);
        scopes.pop();
        assert_eq!(scopes.get("$r"), Some(&Value::Int(7)));
    }
}
