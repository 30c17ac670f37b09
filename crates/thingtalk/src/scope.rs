//! Name resolution scope for the semantic analyzer.
//!
//! A scope is a stack of frames: lexical lambda arguments, the outputs of the
//! primitive chain checked so far, and global declarations. Lookups search
//! the stack top-down; every mutation touches only the innermost (or, for
//! globals, outermost) frame. The whole stack derives `Clone` so branching
//! constructs (join sides) can check against a copy and keep the original
//! intact, which is what makes typechecking idempotent.

use std::rc::Rc;

use ahash::AHashMap;
use smallvec::{smallvec, SmallVec};

use crate::ast::FunctionDef;
use crate::types::Type;

/// What a name resolves to.
#[derive(Debug, Clone)]
pub enum ScopeEntry {
    /// A lambda argument of the enclosing declaration or example.
    Lexical(Type),
    /// An output of the enclosing primitive chain.
    Output(Type),
    /// A global declaration usable through `VarRef`.
    Global(Rc<FunctionDef>),
}

impl ScopeEntry {
    /// The value type of the entry, when it has one.
    pub fn value_type(&self) -> Option<&Type> {
        match self {
            ScopeEntry::Lexical(ty) | ScopeEntry::Output(ty) => Some(ty),
            ScopeEntry::Global(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Frame {
    entries: AHashMap<String, ScopeEntry>,
    has_event: bool,
}

/// The frame stack. Real programs rarely nest more than a couple of frames
/// deep, so the stack lives inline.
#[derive(Debug, Clone)]
pub struct Scope {
    frames: SmallVec<[Frame; 4]>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    pub fn new() -> Self {
        Self {
            frames: smallvec![Frame::default()],
        }
    }

    /// Enters a nested frame (a lambda body, an external filter).
    pub fn push(&mut self) {
        self.frames.push(Frame::default());
    }

    /// Leaves the innermost frame. The outermost frame is never popped.
    pub fn pop(&mut self) {
        debug_assert!(self.frames.len() > 1, "attempted to pop the global frame");
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    fn top(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("scope always has a frame")
    }

    pub fn has(&self, name: &str) -> bool {
        self.frames.iter().rev().any(|f| f.entries.contains_key(name))
    }

    pub fn get(&self, name: &str) -> Option<&ScopeEntry> {
        self.frames.iter().rev().find_map(|f| f.entries.get(name))
    }

    pub fn add(&mut self, name: impl Into<String>, entry: ScopeEntry) {
        self.top().entries.insert(name.into(), entry);
    }

    /// Adds every output of the signature to the innermost frame.
    pub fn add_all(&mut self, schema: &FunctionDef) {
        for arg in schema.outputs() {
            self.add(arg.name.clone(), ScopeEntry::Output(arg.ty.clone()));
        }
    }

    /// Adds a declaration to the outermost frame so later statements see it.
    pub fn add_global(&mut self, name: impl Into<String>, def: Rc<FunctionDef>) {
        self.frames
            .first_mut()
            .expect("scope always has a frame")
            .entries
            .insert(name.into(), ScopeEntry::Global(def));
    }

    pub fn remove(&mut self, name: &str) {
        self.top().entries.remove(name);
    }

    /// Unions another scope's visible output entries into the innermost
    /// frame. Used to re-join the branches of a join after checking them
    /// against separate copies.
    pub fn merge(&mut self, other: &Scope) {
        let entries: Vec<(String, ScopeEntry)> = other
            .frames
            .iter()
            .flat_map(|f| f.entries.iter())
            .filter(|(_, e)| matches!(e, ScopeEntry::Output(_)))
            .map(|(k, e)| (k.clone(), e.clone()))
            .collect();
        for (name, entry) in entries {
            self.add(name, entry);
        }
    }

    /// Renames every output entry of the innermost frame to `prefix.name`,
    /// implementing `Alias`.
    pub fn prefix(&mut self, prefix: &str) {
        let top = self.top();
        let renamed: AHashMap<String, ScopeEntry> = top
            .entries
            .drain()
            .map(|(name, entry)| match entry {
                ScopeEntry::Output(_) => (format!("{prefix}.{name}"), entry),
                _ => (name, entry),
            })
            .collect();
        top.entries = renamed;
    }

    /// Drops the output entries and the `$event` flag of the innermost
    /// frame, keeping lexical and global bindings. Called between rules.
    pub fn clean(&mut self) {
        let top = self.top();
        top.entries.retain(|_, e| !matches!(e, ScopeEntry::Output(_)));
        top.has_event = false;
    }

    /// Whether `$event` is resolvable here (a stream fired earlier in the
    /// rule).
    pub fn has_event(&self) -> bool {
        self.frames.last().is_some_and(|f| f.has_event)
    }

    pub fn set_event(&mut self, has_event: bool) {
        self.top().has_event = has_event;
    }
}
