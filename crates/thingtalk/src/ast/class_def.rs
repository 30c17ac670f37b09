//! Class definitions, mixins, and the arena that owns the back references
//! from function defs to their classes.

use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ast::function_def::{ArgumentDef, FunctionDef, FunctionKind};
use crate::ast::invocation::InputParam;
use crate::value::Value;

/// Index of a class inside a [`ClassPool`].
///
/// Function defs point back at their owning class through this index rather
/// than an owning edge, so the ownership graph stays acyclic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassId(pub u32);

/// An `import` statement inside a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImportStmt {
    /// `import loader from @org.thingpedia.v2();` — pulls a mixin facet.
    Mixin {
        facets: Vec<String>,
        module: String,
        in_params: Vec<InputParam>,
    },
    /// `import class @com.twitter as t;`
    Class { kind: String, alias: Option<String> },
}

/// A mixin declaration as served by the schema retriever: which facets it can
/// provide and the arguments its configuration takes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixinDef {
    pub kind: String,
    pub facets: Vec<String>,
    pub args: Vec<ArgumentDef>,
}

/// A class ("device") definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    pub kind: String,
    pub extends: Vec<String>,
    pub imports: Vec<ImportStmt>,
    pub queries: IndexMap<String, Rc<FunctionDef>>,
    pub actions: IndexMap<String, Rc<FunctionDef>>,
    pub metadata: IndexMap<String, String>,
    pub annotations: IndexMap<String, Value>,
    pub is_abstract: bool,
}

impl ClassDef {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_owned(),
            extends: Vec::new(),
            imports: Vec::new(),
            queries: IndexMap::new(),
            actions: IndexMap::new(),
            metadata: IndexMap::new(),
            annotations: IndexMap::new(),
            is_abstract: false,
        }
    }

    pub fn add_query(&mut self, def: FunctionDef) {
        debug_assert_eq!(def.kind, FunctionKind::Query);
        self.queries.insert(def.name.clone(), Rc::new(def));
    }

    pub fn add_action(&mut self, def: FunctionDef) {
        debug_assert_eq!(def.kind, FunctionKind::Action);
        self.actions.insert(def.name.clone(), Rc::new(def));
    }

    /// Finds a function of either category by name.
    pub fn function(&self, kind: FunctionKind, name: &str) -> Option<&Rc<FunctionDef>> {
        match kind {
            FunctionKind::Query | FunctionKind::Stream => self.queries.get(name),
            FunctionKind::Action => self.actions.get(name),
        }
    }
}

/// Arena of class definitions.
///
/// Registering a class rewrites the `parent` index of every function def it
/// owns to the class's slot; cloning a class through the pool remaps the
/// indices to the clone's slot. This keeps `FunctionDef::parent` a plain
/// index with no shared mutable state.
#[derive(Debug, Default)]
pub struct ClassPool {
    classes: Vec<ClassDef>,
}

impl ClassPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Registers a class, stamping every owned function def with its id.
    pub fn register(&mut self, mut class: ClassDef) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        for def in class.queries.values_mut().chain(class.actions.values_mut()) {
            Rc::make_mut(def).parent = Some(id);
        }
        self.classes.push(class);
        id
    }

    pub fn get(&self, id: ClassId) -> Option<&ClassDef> {
        self.classes.get(id.0 as usize)
    }

    /// Looks up a registered class by kind.
    pub fn by_kind(&self, kind: &str) -> Option<(ClassId, &ClassDef)> {
        self.classes
            .iter()
            .enumerate()
            .find(|(_, c)| c.kind == kind)
            .map(|(i, c)| (ClassId(i as u32), c))
    }

    /// Deep-clones a class into a fresh slot, remapping the function defs'
    /// parent indices to the new slot.
    pub fn clone_class(&mut self, id: ClassId) -> Option<ClassId> {
        let class = self.get(id)?.clone();
        Some(self.register(class))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::function_def::ArgDirection;
    use crate::types::Type;

    fn sample_class() -> ClassDef {
        let mut class = ClassDef::new("com.example");
        class.add_query(FunctionDef::new(
            FunctionKind::Query,
            "get",
            vec![ArgumentDef::new(ArgDirection::Out, "data", Type::String)],
        ));
        class
    }

    #[test]
    fn register_stamps_parent_indices() {
        let mut pool = ClassPool::new();
        let id = pool.register(sample_class());
        let class = pool.get(id).unwrap();
        assert_eq!(class.queries["get"].parent, Some(id));
    }

    #[test]
    fn clone_remaps_parent_indices() {
        let mut pool = ClassPool::new();
        let original = pool.register(sample_class());
        let clone = pool.clone_class(original).unwrap();
        assert_ne!(original, clone);
        assert_eq!(pool.get(original).unwrap().queries["get"].parent, Some(original));
        assert_eq!(pool.get(clone).unwrap().queries["get"].parent, Some(clone));
    }
}
