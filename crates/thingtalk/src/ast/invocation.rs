//! Selectors, input parameters, and primitive invocations.

use std::rc::Rc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ast::function_def::FunctionDef;
use crate::value::Value;

/// The mutable `schema` annotation carried by every primitive node.
///
/// Semantic analysis fills the slot with the resolved (possibly derived)
/// signature. The slot is deliberately excluded from structural identity:
/// cloning a node resets it to empty (the clone re-derives it on the next
/// typecheck) and two nodes compare equal regardless of their slots.
#[derive(Debug, Default)]
pub struct SchemaSlot(Option<Rc<FunctionDef>>);

impl SchemaSlot {
    pub fn empty() -> Self {
        Self(None)
    }

    pub fn resolved(def: Rc<FunctionDef>) -> Self {
        Self(Some(def))
    }

    pub fn get(&self) -> Option<&Rc<FunctionDef>> {
        self.0.as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.0.is_some()
    }

    pub fn set(&mut self, def: Rc<FunctionDef>) {
        self.0 = Some(def);
    }

    pub fn clear(&mut self) {
        self.0 = None;
    }

    /// An explicit copy that keeps the resolution, for rewrites that move a
    /// signature onto a restructured node. The `Clone` impl deliberately
    /// drops it instead.
    pub fn clone_resolved(&self) -> SchemaSlot {
        Self(self.0.clone())
    }
}

impl Clone for SchemaSlot {
    fn clone(&self) -> Self {
        Self(None)
    }
}

impl PartialEq for SchemaSlot {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Serialize for SchemaSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_unit()
    }
}

impl<'de> Deserialize<'de> for SchemaSlot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde::de::IgnoredAny::deserialize(deserializer)?;
        Ok(Self(None))
    }
}

/// Identifies which class instance a primitive targets.
///
/// `principal` names the owner when the primitive is hosted elsewhere; `None`
/// (or a `self` entity) means the program's own executor. The analyzer
/// requires principals to be `tt:contact` or `tt:username` entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selector {
    /// The class identifier, e.g. `com.twitter`.
    pub kind: String,
    /// A concrete device instance id, when the user picked one.
    pub id: Option<String>,
    pub principal: Option<Value>,
}

impl Selector {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_owned(),
            id: None,
            principal: None,
        }
    }

    pub fn with_principal(kind: &str, principal: Value) -> Self {
        Self {
            kind: kind.to_owned(),
            id: None,
            principal: Some(principal),
        }
    }

    /// True if this selector targets the local executor.
    pub fn is_local(&self) -> bool {
        match &self.principal {
            None => true,
            Some(Value::Entity { value, .. }) => value == "self",
            Some(_) => false,
        }
    }
}

/// A named input argument applied to an invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputParam {
    pub name: String,
    pub value: Value,
}

impl InputParam {
    pub fn new(name: &str, value: Value) -> Self {
        Self {
            name: name.to_owned(),
            value,
        }
    }
}

/// A call of one function (channel) on one class (kind).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub selector: Selector,
    pub channel: String,
    pub in_params: Vec<InputParam>,
    pub schema: SchemaSlot,
}

impl Invocation {
    pub fn new(selector: Selector, channel: &str, in_params: Vec<InputParam>) -> Self {
        Self {
            selector,
            channel: channel.to_owned(),
            in_params,
            schema: SchemaSlot::empty(),
        }
    }

    /// Looks up the supplied value for an input parameter.
    pub fn in_param(&self, name: &str) -> Option<&Value> {
        self.in_params.iter().find(|p| p.name == name).map(|p| &p.value)
    }
}
