//! The ThingTalk type system.
//!
//! Types are a closed set of primitives plus parameterized constructors. Two
//! constructors have polymorphic holes (`Measure("")` for "any unit",
//! `Entity("")` for "any entity kind") and `Type::Var` carries the
//! single-letter type variables used inside operator overload templates.
//! Assignability (`is_assignable`) unifies holes and variables into a mutable
//! [`TypeScope`]; [`Type::resolve`] substitutes the bindings back out.

use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};

use ahash::AHashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Reserved scope name binding the concrete unit of a `Measure("")` hole.
pub const UNIT_VAR: &str = "_unit";
/// Reserved scope name binding the concrete kind of an `Entity("")` hole.
pub const ENTITY_VAR: &str = "_entity";

/// A ThingTalk type.
///
/// Primitive variants are singleton-like (unit variants); constructed variants
/// carry their parameters. `Unknown` is a forward-compatibility placeholder
/// for type names this version does not understand; it compares equal to
/// itself but never unifies with anything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Type {
    Any,
    Boolean,
    String,
    Number,
    Currency,
    Time,
    Date,
    RecurrentTimeSpecification,
    Location,
    ArgMap,
    Object,
    /// An entity reference; the string is the entity kind (e.g. `tt:contact`).
    /// Empty string is the polymorphic entity hole.
    Entity(std::string::String),
    /// A measurement; the string is the base unit. Empty string is the
    /// polymorphic unit hole.
    Measure(std::string::String),
    /// An enumeration. `None` is an open enum that accepts any symbol; a
    /// trailing `"*"` entry marks an open-extending enum whose concrete
    /// prefix is known but not exhaustive.
    Enum(Option<Vec<std::string::String>>),
    Array(Box<Type>),
    /// A record type with named, ordered fields.
    Compound {
        name: Option<std::string::String>,
        fields: IndexMap<std::string::String, Type>,
    },
    /// Forward-compatibility placeholder for an unrecognized type name.
    Unknown(std::string::String),
    /// A type variable from an overload template; binds on first sight.
    Var(std::string::String),
}

impl Type {
    /// Shorthand for an `Array` of the given element type.
    pub fn array(elem: Type) -> Self {
        Type::Array(Box::new(elem))
    }

    /// Shorthand for an entity type of the given kind.
    pub fn entity(kind: &str) -> Self {
        Type::Entity(kind.to_owned())
    }

    /// Shorthand for a measure with the given base unit.
    pub fn measure(unit: &str) -> Self {
        Type::Measure(unit.to_owned())
    }

    /// True if the type is numeric (supports arithmetic overloads).
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Number | Type::Currency | Type::Measure(_))
    }

    /// True if values of the type have a total order usable by `sort` and the
    /// comparison operators.
    pub fn is_comparable(&self) -> bool {
        self.is_numeric() || matches!(self, Type::Date | Type::Time | Type::String)
    }

    /// True if the type contains a polymorphic hole or type variable anywhere.
    pub fn is_polymorphic(&self) -> bool {
        match self {
            Type::Var(_) => true,
            Type::Entity(e) => e.is_empty(),
            Type::Measure(u) => u.is_empty(),
            Type::Array(elem) => elem.is_polymorphic(),
            Type::Compound { fields, .. } => fields.values().any(Type::is_polymorphic),
            _ => false,
        }
    }

    /// Substitutes bound type variables and holes with their concrete types.
    ///
    /// Returns `None` if the type still contains a variable the scope has not
    /// bound.
    pub fn resolve(&self, scope: &TypeScope) -> Option<Type> {
        match self {
            Type::Var(name) => scope.get(name).and_then(|t| t.resolve(scope)),
            Type::Measure(unit) if unit.is_empty() => match scope.get(UNIT_VAR) {
                Some(Type::Measure(u)) => Some(Type::Measure(u.clone())),
                _ => None,
            },
            Type::Entity(kind) if kind.is_empty() => match scope.get(ENTITY_VAR) {
                Some(Type::Entity(k)) => Some(Type::Entity(k.clone())),
                _ => None,
            },
            Type::Array(elem) => elem.resolve(scope).map(Type::array),
            Type::Compound { name, fields } => {
                let resolved: Option<IndexMap<_, _>> = fields
                    .iter()
                    .map(|(k, v)| v.resolve(scope).map(|t| (k.clone(), t)))
                    .collect();
                Some(Type::Compound {
                    name: name.clone(),
                    fields: resolved?,
                })
            }
            other => Some(other.clone()),
        }
    }
}

// Compound fields compare in declaration order, so equality and hashing agree.
impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        use Type::{Array, ArgMap, Boolean, Compound, Currency, Date, Entity, Enum, Location, Measure, Number, Object, RecurrentTimeSpecification, Time, Unknown, Var};
        match (self, other) {
            (Type::Any, Type::Any)
            | (Boolean, Boolean)
            | (Type::String, Type::String)
            | (Number, Number)
            | (Currency, Currency)
            | (Time, Time)
            | (Date, Date)
            | (RecurrentTimeSpecification, RecurrentTimeSpecification)
            | (Location, Location)
            | (ArgMap, ArgMap)
            | (Object, Object) => true,
            (Entity(a), Entity(b)) | (Measure(a), Measure(b)) | (Unknown(a), Unknown(b)) | (Var(a), Var(b)) => a == b,
            (Enum(a), Enum(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (
                Compound { name: n1, fields: f1 },
                Compound { name: n2, fields: f2 },
            ) => n1 == n2 && f1.len() == f2.len() && f1.iter().eq(f2.iter()),
            _ => false,
        }
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Type::Entity(s) | Type::Measure(s) | Type::Unknown(s) | Type::Var(s) => s.hash(state),
            Type::Enum(entries) => entries.hash(state),
            Type::Array(elem) => elem.hash(state),
            Type::Compound { name, fields } => {
                name.hash(state);
                for (field, ty) in fields {
                    field.hash(state);
                    ty.hash(state);
                }
            }
            _ => {}
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => write!(f, "Any"),
            Type::Boolean => write!(f, "Boolean"),
            Type::String => write!(f, "String"),
            Type::Number => write!(f, "Number"),
            Type::Currency => write!(f, "Currency"),
            Type::Time => write!(f, "Time"),
            Type::Date => write!(f, "Date"),
            Type::RecurrentTimeSpecification => write!(f, "RecurrentTimeSpecification"),
            Type::Location => write!(f, "Location"),
            Type::ArgMap => write!(f, "ArgMap"),
            Type::Object => write!(f, "Object"),
            Type::Entity(kind) => write!(f, "Entity({kind})"),
            Type::Measure(unit) => write!(f, "Measure({unit})"),
            Type::Enum(None) => write!(f, "Enum(*)"),
            Type::Enum(Some(entries)) => write!(f, "Enum({})", entries.join(",")),
            Type::Array(elem) => write!(f, "Array({elem})"),
            Type::Compound { name: Some(name), .. } => write!(f, "Compound({name})"),
            Type::Compound { name: None, fields } => {
                write!(f, "Compound(")?;
                for (i, (field, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{field}: {ty}")?;
                }
                write!(f, ")")
            }
            Type::Unknown(name) => write!(f, "Unknown({name})"),
            Type::Var(name) => write!(f, "{name}"),
        }
    }
}

/// Mutable unification scope threaded through `is_assignable`.
///
/// Variables bind on first sight and stay bound for the rest of the scope's
/// lifetime, so one scope spans exactly one overload-resolution attempt (or
/// one signature match).
#[derive(Debug, Clone, Default)]
pub struct TypeScope {
    bindings: AHashMap<String, Type>,
}

impl TypeScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Type> {
        self.bindings.get(name)
    }

    pub fn bind(&mut self, name: impl Into<String>, ty: Type) {
        self.bindings.insert(name.into(), ty);
    }
}

/// Configurable entity subtyping, seeded with the builtin conversions.
///
/// The relation is reflexive and transitive; `add` inserts a direct edge
/// `sub ≤ sup`.
#[derive(Debug, Clone)]
pub struct EntitySubtypes {
    supers: AHashMap<String, Vec<String>>,
}

impl Default for EntitySubtypes {
    fn default() -> Self {
        let mut map = Self {
            supers: AHashMap::new(),
        };
        map.add("tt:picture", "tt:url");
        map.add("tt:username", "tt:contact");
        map
    }
}

impl EntitySubtypes {
    /// An empty relation (only reflexivity holds).
    pub fn empty() -> Self {
        Self {
            supers: AHashMap::new(),
        }
    }

    pub fn add(&mut self, sub: &str, sup: &str) {
        self.supers.entry(sub.to_owned()).or_default().push(sup.to_owned());
    }

    /// True if `sub ≤ sup` in the reflexive-transitive closure.
    pub fn is_subtype(&self, sub: &str, sup: &str) -> bool {
        if sub == sup {
            return true;
        }
        self.supers
            .get(sub)
            .is_some_and(|ups| ups.iter().any(|up| self.is_subtype(up, sup)))
    }
}

/// Decides whether a value of type `from` may flow into a position of type
/// `to`, binding type variables and holes into `scope` as a side effect.
///
/// The relation is reflexive; `Any` converts in both directions; `Date` may
/// flow into `Time` and `Number` into `Currency`. Entity positions respect
/// the configurable subtype map. A failed attempt may leave partial bindings
/// in `scope`, so callers retry overloads with a fresh scope each time.
pub fn is_assignable(from: &Type, to: &Type, scope: &mut TypeScope, entities: &EntitySubtypes) -> bool {
    match (from, to) {
        (Type::Any, _) | (_, Type::Any) => true,

        // Type variables bind on first sight; later sights must agree.
        (Type::Var(name), _) => match scope.get(name).cloned() {
            Some(bound) => is_assignable(&bound, to, scope, entities),
            None => {
                scope.bind(name.clone(), to.clone());
                true
            }
        },
        (_, Type::Var(name)) => match scope.get(name).cloned() {
            Some(bound) => is_assignable(from, &bound, scope, entities),
            None => {
                scope.bind(name.clone(), from.clone());
                true
            }
        },

        (Type::Measure(u1), Type::Measure(u2)) => {
            if !u2.is_empty() && !u1.is_empty() {
                return u1 == u2;
            }
            // At least one side is a unit hole: unify through _unit.
            let concrete = if u1.is_empty() { u2 } else { u1 };
            match scope.get(UNIT_VAR).cloned() {
                Some(Type::Measure(bound)) => concrete.is_empty() || bound == *concrete,
                Some(_) => false,
                None => {
                    if !concrete.is_empty() {
                        scope.bind(UNIT_VAR, Type::Measure(concrete.clone()));
                    }
                    true
                }
            }
        }

        (Type::Entity(e1), Type::Entity(e2)) => {
            if !e1.is_empty() && !e2.is_empty() {
                return entities.is_subtype(e1, e2);
            }
            let concrete = if e1.is_empty() { e2 } else { e1 };
            match scope.get(ENTITY_VAR).cloned() {
                Some(Type::Entity(bound)) => concrete.is_empty() || bound == *concrete,
                Some(_) => false,
                None => {
                    if !concrete.is_empty() {
                        scope.bind(ENTITY_VAR, Type::Entity(concrete.clone()));
                    }
                    true
                }
            }
        }

        // An open enum accepts and provides any symbol set.
        (Type::Enum(None), Type::Enum(_)) | (Type::Enum(_), Type::Enum(None)) => true,
        (Type::Enum(Some(from_entries)), Type::Enum(Some(to_entries))) => {
            if from_entries == to_entries {
                return true;
            }
            // Open-extending source: its concrete prefix must be a subset of
            // the target's entries.
            match from_entries.split_last() {
                Some((last, prefix)) if last == "*" => prefix.iter().all(|e| to_entries.contains(e)),
                _ => false,
            }
        }

        (Type::Date, Type::Time) => true,
        (Type::Number, Type::Currency) => true,

        (Type::Array(t1), Type::Array(t2)) => {
            // Anything contact-like can stand in for a contact group list.
            if let (Type::Entity(e1), Type::Entity(e2)) = (t1.as_ref(), t2.as_ref())
                && !e1.is_empty()
                && e2 == "tt:contact_group"
                && entities.is_subtype(e1, "tt:contact")
            {
                return true;
            }
            is_assignable(t1, t2, scope, entities)
        }

        (
            Type::Compound { fields: f1, .. },
            Type::Compound { fields: f2, .. },
        ) => {
            f2.iter().all(|(name, want)| {
                f1.get(name).is_some_and(|have| is_assignable(have, want, scope, entities))
            })
        }

        // Unknown never unifies with anything else, including other Unknowns
        // of a different name.
        (Type::Unknown(n1), Type::Unknown(n2)) => n1 == n2,
        (Type::Unknown(_), _) | (_, Type::Unknown(_)) => false,

        _ => from == to,
    }
}
