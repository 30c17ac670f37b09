//! Runtime values as they appear inside programs.
//!
//! Values are literals, environment references (`$event`, `$location.home`),
//! variable references, computations, or `Undefined` holes left for
//! slot-filling. Every value reports a type through [`Value::get_type`] and a
//! concreteness predicate through [`Value::is_concrete`]; only concrete values
//! survive to the compiled IR unchanged.

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::ast::ScalarExpression;
use crate::types::Type;
use crate::units::{normalize_unit, to_base_unit};

/// A named relative location resolved by the runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum RelativeLocation {
    CurrentLocation,
    Home,
    Work,
}

/// A geographic location, absolute or relative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LocationValue {
    Absolute {
        latitude: f64,
        longitude: f64,
        display: Option<String>,
    },
    Relative(RelativeLocation),
}

/// A time of day with second precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeValue {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl TimeValue {
    pub fn new(hour: u8, minute: u8, second: u8) -> Self {
        Self { hour, minute, second }
    }
}

/// Which boundary of a calendar unit an edge-relative date refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum DateEdge {
    StartOf,
    EndOf,
}

/// A date, either a concrete instant or a form the runtime resolves against
/// the current clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DateValue {
    /// The instant of evaluation. Used as the default base of timers.
    Now,
    Absolute(DateTime<Utc>),
    /// `start_of(week)`, `end_of(mon)`, etc. relative to now.
    Edge { edge: DateEdge, unit: String },
    /// A partially specified calendar date (missing pieces default to the
    /// current date at evaluation time).
    Piece {
        year: Option<i32>,
        month: Option<u32>,
        day: Option<u32>,
        time: Option<TimeValue>,
    },
}

/// Which facet of `$event` a value refers to; `None` means the rendered event
/// itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum EventField {
    ProgramId,
    Type,
}

/// A ThingTalk value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Boolean(bool),
    String(String),
    Number(f64),
    Currency {
        value: f64,
        code: String,
    },
    /// A measurement stored in the base unit of its dimension. Construct with
    /// [`Value::measure`] to get normalization from surface units.
    Measure {
        value: f64,
        unit: String,
    },
    Entity {
        value: String,
        kind: String,
        display: Option<String>,
    },
    Location(LocationValue),
    Time(TimeValue),
    Date(DateValue),
    Enum(String),
    Array(Vec<Value>),
    Compound(IndexMap<String, Value>),
    ArgMap(IndexMap<String, Type>),
    /// A reference to a parameter bound earlier in the rule.
    VarRef(String),
    /// A scalar computation in value position.
    Computation(Box<ScalarExpression>),
    /// A reference to `$event` or one of its facets.
    Event(Option<EventField>),
    /// A host-provided context value (`$context.selection` and friends).
    /// The host declares the type; the analyzer checks it like a literal of
    /// that type.
    ContextRef {
        name: String,
        ty: Type,
    },
    /// A hole to be filled by slot-filling. `local` distinguishes holes the
    /// program owner must fill from holes delegated to a remote party.
    Undefined {
        local: bool,
    },
}

impl Value {
    /// Builds a measure value, converting `amount` from `unit` to the base
    /// unit of its dimension. Unknown units are kept verbatim and rejected
    /// later by the analyzer.
    pub fn measure(amount: f64, unit: &str) -> Self {
        match (to_base_unit(amount, unit), normalize_unit(unit)) {
            (Some(base_amount), Some(base)) => Value::Measure {
                value: base_amount,
                unit: base.to_owned(),
            },
            _ => Value::Measure {
                value: amount,
                unit: unit.to_owned(),
            },
        }
    }

    /// Shorthand for an entity value without a display name.
    pub fn entity(value: &str, kind: &str) -> Self {
        Value::Entity {
            value: value.to_owned(),
            kind: kind.to_owned(),
            display: None,
        }
    }

    pub fn string(s: &str) -> Self {
        Value::String(s.to_owned())
    }

    pub fn undefined() -> Self {
        Value::Undefined { local: true }
    }

    /// The unique concrete type of this value.
    ///
    /// Environment references report the type they resolve to at runtime;
    /// holes and variable references report `Any` and get their type from the
    /// parameter slot they occupy.
    pub fn get_type(&self) -> Type {
        match self {
            Value::Boolean(_) => Type::Boolean,
            Value::String(_) => Type::String,
            Value::Number(_) => Type::Number,
            Value::Currency { .. } => Type::Currency,
            Value::Measure { unit, .. } => Type::Measure(unit.clone()),
            Value::Entity { kind, .. } => Type::Entity(kind.clone()),
            Value::Location(_) => Type::Location,
            Value::Time(_) => Type::Time,
            Value::Date(_) => Type::Date,
            // An enum symbol has the open-extending singleton type, so it is
            // assignable to any enum that lists the symbol.
            Value::Enum(symbol) => Type::Enum(Some(vec![symbol.clone(), "*".to_owned()])),
            Value::Array(elements) => Type::array(elements.first().map_or(Type::Any, Value::get_type)),
            Value::Compound(record) => Type::Compound {
                name: None,
                fields: record.iter().map(|(k, v)| (k.clone(), v.get_type())).collect(),
            },
            Value::ArgMap(_) => Type::ArgMap,
            Value::Event(None) => Type::String,
            Value::Event(Some(EventField::ProgramId)) => Type::entity("tt:program_id"),
            Value::Event(Some(EventField::Type)) => Type::entity("tt:function_name"),
            Value::ContextRef { ty, .. } => ty.clone(),
            Value::VarRef(_) | Value::Computation(_) | Value::Undefined { .. } => Type::Any,
        }
    }

    /// True if the value contains no hole, variable reference, or
    /// runtime-relative tag. Only concrete values can be serialized for the
    /// host with [`Value::to_json`].
    pub fn is_concrete(&self) -> bool {
        match self {
            Value::Undefined { .. }
            | Value::VarRef(_)
            | Value::Computation(_)
            | Value::Event(_)
            | Value::ContextRef { .. } => false,
            Value::Location(LocationValue::Relative(_)) => false,
            Value::Date(DateValue::Edge { .. } | DateValue::Piece { .. }) => false,
            Value::Array(elements) => elements.iter().all(Value::is_concrete),
            Value::Compound(record) => record.values().all(Value::is_concrete),
            _ => true,
        }
    }

    /// Converts a concrete value into the host JSON representation used by
    /// the runtime protocol. Returns `None` for non-concrete values.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        use serde_json::json;
        match self {
            Value::Boolean(b) => Some(json!(b)),
            Value::String(s) | Value::Enum(s) => Some(json!(s)),
            Value::Number(n) => Some(json!(n)),
            Value::Currency { value, code } => Some(json!({ "value": value, "code": code })),
            Value::Measure { value, .. } => Some(json!(value)),
            Value::Entity { value, .. } => Some(json!(value)),
            Value::Location(LocationValue::Absolute {
                latitude,
                longitude,
                display,
            }) => Some(json!({ "x": longitude, "y": latitude, "display": display })),
            Value::Time(t) => Some(json!(format!("{:02}:{:02}:{:02}", t.hour, t.minute, t.second))),
            Value::Date(DateValue::Absolute(dt)) => Some(json!(dt.to_rfc3339())),
            Value::Date(DateValue::Now) => None,
            Value::Array(elements) => elements
                .iter()
                .map(Value::to_json)
                .collect::<Option<Vec<_>>>()
                .map(serde_json::Value::Array),
            Value::Compound(record) => record
                .iter()
                .map(|(k, v)| v.to_json().map(|j| (k.clone(), j)))
                .collect::<Option<serde_json::Map<_, _>>>()
                .map(serde_json::Value::Object),
            Value::ArgMap(map) => serde_json::to_value(map).ok(),
            _ => None,
        }
    }

    /// Reconstructs a value of the given type from its host JSON
    /// representation. Inverse of [`Value::to_json`] for concrete values:
    /// if `v.get_type()` is assignable to `ty` then
    /// `Value::from_json(ty, &v.to_json()?)` equals `v`.
    pub fn from_json(ty: &Type, json: &serde_json::Value) -> Option<Value> {
        match ty {
            Type::Boolean => json.as_bool().map(Value::Boolean),
            Type::String => json.as_str().map(Value::string),
            Type::Number => json.as_f64().map(Value::Number),
            Type::Currency => match json {
                // A bare number is an amount in the ambient currency, which
                // stays a plain Number until a currency code is attached.
                serde_json::Value::Number(n) => n.as_f64().map(Value::Number),
                serde_json::Value::Object(fields) => Some(Value::Currency {
                    value: fields.get("value")?.as_f64()?,
                    code: fields.get("code")?.as_str()?.to_owned(),
                }),
                _ => None,
            },
            Type::Measure(unit) => json.as_f64().map(|value| Value::Measure {
                value,
                unit: unit.clone(),
            }),
            Type::Entity(kind) => json.as_str().map(|value| Value::entity(value, kind)),
            Type::Location => {
                let fields = json.as_object()?;
                Some(Value::Location(LocationValue::Absolute {
                    latitude: fields.get("y")?.as_f64()?,
                    longitude: fields.get("x")?.as_f64()?,
                    display: fields.get("display").and_then(|d| d.as_str().map(str::to_owned)),
                }))
            }
            Type::Time => {
                let text = json.as_str()?;
                if let Ok(t) = text.parse::<NaiveTime>() {
                    Some(Value::Time(TimeValue::new(t.hour() as u8, t.minute() as u8, t.second() as u8)))
                } else {
                    // A full instant can stand in for a time of day.
                    Value::from_json(&Type::Date, json)
                }
            }
            Type::Date => {
                let text = json.as_str()?;
                DateTime::parse_from_rfc3339(text)
                    .ok()
                    .map(|dt| Value::Date(DateValue::Absolute(dt.with_timezone(&Utc))))
            }
            Type::Enum(_) => json.as_str().map(|s| Value::Enum(s.to_owned())),
            Type::Array(elem) => json
                .as_array()?
                .iter()
                .map(|item| Value::from_json(elem, item))
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            Type::Compound { fields, .. } => {
                let object = json.as_object()?;
                let record: Option<IndexMap<_, _>> = fields
                    .iter()
                    .map(|(name, field_ty)| {
                        object
                            .get(name)
                            .and_then(|j| Value::from_json(field_ty, j))
                            .map(|v| (name.clone(), v))
                    })
                    .collect();
                record.map(Value::Compound)
            }
            Type::ArgMap => serde_json::from_value(json.clone()).ok().map(Value::ArgMap),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trips(v: &Value) {
        let ty = v.get_type();
        let json = v.to_json().unwrap_or_else(|| panic!("{v:?} should serialize"));
        let back = Value::from_json(&ty, &json).unwrap_or_else(|| panic!("{json} should parse as {ty}"));
        assert_eq!(&back, v, "round trip through JSON changed the value");
    }

    #[test]
    fn concrete_values_round_trip_through_json() {
        round_trips(&Value::Boolean(true));
        round_trips(&Value::string("Settled"));
        round_trips(&Value::Number(1234.0));
        round_trips(&Value::Currency {
            value: 9.99,
            code: "usd".into(),
        });
        round_trips(&Value::measure(5.0, "ms"));
        round_trips(&Value::entity("bob", "tt:username"));
        round_trips(&Value::Time(TimeValue::new(7, 30, 0)));
        round_trips(&Value::Array(vec![Value::Number(1.0), Value::Number(2.0)]));
    }

    #[test]
    fn measures_normalize_to_base_units() {
        let v = Value::measure(2.0, "min");
        assert_eq!(
            v,
            Value::Measure {
                value: 120_000.0,
                unit: "ms".into()
            }
        );
        assert_eq!(v.get_type(), Type::measure("ms"));
    }

    #[test]
    fn number_stands_in_for_currency() {
        let v = Value::Number(5.0);
        let json = v.to_json().unwrap();
        assert_eq!(Value::from_json(&Type::Currency, &json), Some(Value::Number(5.0)));
    }

    #[test]
    fn date_stands_in_for_time() {
        let instant = Value::Date(DateValue::Absolute("2013-07-03T12:00:00Z".parse().unwrap()));
        let json = instant.to_json().unwrap();
        assert_eq!(Value::from_json(&Type::Time, &json), Some(instant));
    }

    #[test]
    fn holes_and_relative_values_are_not_concrete() {
        assert!(!Value::undefined().is_concrete());
        assert!(!Value::VarRef("title".into()).is_concrete());
        assert!(!Value::Location(LocationValue::Relative(RelativeLocation::Home)).is_concrete());
        assert!(
            !Value::Array(vec![Value::Number(1.0), Value::undefined()]).is_concrete(),
            "concreteness must recurse into containers"
        );
        assert!(Value::entity("bob", "tt:username").is_concrete());
    }

    #[test]
    fn enum_symbol_is_assignable_to_listing_enums() {
        use crate::types::{is_assignable, EntitySubtypes, TypeScope};
        let symbol = Value::Enum("confirmed".into());
        let target = Type::Enum(Some(vec!["accepted".into(), "confirmed".into(), "unconfirmed".into()]));
        assert!(is_assignable(
            &symbol.get_type(),
            &target,
            &mut TypeScope::new(),
            &EntitySubtypes::default()
        ));
    }
}
