use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Result type alias for operations that can fail semantic analysis.
pub type TypeResult<T> = Result<T, TypeError>;

/// Result type alias for operations that can fail compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Classification of semantic-analysis failures.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and `Into<&'static str>`
/// implementations; the string form matches the variant name exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum TypeErrorKind {
    /// The referenced class (device kind) does not exist.
    UnknownKind,
    /// The class exists but has no function with the given name.
    UnknownFunction,
    /// An input parameter or filter names an argument the function does not declare.
    UnknownArgument,
    /// A value, parameter, or operand has a type that is not assignable to what the
    /// position requires.
    TypeMismatch,
    /// Two declarations, assignments, arguments, or dataset examples share a name.
    DuplicateDeclaration,
    /// A lexical binding would shadow a name already visible in the current scope.
    ScopeShadow,
    /// The operator does not exist in the operator table for this position.
    InvalidOperator,
    /// The operator exists but no overload accepts the operand types.
    InvalidOverload,
    /// The function is annotated `require_filter` and no filter was supplied.
    RequiresFilter,
    /// A projection is empty or would remove every output field.
    RequiresProjection,
    /// `monitor` was applied to a query that is not monitorable.
    NotMonitorable,
    /// A principal value is not a `tt:contact` or `tt:username` entity.
    InvalidPrincipal,
    /// An annotation with prescribed semantics carries the wrong type or sits on the
    /// wrong kind of function.
    InvalidAnnotation,
    /// The cancellation token fired at a suspension point.
    Cancelled,
}

/// A fatal semantic-analysis error.
///
/// Type errors abort analysis of the whole program: they propagate out of
/// `type_check_program` rather than being collected. `path` names the chain of
/// AST positions from the program root down to the offending node, outermost
/// first (e.g. `["rule 0", "stream", "filter"]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeError {
    pub kind: TypeErrorKind,
    pub message: String,
    pub path: Vec<String>,
}

impl TypeError {
    pub fn new(kind: TypeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: Vec::new(),
        }
    }

    /// Prepends a path segment, used while unwinding so the outermost caller
    /// contributes the first segment.
    #[must_use]
    pub fn at(mut self, segment: impl Into<String>) -> Self {
        self.path.insert(0, segment.into());
        self
    }

    pub fn cancelled() -> Self {
        Self::new(TypeErrorKind::Cancelled, "operation was cancelled")
    }
}

impl Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}: {}", self.kind, self.message)
        } else {
            write!(f, "{}: {} (at {})", self.kind, self.message, self.path.join(" / "))
        }
    }
}

impl std::error::Error for TypeError {}

/// Classification of compiler failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum CompileErrorKind {
    /// The construct typechecks but the instruction set cannot express it.
    UnsupportedConstruct,
    /// A join's operands bind the same output name with incompatible sources.
    AmbiguousJoin,
    /// A stream/table reference names no declaration or assignment in scope.
    UnboundVarRef,
}

/// An error produced while lowering a typed program to the rule IR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub message: String,
    /// Index of the rule being lowered when the error was detected.
    pub rule_index: usize,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, message: impl Into<String>, rule_index: usize) -> Self {
        Self {
            kind,
            message: message.into(),
            rule_index,
        }
    }
}

impl Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in rule {}: {}", self.kind, self.rule_index, self.message)
    }
}

impl std::error::Error for CompileError {}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn kind_round_trips_through_strings() {
        assert_eq!(TypeErrorKind::NotMonitorable.to_string(), "NotMonitorable");
        assert_eq!(
            TypeErrorKind::from_str("RequiresFilter").unwrap(),
            TypeErrorKind::RequiresFilter
        );
    }

    #[test]
    fn path_segments_accumulate_outermost_first() {
        let err = TypeError::new(TypeErrorKind::TypeMismatch, "Number is not assignable to String")
            .at("filter")
            .at("stream")
            .at("rule 0");
        assert_eq!(err.path, vec!["rule 0", "stream", "filter"]);
        assert!(err.to_string().contains("rule 0 / stream / filter"));
    }
}
