#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_possible_truncation, reason = "numeric narrowing is checked at the call sites")]

pub mod ast;
mod builtin;
pub mod compile;
mod error;
mod factor;
mod optimize;
mod schema;
mod scope;
mod trace;
pub mod typecheck;
mod types;
mod units;
mod value;

pub use crate::{
    builtin::REMOTE_BROKER_KIND,
    compile::compile_program,
    compile::ir,
    error::{CompileError, CompileErrorKind, CompileResult, TypeError, TypeErrorKind, TypeResult},
    factor::{factor_remote, FactorOptions, FactoredProgram, RemoteProgram},
    optimize::{optimize_filter, optimize_program, optimize_stream, optimize_table},
    schema::{CancellationToken, SchemaClient, SchemaError, SchemaRetriever},
    scope::{Scope, ScopeEntry},
    trace::{NoopTracer, RecordingTracer, SchemaEvent, SchemaTracer, StderrTracer},
    typecheck::{
        type_check_bookkeeping, type_check_class, type_check_example, type_check_meta, type_check_permission_rule,
        type_check_program, TypeCheckOptions,
    },
    types::{is_assignable, EntitySubtypes, Type, TypeScope, ENTITY_VAR, UNIT_VAR},
    units::{is_base_unit, normalize_unit, to_base_unit},
    value::{DateEdge, DateValue, EventField, LocationValue, RelativeLocation, TimeValue, Value},
};
