//! Stream, table, and action expressions — the three primitive families a
//! rule composes.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::ast::expression::{AggregationOp, BooleanExpression, ScalarExpression};
use crate::ast::invocation::{InputParam, Invocation, SchemaSlot};
use crate::value::Value;

/// Sort order for `Table::Sort`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// A stream expression: something that pushes timestamped records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stream {
    /// Fires every `interval` starting at `base`.
    Timer {
        base: Value,
        interval: Value,
        schema: SchemaSlot,
    },
    /// Fires at the given times of day until `expiration`.
    AtTimer {
        times: Vec<Value>,
        expiration: Option<Value>,
        schema: SchemaSlot,
    },
    /// Subscribes to changes of a monitorable query. `args` restricts which
    /// output fields participate in change detection.
    Monitor {
        table: Box<Table>,
        args: Option<Vec<String>>,
        schema: SchemaSlot,
    },
    /// Emits only records not seen before on the inner stream.
    EdgeNew {
        stream: Box<Stream>,
        schema: SchemaSlot,
    },
    /// Emits only at false→true transitions of the predicate.
    EdgeFilter {
        stream: Box<Stream>,
        filter: BooleanExpression,
        schema: SchemaSlot,
    },
    Filter {
        stream: Box<Stream>,
        filter: BooleanExpression,
        schema: SchemaSlot,
    },
    Projection {
        stream: Box<Stream>,
        args: Vec<String>,
        schema: SchemaSlot,
    },
    Alias {
        stream: Box<Stream>,
        name: String,
        schema: SchemaSlot,
    },
    /// For each stream record, invoke the table and join the results.
    Join {
        stream: Box<Stream>,
        table: Box<Table>,
        in_params: Vec<InputParam>,
        schema: SchemaSlot,
    },
    /// Reference to a stream declaration.
    VarRef {
        name: String,
        in_params: Vec<InputParam>,
        schema: SchemaSlot,
    },
}

impl Stream {
    pub fn monitor(table: Table) -> Self {
        Stream::Monitor {
            table: Box::new(table),
            args: None,
            schema: SchemaSlot::empty(),
        }
    }

    pub fn filtered(stream: Stream, filter: BooleanExpression) -> Self {
        Stream::Filter {
            stream: Box::new(stream),
            filter,
            schema: SchemaSlot::empty(),
        }
    }

    pub fn schema(&self) -> &SchemaSlot {
        match self {
            Stream::Timer { schema, .. }
            | Stream::AtTimer { schema, .. }
            | Stream::Monitor { schema, .. }
            | Stream::EdgeNew { schema, .. }
            | Stream::EdgeFilter { schema, .. }
            | Stream::Filter { schema, .. }
            | Stream::Projection { schema, .. }
            | Stream::Alias { schema, .. }
            | Stream::Join { schema, .. }
            | Stream::VarRef { schema, .. } => schema,
        }
    }

    pub fn schema_mut(&mut self) -> &mut SchemaSlot {
        match self {
            Stream::Timer { schema, .. }
            | Stream::AtTimer { schema, .. }
            | Stream::Monitor { schema, .. }
            | Stream::EdgeNew { schema, .. }
            | Stream::EdgeFilter { schema, .. }
            | Stream::Filter { schema, .. }
            | Stream::Projection { schema, .. }
            | Stream::Alias { schema, .. }
            | Stream::Join { schema, .. }
            | Stream::VarRef { schema, .. } => schema,
        }
    }
}

/// A table expression: a database-like functional call tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Table {
    Invocation(Invocation),
    /// Reference to a table declaration or assignment.
    VarRef {
        name: String,
        in_params: Vec<InputParam>,
        schema: SchemaSlot,
    },
    Filter {
        table: Box<Table>,
        filter: BooleanExpression,
        schema: SchemaSlot,
    },
    Projection {
        table: Box<Table>,
        args: Vec<String>,
        schema: SchemaSlot,
    },
    Alias {
        table: Box<Table>,
        name: String,
        schema: SchemaSlot,
    },
    Aggregation {
        table: Box<Table>,
        /// The aggregated output field; `*` only with `count`.
        field: String,
        operator: AggregationOp,
        alias: Option<String>,
        schema: SchemaSlot,
    },
    Sort {
        table: Box<Table>,
        field: String,
        direction: SortDirection,
        schema: SchemaSlot,
    },
    /// Select rows by 1-based indices.
    Index {
        table: Box<Table>,
        indices: Vec<Value>,
        schema: SchemaSlot,
    },
    /// Select `limit` rows starting at 1-based `base`.
    Slice {
        table: Box<Table>,
        base: Value,
        limit: Value,
        schema: SchemaSlot,
    },
    /// Add a computed output column.
    Compute {
        table: Box<Table>,
        expression: ScalarExpression,
        alias: Option<String>,
        schema: SchemaSlot,
    },
    Join {
        lhs: Box<Table>,
        rhs: Box<Table>,
        in_params: Vec<InputParam>,
        schema: SchemaSlot,
    },
    /// The last `delta` records of a memory stream, ending at `base`.
    Window {
        base: Value,
        delta: Value,
        stream: Box<Stream>,
        schema: SchemaSlot,
    },
    /// The records of a memory stream between `base - delta` and `base`.
    TimeSeries {
        base: Value,
        delta: Value,
        stream: Box<Stream>,
        schema: SchemaSlot,
    },
    /// The last `delta` rows of a memory table, ending at `base`.
    Sequence {
        base: Value,
        delta: Value,
        table: Box<Table>,
        schema: SchemaSlot,
    },
    /// The rows of a memory table between `base - delta` and `base`.
    History {
        base: Value,
        delta: Value,
        table: Box<Table>,
        schema: SchemaSlot,
    },
    /// A previously computed result of another program's function.
    ResultRef {
        kind: String,
        channel: String,
        index: Value,
        schema: SchemaSlot,
    },
}

impl Table {
    pub fn invocation(invocation: Invocation) -> Self {
        Table::Invocation(invocation)
    }

    pub fn filtered(table: Table, filter: BooleanExpression) -> Self {
        Table::Filter {
            table: Box::new(table),
            filter,
            schema: SchemaSlot::empty(),
        }
    }

    pub fn projection(table: Table, args: Vec<String>) -> Self {
        Table::Projection {
            table: Box::new(table),
            args,
            schema: SchemaSlot::empty(),
        }
    }

    pub fn join(lhs: Table, rhs: Table, in_params: Vec<InputParam>) -> Self {
        Table::Join {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            in_params,
            schema: SchemaSlot::empty(),
        }
    }

    pub fn schema(&self) -> &SchemaSlot {
        match self {
            Table::Invocation(inv) => &inv.schema,
            Table::VarRef { schema, .. }
            | Table::Filter { schema, .. }
            | Table::Projection { schema, .. }
            | Table::Alias { schema, .. }
            | Table::Aggregation { schema, .. }
            | Table::Sort { schema, .. }
            | Table::Index { schema, .. }
            | Table::Slice { schema, .. }
            | Table::Compute { schema, .. }
            | Table::Join { schema, .. }
            | Table::Window { schema, .. }
            | Table::TimeSeries { schema, .. }
            | Table::Sequence { schema, .. }
            | Table::History { schema, .. }
            | Table::ResultRef { schema, .. } => schema,
        }
    }

    pub fn schema_mut(&mut self) -> &mut SchemaSlot {
        match self {
            Table::Invocation(inv) => &mut inv.schema,
            Table::VarRef { schema, .. }
            | Table::Filter { schema, .. }
            | Table::Projection { schema, .. }
            | Table::Alias { schema, .. }
            | Table::Aggregation { schema, .. }
            | Table::Sort { schema, .. }
            | Table::Index { schema, .. }
            | Table::Slice { schema, .. }
            | Table::Compute { schema, .. }
            | Table::Join { schema, .. }
            | Table::Window { schema, .. }
            | Table::TimeSeries { schema, .. }
            | Table::Sequence { schema, .. }
            | Table::History { schema, .. }
            | Table::ResultRef { schema, .. } => schema,
        }
    }
}

/// One action of a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    Invocation(Invocation),
    /// The builtin `notify`: deliver the triggering record to the program
    /// owner.
    Notify { schema: SchemaSlot },
}

impl Action {
    pub fn notify() -> Self {
        Action::Notify {
            schema: SchemaSlot::empty(),
        }
    }

    pub fn schema(&self) -> &SchemaSlot {
        match self {
            Action::Invocation(inv) => &inv.schema,
            Action::Notify { schema } => schema,
        }
    }

    pub fn schema_mut(&mut self) -> &mut SchemaSlot {
        match self {
            Action::Invocation(inv) => &mut inv.schema,
            Action::Notify { schema } => schema,
        }
    }
}
