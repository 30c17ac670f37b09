//! AST normalization.
//!
//! Rewrites run bottom-up and repeat until nothing changes, so the result is
//! a fixpoint: `optimize(optimize(x)) == optimize(x)`. The rewrites move
//! nodes rather than cloning them, preserving resolved `schema` slots; the
//! few rules that create fresh nodes derive the slot from the nodes they
//! replace, so a typechecked program stays typechecked.

use std::rc::Rc;

use crate::ast::{
    BinaryOp, BooleanExpression, FunctionKind, Program, RuleSource, ScalarExpression, SchemaSlot, Stream, Table,
};
use crate::value::Value;

/// Normalizes every rule, declaration, and assignment of the program.
pub fn optimize_program(program: &mut Program) {
    let mut opt = Optimizer::default();
    program.rules = std::mem::take(&mut program.rules)
        .into_iter()
        .map(|mut rule| {
            rule.source = rule.source.take().map(|source| match source {
                RuleSource::Stream(stream) => RuleSource::Stream(opt.run_stream(stream)),
                RuleSource::Table(table) => RuleSource::Table(opt.run_table(table)),
            });
            rule
        })
        .collect();
    program.assignments = std::mem::take(&mut program.assignments)
        .into_iter()
        .map(|mut assignment| {
            assignment.value = opt.run_table(assignment.value);
            assignment
        })
        .collect();
}

/// Normalizes a filter to fixpoint. Exposed on its own because filters are
/// the most rewrite-heavy corner and get tested independently.
pub fn optimize_filter(filter: BooleanExpression) -> BooleanExpression {
    Optimizer::default().run_filter(filter)
}

/// Normalizes a table expression to fixpoint.
pub fn optimize_table(table: Table) -> Table {
    Optimizer::default().run_table(table)
}

/// Normalizes a stream expression to fixpoint.
pub fn optimize_stream(stream: Stream) -> Stream {
    Optimizer::default().run_stream(stream)
}

#[derive(Default)]
struct Optimizer {
    changed: bool,
}

impl Optimizer {
    fn run_filter(&mut self, mut filter: BooleanExpression) -> BooleanExpression {
        loop {
            self.changed = false;
            filter = self.filter(filter);
            if !self.changed {
                return filter;
            }
        }
    }

    fn run_table(&mut self, mut table: Table) -> Table {
        loop {
            self.changed = false;
            table = self.table(table);
            if !self.changed {
                return table;
            }
        }
    }

    fn run_stream(&mut self, mut stream: Stream) -> Stream {
        loop {
            self.changed = false;
            stream = self.stream(stream);
            if !self.changed {
                return stream;
            }
        }
    }

    fn mark(&mut self) {
        self.changed = true;
    }

    // --- filters --------------------------------------------------------------

    fn filter(&mut self, filter: BooleanExpression) -> BooleanExpression {
        match filter {
            BooleanExpression::True | BooleanExpression::False => filter,
            BooleanExpression::Not(inner) => self.negation(*inner),
            BooleanExpression::And(operands) => {
                let operands = self.junction_operands(operands, true);
                self.rebuild_junction(operands, true)
            }
            BooleanExpression::Or(operands) => {
                let operands = self.junction_operands(operands, false);
                let operands = self.merge_in_array(operands);
                self.rebuild_junction(operands, false)
            }
            BooleanExpression::Atom { name, operator, value } => BooleanExpression::Atom { name, operator, value },
            BooleanExpression::Compute { lhs, operator, rhs } => self.orient_compute(lhs, operator, rhs),
            BooleanExpression::External {
                selector,
                channel,
                in_params,
                filter,
                schema,
            } => BooleanExpression::External {
                selector,
                channel,
                in_params,
                filter: Box::new(self.filter(*filter)),
                schema,
            },
        }
    }

    /// Pushes a negation inward (De Morgan) and folds double negation.
    fn negation(&mut self, inner: BooleanExpression) -> BooleanExpression {
        match inner {
            BooleanExpression::True => {
                self.mark();
                BooleanExpression::False
            }
            BooleanExpression::False => {
                self.mark();
                BooleanExpression::True
            }
            BooleanExpression::Not(inner) => {
                self.mark();
                self.filter(*inner)
            }
            BooleanExpression::And(operands) => {
                self.mark();
                let negated = operands.into_iter().map(|o| BooleanExpression::Not(Box::new(o))).collect();
                self.filter(BooleanExpression::Or(negated))
            }
            BooleanExpression::Or(operands) => {
                self.mark();
                let negated = operands.into_iter().map(|o| BooleanExpression::Not(Box::new(o))).collect();
                self.filter(BooleanExpression::And(negated))
            }
            leaf => BooleanExpression::Not(Box::new(self.filter(leaf))),
        }
    }

    /// Optimizes, flattens, folds constants, dedupes, and sorts the operands
    /// of an and/or.
    fn junction_operands(&mut self, operands: Vec<BooleanExpression>, is_and: bool) -> Vec<BooleanExpression> {
        let mut flat = Vec::with_capacity(operands.len());
        for operand in operands {
            let operand = self.filter(operand);
            match (is_and, operand) {
                (true, BooleanExpression::And(nested)) | (false, BooleanExpression::Or(nested)) => {
                    self.mark();
                    flat.extend(nested);
                }
                (true, BooleanExpression::True) | (false, BooleanExpression::False) => {
                    self.mark();
                }
                (_, operand) => flat.push(operand),
            }
        }
        let mut unique: Vec<BooleanExpression> = Vec::with_capacity(flat.len());
        for operand in flat {
            if unique.contains(&operand) {
                self.mark();
            } else {
                unique.push(operand);
            }
        }
        let before: Vec<String> = unique.iter().map(|o| format!("{o:?}")).collect();
        unique.sort_by_key(|o| format!("{o:?}"));
        let after: Vec<String> = unique.iter().map(|o| format!("{o:?}")).collect();
        if before != after {
            self.mark();
        }
        unique
    }

    fn rebuild_junction(&mut self, mut operands: Vec<BooleanExpression>, is_and: bool) -> BooleanExpression {
        let absorbing = if is_and {
            BooleanExpression::False
        } else {
            BooleanExpression::True
        };
        if operands.contains(&absorbing) {
            self.mark();
            return absorbing;
        }
        match operands.len() {
            0 => {
                self.mark();
                if is_and {
                    BooleanExpression::True
                } else {
                    BooleanExpression::False
                }
            }
            1 => {
                self.mark();
                operands.remove(0)
            }
            _ if is_and => BooleanExpression::And(operands),
            _ => BooleanExpression::Or(operands),
        }
    }

    /// `x == c1 || x == c2` becomes `in_array(x, [c1, c2])`, folding any
    /// existing `in_array` atoms on the same field in.
    fn merge_in_array(&mut self, operands: Vec<BooleanExpression>) -> Vec<BooleanExpression> {
        let mergeable = |operand: &BooleanExpression| match operand {
            BooleanExpression::Atom {
                operator: BinaryOp::Eq,
                value,
                ..
            } => value.is_concrete(),
            BooleanExpression::Atom {
                operator: BinaryOp::InArray,
                value: Value::Array(_),
                ..
            } => true,
            _ => false,
        };

        struct Group {
            field: String,
            values: Vec<Value>,
            sources: usize,
            from_array: bool,
        }

        let mut kept: Vec<BooleanExpression> = Vec::with_capacity(operands.len());
        let mut groups: Vec<Group> = Vec::new();
        for operand in operands {
            if !mergeable(&operand) {
                kept.push(operand);
                continue;
            }
            if let BooleanExpression::Atom { name, operator, value } = operand {
                let from_array = operator == BinaryOp::InArray;
                let values = if from_array {
                    match value {
                        Value::Array(elements) => elements,
                        _ => unreachable!("mergeable checked the shape"),
                    }
                } else {
                    vec![value]
                };
                match groups.iter_mut().find(|g| g.field == name) {
                    Some(group) => {
                        group.values.extend(values);
                        group.sources += 1;
                    }
                    None => groups.push(Group {
                        field: name,
                        values,
                        sources: 1,
                        from_array,
                    }),
                }
            }
        }
        for group in groups {
            let Group {
                field,
                mut values,
                sources,
                from_array,
            } = group;
            let before = values.len();
            values.dedup();
            if values.len() == 1 {
                // Collapses to a plain equality, including `in_array(x, [c])`.
                if sources > 1 || values.len() != before || from_array {
                    self.mark();
                }
                kept.push(BooleanExpression::Atom {
                    name: field,
                    operator: BinaryOp::Eq,
                    value: values.remove(0),
                });
            } else {
                if sources > 1 || values.len() != before {
                    self.mark();
                }
                kept.push(BooleanExpression::Atom {
                    name: field,
                    operator: BinaryOp::InArray,
                    value: Value::Array(values),
                });
            }
        }
        kept
    }

    /// Puts the variable side of a computed comparison on the left, flipping
    /// the operator.
    fn orient_compute(&mut self, lhs: ScalarExpression, operator: BinaryOp, rhs: Value) -> BooleanExpression {
        if let ScalarExpression::Primary(lhs_value) = &lhs
            && lhs_value.is_concrete()
            && matches!(rhs, Value::VarRef(_) | Value::Computation(_))
            && let Some(flipped) = operator.flipped()
        {
            self.mark();
            return BooleanExpression::Compute {
                lhs: ScalarExpression::Primary(rhs),
                operator: flipped,
                rhs: match lhs {
                    ScalarExpression::Primary(value) => value,
                    _ => unreachable!("checked above"),
                },
            };
        }
        BooleanExpression::Compute { lhs, operator, rhs }
    }

    // --- tables ---------------------------------------------------------------

    fn table(&mut self, table: Table) -> Table {
        match table {
            Table::Filter { table, filter, schema } => {
                let inner = self.table(*table);
                let filter = self.filter(filter);
                match (inner, filter) {
                    // A satisfied filter disappears.
                    (inner, BooleanExpression::True) => {
                        self.mark();
                        inner
                    }
                    // Merge stacked filters into one conjunction.
                    (
                        Table::Filter {
                            table: innermost,
                            filter: inner_filter,
                            schema: _,
                        },
                        outer_filter,
                    ) => {
                        self.mark();
                        Table::Filter {
                            table: innermost,
                            filter: self.filter(BooleanExpression::And(vec![inner_filter, outer_filter])),
                            schema,
                        }
                    }
                    (inner, filter) => Table::Filter {
                        table: Box::new(inner),
                        filter,
                        schema,
                    },
                }
            }
            Table::Projection { table, args, schema } => {
                let inner = self.table(*table);
                self.projection(inner, args, schema)
            }
            Table::Compute {
                table,
                expression,
                alias,
                schema,
            } => Table::Compute {
                table: Box::new(self.table(*table)),
                expression,
                alias,
                schema,
            },
            Table::Sort {
                table,
                field,
                direction,
                schema,
            } => {
                let inner = self.table(*table);
                // Sorting on a renamed column sorts the original column.
                if let Table::Compute {
                    table: innermost,
                    expression: ScalarExpression::Primary(Value::VarRef(source)),
                    alias: Some(alias),
                    schema: compute_schema,
                } = inner
                {
                    if alias == field {
                        self.mark();
                        let sorted_schema = innermost.schema().clone_resolved();
                        return Table::Compute {
                            table: Box::new(Table::Sort {
                                table: innermost,
                                field: source.clone(),
                                direction,
                                schema: sorted_schema,
                            }),
                            expression: ScalarExpression::Primary(Value::VarRef(source)),
                            alias: Some(alias),
                            schema,
                        };
                    }
                    Table::Sort {
                        table: Box::new(Table::Compute {
                            table: innermost,
                            expression: ScalarExpression::Primary(Value::VarRef(source)),
                            alias: Some(alias),
                            schema: compute_schema,
                        }),
                        field,
                        direction,
                        schema,
                    }
                } else {
                    Table::Sort {
                        table: Box::new(inner),
                        field,
                        direction,
                        schema,
                    }
                }
            }
            Table::Alias { table, name, schema } => Table::Alias {
                table: Box::new(self.table(*table)),
                name,
                schema,
            },
            Table::Aggregation {
                table,
                field,
                operator,
                alias,
                schema,
            } => Table::Aggregation {
                table: Box::new(self.table(*table)),
                field,
                operator,
                alias,
                schema,
            },
            Table::Index { table, indices, schema } => Table::Index {
                table: Box::new(self.table(*table)),
                indices,
                schema,
            },
            Table::Slice { table, base, limit, schema } => Table::Slice {
                table: Box::new(self.table(*table)),
                base,
                limit,
                schema,
            },
            Table::Join { lhs, rhs, in_params, schema } => Table::Join {
                lhs: Box::new(self.table(*lhs)),
                rhs: Box::new(self.table(*rhs)),
                in_params,
                schema,
            },
            Table::Window { base, delta, stream, schema } => Table::Window {
                base,
                delta,
                stream: Box::new(self.stream(*stream)),
                schema,
            },
            Table::TimeSeries { base, delta, stream, schema } => Table::TimeSeries {
                base,
                delta,
                stream: Box::new(self.stream(*stream)),
                schema,
            },
            Table::Sequence { base, delta, table, schema } => Table::Sequence {
                base,
                delta,
                table: Box::new(self.table(*table)),
                schema,
            },
            Table::History { base, delta, table, schema } => Table::History {
                base,
                delta,
                table: Box::new(self.table(*table)),
                schema,
            },
            leaf @ (Table::Invocation(_) | Table::VarRef { .. } | Table::ResultRef { .. }) => leaf,
        }
    }

    fn projection(&mut self, inner: Table, args: Vec<String>, schema: SchemaSlot) -> Table {
        // Identity projection: every output of the inner table is kept.
        if let Some(inner_schema) = inner.schema().get() {
            let outs = inner_schema.out_names();
            if !outs.is_empty() && outs.iter().all(|o| args.contains(o)) && args.iter().all(|a| outs.contains(a)) {
                self.mark();
                return inner;
            }
        }
        match inner {
            // Nested projections collapse to the outermost.
            Table::Projection {
                table: innermost,
                args: inner_args,
                schema: _,
            } if args.iter().all(|a| inner_args.contains(a)) => {
                self.mark();
                Table::Projection {
                    table: innermost,
                    args,
                    schema,
                }
            }
            // A computed column that the projection drops was dead work.
            Table::Compute {
                table: innermost,
                expression,
                alias,
                schema: compute_schema,
            } => {
                let name = alias.clone().unwrap_or_default();
                if !name.is_empty() && !args.contains(&name) {
                    self.mark();
                    Table::Projection {
                        table: innermost,
                        args,
                        schema,
                    }
                } else {
                    Table::Projection {
                        table: Box::new(Table::Compute {
                            table: innermost,
                            expression,
                            alias,
                            schema: compute_schema,
                        }),
                        args,
                        schema,
                    }
                }
            }
            inner => Table::Projection {
                table: Box::new(inner),
                args,
                schema,
            },
        }
    }

    // --- streams --------------------------------------------------------------

    fn stream(&mut self, stream: Stream) -> Stream {
        match stream {
            Stream::Monitor { table, args, schema } => {
                let inner = self.table(*table);
                // Monitoring a projection monitors the underlying table on
                // the projected fields.
                if let Table::Projection {
                    table: innermost,
                    args: proj_args,
                    schema: _,
                } = inner
                {
                    self.mark();
                    let narrowed: Vec<String> = match args {
                        Some(existing) => existing.into_iter().filter(|a| proj_args.contains(a)).collect(),
                        None => proj_args.clone(),
                    };
                    let monitor_schema = match innermost.schema().get() {
                        Some(def) => {
                            let mut stream_def = (**def).clone();
                            stream_def.kind = FunctionKind::Stream;
                            stream_def.parent = None;
                            SchemaSlot::resolved(Rc::new(stream_def))
                        }
                        None => SchemaSlot::empty(),
                    };
                    Stream::Projection {
                        stream: Box::new(Stream::Monitor {
                            table: innermost,
                            args: Some(narrowed),
                            schema: monitor_schema,
                        }),
                        args: proj_args,
                        schema,
                    }
                } else {
                    Stream::Monitor {
                        table: Box::new(inner),
                        args,
                        schema,
                    }
                }
            }
            Stream::Filter { stream, filter, schema } => {
                let inner = self.stream(*stream);
                let filter = self.filter(filter);
                match (inner, filter) {
                    (inner, BooleanExpression::True) => {
                        self.mark();
                        inner
                    }
                    (
                        Stream::Filter {
                            stream: innermost,
                            filter: inner_filter,
                            schema: _,
                        },
                        outer_filter,
                    ) => {
                        self.mark();
                        Stream::Filter {
                            stream: innermost,
                            filter: self.filter(BooleanExpression::And(vec![inner_filter, outer_filter])),
                            schema,
                        }
                    }
                    (inner, filter) => Stream::Filter {
                        stream: Box::new(inner),
                        filter,
                        schema,
                    },
                }
            }
            Stream::EdgeFilter { stream, filter, schema } => Stream::EdgeFilter {
                stream: Box::new(self.stream(*stream)),
                filter: self.filter(filter),
                schema,
            },
            Stream::EdgeNew { stream, schema } => Stream::EdgeNew {
                stream: Box::new(self.stream(*stream)),
                schema,
            },
            Stream::Projection { stream, args, schema } => {
                let inner = self.stream(*stream);
                if let Some(inner_schema) = inner.schema().get() {
                    let outs = inner_schema.out_names();
                    if !outs.is_empty() && outs.iter().all(|o| args.contains(o)) && args.iter().all(|a| outs.contains(a))
                    {
                        self.mark();
                        return inner;
                    }
                }
                if let Stream::Projection {
                    stream: innermost,
                    args: inner_args,
                    schema: inner_schema,
                } = inner
                {
                    if args.iter().all(|a| inner_args.contains(a)) {
                        self.mark();
                        return Stream::Projection {
                            stream: innermost,
                            args,
                            schema,
                        };
                    }
                    return Stream::Projection {
                        stream: Box::new(Stream::Projection {
                            stream: innermost,
                            args: inner_args,
                            schema: inner_schema,
                        }),
                        args,
                        schema,
                    };
                }
                Stream::Projection {
                    stream: Box::new(inner),
                    args,
                    schema,
                }
            }
            Stream::Alias { stream, name, schema } => Stream::Alias {
                stream: Box::new(self.stream(*stream)),
                name,
                schema,
            },
            Stream::Join {
                stream,
                table,
                in_params,
                schema,
            } => Stream::Join {
                stream: Box::new(self.stream(*stream)),
                table: Box::new(self.table(*table)),
                in_params,
                schema,
            },
            leaf @ (Stream::Timer { .. } | Stream::AtTimer { .. } | Stream::VarRef { .. }) => leaf,
        }
    }
}
