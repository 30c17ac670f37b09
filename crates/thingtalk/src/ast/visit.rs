//! Read-only traversal over programs.
//!
//! `AstVisitor` gets a callback per primitive-bearing node; the `walk_*`
//! functions drive it in source order. [`iterate_primitives`] is the
//! collector the semantic analyzer uses to batch schema lookups before
//! checking anything.

use crate::ast::expression::BooleanExpression;
use crate::ast::invocation::{Invocation, Selector};
use crate::ast::program::{Declaration, DeclarationBody, Program, Rule, RuleSource};
use crate::ast::stream_table::{Action, Stream, Table};

/// Which primitive family a visited node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Stream,
    Table,
    Filter,
    Action,
}

/// Callbacks invoked by the `walk_*` functions. The lifetime ties the
/// references handed to the visitor to the walked program, so collectors can
/// retain them. All methods have empty defaults; implement only what you
/// need.
pub trait AstVisitor<'ast> {
    fn visit_invocation(&mut self, _kind: PrimitiveKind, _invocation: &'ast Invocation) {}
    fn visit_external(&mut self, _selector: &'ast Selector, _channel: &'ast str) {}
    fn visit_var_ref(&mut self, _kind: PrimitiveKind, _name: &'ast str) {}
}

pub fn walk_program<'ast>(visitor: &mut impl AstVisitor<'ast>, program: &'ast Program) {
    for decl in &program.declarations {
        walk_declaration(visitor, decl);
    }
    for assignment in &program.assignments {
        walk_table(visitor, &assignment.value);
    }
    for rule in &program.rules {
        walk_rule(visitor, rule);
    }
}

pub fn walk_declaration<'ast>(visitor: &mut impl AstVisitor<'ast>, decl: &'ast Declaration) {
    match &decl.body {
        DeclarationBody::Stream(stream) => walk_stream(visitor, stream),
        DeclarationBody::Table(table) => walk_table(visitor, table),
        DeclarationBody::Action(action) => walk_action(visitor, action),
    }
}

pub fn walk_rule<'ast>(visitor: &mut impl AstVisitor<'ast>, rule: &'ast Rule) {
    match &rule.source {
        Some(RuleSource::Stream(stream)) => walk_stream(visitor, stream),
        Some(RuleSource::Table(table)) => walk_table(visitor, table),
        None => {}
    }
    for action in &rule.actions {
        walk_action(visitor, action);
    }
}

pub fn walk_stream<'ast>(visitor: &mut impl AstVisitor<'ast>, stream: &'ast Stream) {
    match stream {
        Stream::Timer { .. } | Stream::AtTimer { .. } => {}
        Stream::Monitor { table, .. } => walk_table(visitor, table),
        Stream::EdgeNew { stream, .. } | Stream::Projection { stream, .. } | Stream::Alias { stream, .. } => {
            walk_stream(visitor, stream);
        }
        Stream::EdgeFilter { stream, filter, .. } | Stream::Filter { stream, filter, .. } => {
            walk_stream(visitor, stream);
            walk_filter(visitor, filter);
        }
        Stream::Join { stream, table, .. } => {
            walk_stream(visitor, stream);
            walk_table(visitor, table);
        }
        Stream::VarRef { name, .. } => visitor.visit_var_ref(PrimitiveKind::Stream, name),
    }
}

pub fn walk_table<'ast>(visitor: &mut impl AstVisitor<'ast>, table: &'ast Table) {
    match table {
        Table::Invocation(invocation) => visitor.visit_invocation(PrimitiveKind::Table, invocation),
        Table::VarRef { name, .. } => visitor.visit_var_ref(PrimitiveKind::Table, name),
        Table::Filter { table, filter, .. } => {
            walk_table(visitor, table);
            walk_filter(visitor, filter);
        }
        Table::Projection { table, .. }
        | Table::Alias { table, .. }
        | Table::Aggregation { table, .. }
        | Table::Sort { table, .. }
        | Table::Index { table, .. }
        | Table::Slice { table, .. }
        | Table::Compute { table, .. } => walk_table(visitor, table),
        Table::Join { lhs, rhs, .. } => {
            walk_table(visitor, lhs);
            walk_table(visitor, rhs);
        }
        Table::Window { stream, .. } | Table::TimeSeries { stream, .. } => walk_stream(visitor, stream),
        Table::Sequence { table, .. } | Table::History { table, .. } => walk_table(visitor, table),
        Table::ResultRef { .. } => {}
    }
}

pub fn walk_filter<'ast>(visitor: &mut impl AstVisitor<'ast>, filter: &'ast BooleanExpression) {
    match filter {
        BooleanExpression::True
        | BooleanExpression::False
        | BooleanExpression::Atom { .. }
        | BooleanExpression::Compute { .. } => {}
        BooleanExpression::And(operands) | BooleanExpression::Or(operands) => {
            for operand in operands {
                walk_filter(visitor, operand);
            }
        }
        BooleanExpression::Not(inner) => walk_filter(visitor, inner),
        BooleanExpression::External {
            selector,
            channel,
            filter,
            ..
        } => {
            visitor.visit_external(selector, channel);
            walk_filter(visitor, filter);
        }
    }
}

pub fn walk_action<'ast>(visitor: &mut impl AstVisitor<'ast>, action: &'ast Action) {
    match action {
        Action::Invocation(invocation) => visitor.visit_invocation(PrimitiveKind::Action, invocation),
        Action::Notify { .. } => {}
    }
}

/// A primitive yielded by [`iterate_primitives`].
#[derive(Debug, Clone, Copy)]
pub enum Primitive<'ast> {
    Invocation(&'ast Invocation),
    /// A sub-query predicate inside a filter.
    External(&'ast Selector, &'ast str),
    /// A reference to a declaration or assignment.
    VarRef(&'ast str),
}

impl Primitive<'_> {
    /// The class kind this primitive targets, if it targets one.
    pub fn kind_name(&self) -> Option<&str> {
        match self {
            Primitive::Invocation(invocation) => Some(&invocation.selector.kind),
            Primitive::External(selector, _) => Some(&selector.kind),
            Primitive::VarRef(_) => None,
        }
    }
}

struct PrimitiveCollector<'ast> {
    include_var_ref: bool,
    found: Vec<(PrimitiveKind, Primitive<'ast>)>,
}

impl<'ast> AstVisitor<'ast> for PrimitiveCollector<'ast> {
    fn visit_invocation(&mut self, kind: PrimitiveKind, invocation: &'ast Invocation) {
        self.found.push((kind, Primitive::Invocation(invocation)));
    }

    fn visit_external(&mut self, selector: &'ast Selector, channel: &'ast str) {
        self.found.push((PrimitiveKind::Filter, Primitive::External(selector, channel)));
    }

    fn visit_var_ref(&mut self, kind: PrimitiveKind, name: &'ast str) {
        if self.include_var_ref {
            self.found.push((kind, Primitive::VarRef(name)));
        }
    }
}

/// Yields every stream/table/filter/action primitive of the program in
/// source order, optionally including declaration references.
pub fn iterate_primitives(program: &Program, include_var_ref: bool) -> Vec<(PrimitiveKind, Primitive<'_>)> {
    let mut collector = PrimitiveCollector {
        include_var_ref,
        found: Vec::new(),
    };
    walk_program(&mut collector, program);
    collector.found
}
