use std::{fmt::Display, rc::Rc};

use crate::{
    error::{InnerError, structural::StructuralError},
    expr::{Expr, ExprKind, Parameter},
    model::{BodyClause, QueryModel, QuerySource, QuerySourceReference, ResultOperator, SubQueryExpr},
    visitor::{QueryExprVisitor, UnknownKindPolicy, VisitResult, Visitor, walk_children},
};

/// Checks that every query source reference points at a clause visible from
/// where it is used, and that no lambda parameter is left unbound.
pub fn validate(model: &QueryModel) -> Result<(), InnerError> {
    Validator::default().model(model)
}

#[derive(Debug, Default)]
struct Validator {
    visible: Vec<Rc<QuerySource>>,
    parameters: Vec<Rc<Parameter>>,
    clause: String,
}

impl Validator {
    fn model(&mut self, model: &QueryModel) -> Result<(), InnerError> {
        let outer = self.visible.len();

        self.check(&model.main_from_clause, &model.main_from_clause.from_expression)?;
        self.visible.push(Rc::clone(&model.main_from_clause.source));

        for clause in &model.body_clauses {
            match clause {
                BodyClause::Where(where_clause) => self.check(clause, &where_clause.predicate)?,
                BodyClause::OrderBy(order_by) => {
                    for ordering in &order_by.orderings {
                        self.check(clause, &ordering.expression)?;
                    }
                }
                BodyClause::AdditionalFrom(from) => {
                    self.check(clause, &from.from_expression)?;
                }
                BodyClause::Join(join) => {
                    self.check(clause, &join.inner_sequence)?;
                    self.check(clause, &join.outer_key_selector)?;
                    self.visible.push(Rc::clone(&join.source));
                    self.check(clause, &join.inner_key_selector)?;
                    self.visible.pop();
                }
                BodyClause::GroupJoin(group_join) => {
                    let join = &group_join.join_clause;
                    self.check(clause, &join.inner_sequence)?;
                    self.check(clause, &join.outer_key_selector)?;
                    self.visible.push(Rc::clone(&join.source));
                    self.check(clause, &join.inner_key_selector)?;
                    self.visible.pop();
                }
            }

            if let Some(source) = clause.query_source() {
                self.visible.push(Rc::clone(source));
            }
        }

        self.check(&model.select_clause, &model.select_clause.selector)?;

        for operator in &model.result_operators {
            let mut operator = operator.clone();
            let clause = operator.to_string();
            operator.transform_expressions(&mut |expr| {
                self.clause.clone_from(&clause);
                self.visit(expr)
            })?;

            if let ResultOperator::GroupBy { source, .. } = &operator {
                self.visible.push(Rc::clone(source));
            }
        }

        self.visible.truncate(outer);
        Ok(())
    }

    fn check(&mut self, clause: &dyn Display, expr: &Rc<Expr>) -> Result<(), InnerError> {
        self.clause = clause.to_string();
        self.visit(expr)?;
        Ok(())
    }
}

impl Visitor for Validator {
    fn visit_parameter(&mut self, expr: &Rc<Expr>) -> VisitResult {
        if let ExprKind::Parameter(parameter) = expr.kind()
            && !self
                .parameters
                .iter()
                .any(|bound| Rc::ptr_eq(bound, parameter))
        {
            return Err(StructuralError::DanglingParameter {
                clause: self.clause.clone(),
                parameter: parameter.name.clone(),
            }
            .into());
        }

        Ok(Rc::clone(expr))
    }

    fn visit_lambda(&mut self, expr: &Rc<Expr>) -> VisitResult {
        let bound = self.parameters.len();
        if let Some((params, _)) = expr.as_lambda() {
            self.parameters.extend(params.iter().cloned());
        }

        let result = walk_children(self, expr);
        self.parameters.truncate(bound);
        result
    }

    fn unknown_kind_policy(&self) -> UnknownKindPolicy {
        UnknownKindPolicy::PassThrough
    }

    fn query_capability(&mut self) -> Option<&mut dyn QueryExprVisitor> {
        Some(self)
    }
}

impl QueryExprVisitor for Validator {
    fn visit_query_source_reference(
        &mut self,
        expr: &Rc<Expr>,
        reference: &QuerySourceReference,
    ) -> VisitResult {
        if !self
            .visible
            .iter()
            .any(|source| reference.refers_to(source))
        {
            return Err(StructuralError::UnresolvedReference {
                clause: self.clause.clone(),
                reference: reference.source().item_name.clone(),
            }
            .into());
        }

        Ok(Rc::clone(expr))
    }

    fn visit_sub_query(&mut self, expr: &Rc<Expr>, sub_query: &SubQueryExpr) -> VisitResult {
        let clause = std::mem::take(&mut self.clause);
        self.model(&sub_query.model())?;
        self.clause = clause;
        Ok(Rc::clone(expr))
    }
}
