use std::{fmt, mem, rc::Rc};

use crate::{
    error::{InnerError, structural::StructuralError, typing::TypeError},
    expr::Expr,
    model::{
        BodyClause, MainFromClause, OrderByClause, QueryModel, QuerySource, QuerySourceReference,
        ResultOperator, SelectClause, SubQueryExpr,
    },
};

use super::{
    chain::{NodeId, OperationChain},
    context::ClauseGenerationContext,
};

/// Accumulates clauses while operation nodes are applied.
///
/// Can be rendered at any point; a missing selector is shown as the main
/// source's item.
#[derive(Debug, Default)]
pub struct QueryModelBuilder {
    main_from_clause: Option<MainFromClause>,
    body_clauses: Vec<BodyClause>,
    selector: Option<Rc<Expr>>,
    result_operators: Vec<ResultOperator>,
}

impl QueryModelBuilder {
    pub fn main_from_clause(&self) -> Option<&MainFromClause> {
        self.main_from_clause.as_ref()
    }

    pub fn set_main_from_clause(&mut self, clause: MainFromClause) {
        self.main_from_clause = Some(clause);
    }

    pub fn body_clauses(&self) -> &[BodyClause] {
        &self.body_clauses
    }

    /// Appends a body clause and returns its index.
    pub fn add_body_clause(&mut self, clause: BodyClause) -> usize {
        self.body_clauses.push(clause);
        self.body_clauses.len() - 1
    }

    /// The order-by clause at the end of the body, if the body ends with one.
    pub fn last_order_by_mut(&mut self) -> Option<&mut OrderByClause> {
        match self.body_clauses.last_mut() {
            Some(BodyClause::OrderBy(clause)) => Some(clause),
            _ => None,
        }
    }

    pub fn selector(&self) -> Option<&Rc<Expr>> {
        self.selector.as_ref()
    }

    pub fn set_selector(&mut self, selector: Rc<Expr>) {
        self.selector = Some(selector);
    }

    pub fn result_operators(&self) -> &[ResultOperator] {
        &self.result_operators
    }

    /// Appends a result operator and returns its index.
    pub fn add_result_operator(&mut self, operator: ResultOperator) -> usize {
        self.result_operators.push(operator);
        self.result_operators.len() - 1
    }

    pub fn build(self) -> Result<QueryModel, StructuralError> {
        let main_from_clause = self
            .main_from_clause
            .ok_or(StructuralError::MissingMainFromClause)?;
        let selector = self
            .selector
            .unwrap_or_else(|| QuerySourceReference::expr(&main_from_clause.source));

        Ok(QueryModel {
            main_from_clause,
            body_clauses: self.body_clauses,
            select_clause: SelectClause::new(selector),
            result_operators: self.result_operators,
        })
    }

    /// Builds the model so far and leaves the builder empty.
    pub fn take(&mut self) -> Result<QueryModel, StructuralError> {
        mem::take(self).build()
    }
}

impl fmt::Display for QueryModelBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.main_from_clause {
            Some(clause) => write!(f, "{clause}")?,
            None => write!(f, "from ?")?,
        }
        for clause in &self.body_clauses {
            write!(f, " {clause}")?;
        }
        match (&self.selector, &self.main_from_clause) {
            (Some(selector), _) => write!(f, " select {selector}")?,
            (None, Some(clause)) => write!(f, " select {}", clause.source.item_name)?,
            (None, None) => write!(f, " select ?")?,
        }
        for operator in &self.result_operators {
            write!(f, " => {operator}")?;
        }
        Ok(())
    }
}

/// Applies the nodes ending at `result` source-first and returns the model.
pub(crate) fn build_query_model(
    chain: &OperationChain,
    result: NodeId,
) -> Result<QueryModel, InnerError> {
    let mut nodes = Vec::with_capacity(chain.len());
    let mut current = Some(result);
    while let Some(id) = current {
        nodes.push(id);
        current = chain[id].source();
    }

    let mut builder = QueryModelBuilder::default();
    let mut context = ClauseGenerationContext::default();

    for id in nodes.into_iter().rev() {
        let node = &chain[id];

        if !node.is_result_operator()
            && let Some(source) = node.source()
            && chain[source].is_result_operator()
        {
            wrap_as_sub_query(&mut builder, &mut context, chain, source)?;
        }

        tracing::trace!(node = node.name(), call = %node.info().call, "applying operation");
        node.apply(id, &mut builder, &mut context, chain)?;
    }

    Ok(builder.build()?)
}

/// Continues a query after a result operator: the model built so far becomes
/// the main source of a fresh model, and references through `source` resolve
/// to that new main source.
fn wrap_as_sub_query(
    builder: &mut QueryModelBuilder,
    context: &mut ClauseGenerationContext,
    chain: &OperationChain,
    source: NodeId,
) -> Result<(), InnerError> {
    let model = builder.take()?;
    let ty = model.result_type();
    let Some(item_type) = ty.item_type().cloned() else {
        return Err(TypeError::NotASequence {
            expression: model.to_string(),
            ty,
        }
        .into());
    };
    tracing::trace!(%model, "wrapping query model as sub-query");

    let query_source = QuerySource::new(
        chain[source].info().associated_identifier.clone(),
        item_type,
    );
    builder.set_main_from_clause(MainFromClause::new(
        Rc::clone(&query_source),
        SubQueryExpr::expr(model, ty),
    ));
    context.redirect(source, query_source);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        expr::ops,
        model::{ResultOperator, WhereClause},
        types::Type,
    };

    #[test]
    fn test_renders_default_selector() {
        let mut builder = QueryModelBuilder::default();
        assert_eq!(builder.to_string(), "from ? select ?");

        let source = QuerySource::new("x", Type::Int32);
        builder.set_main_from_clause(MainFromClause::new(
            Rc::clone(&source),
            ops::source("Source", Type::Int32),
        ));
        builder.add_body_clause(BodyClause::Where(WhereClause {
            predicate: Expr::constant(true),
        }));
        builder.add_result_operator(ResultOperator::Count);

        assert_eq!(
            builder.to_string(),
            "from Int32 x in Source where true select x => Count()"
        );
        assert_eq!(
            builder.take().expect("model builds").to_string(),
            "from Int32 x in Source where true select x => Count()"
        );
        assert!(builder.main_from_clause().is_none());
    }

    #[test]
    fn test_build_requires_main_from_clause() {
        assert_eq!(
            QueryModelBuilder::default().build().unwrap_err(),
            StructuralError::MissingMainFromClause
        );
    }

    #[test]
    fn test_last_order_by() {
        let mut builder = QueryModelBuilder::default();
        assert!(builder.last_order_by_mut().is_none());

        builder.add_body_clause(BodyClause::OrderBy(OrderByClause::default()));
        assert!(builder.last_order_by_mut().is_some());

        builder.add_body_clause(BodyClause::Where(WhereClause {
            predicate: Expr::constant(true),
        }));
        assert!(builder.last_order_by_mut().is_none());
    }
}
