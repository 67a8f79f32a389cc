use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::{
    error::structural::StructuralError,
    expr::{Expr, Parameter},
    model::{QuerySource, QuerySourceReference},
    visitor::{ReplacingVisitor, VisitResult},
};

use super::{
    chain::{NodeId, OperationChain},
    single_param_lambda,
};

/// What applying an operation node contributed to the query model.
#[derive(Debug, Clone)]
pub enum ContextInfo {
    /// The node introduced a clause that yields items.
    QuerySource(Rc<QuerySource>),
    /// Index into the model's body clauses.
    BodyClause(usize),
    Selector,
    /// Index into the model's result operators.
    ResultOperator(usize),
}

/// Append-only record of the operation nodes applied so far.
///
/// Nodes are applied source-first and exactly once, so lookups only ever see
/// nodes that come before the current one.
#[derive(Debug, Default)]
pub struct ClauseGenerationContext {
    infos: FxHashMap<NodeId, ContextInfo>,
    last: Option<NodeId>,
    redirects: FxHashMap<NodeId, Rc<QuerySource>>,
}

impl ClauseGenerationContext {
    pub fn add(
        &mut self,
        id: NodeId,
        call: &Expr,
        info: ContextInfo,
    ) -> Result<(), StructuralError> {
        if self.infos.contains_key(&id) {
            return Err(StructuralError::AlreadyProcessed(call.to_string()));
        }
        debug_assert!(
            self.last.is_none_or(|last| last < id),
            "operation nodes must be applied source-first"
        );

        self.infos.insert(id, info);
        self.last = Some(id);
        Ok(())
    }

    pub fn get(&self, id: NodeId) -> Option<&ContextInfo> {
        self.infos.get(&id)
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Makes later references through `id` resolve to `source` instead.
    pub fn redirect(&mut self, id: NodeId, source: Rc<QuerySource>) {
        self.redirects.insert(id, source);
    }

    pub fn redirected(&self, id: NodeId) -> Option<&Rc<QuerySource>> {
        self.redirects.get(&id)
    }
}

/// Resolves lambda parameters against the nodes applied so far.
#[derive(Clone, Copy)]
pub struct ResolveCx<'a> {
    pub chain: &'a OperationChain,
    pub context: &'a ClauseGenerationContext,
}

impl<'a> ResolveCx<'a> {
    pub fn new(chain: &'a OperationChain, context: &'a ClauseGenerationContext) -> Self {
        Self { chain, context }
    }

    /// Rewrites `expression` so that `parameter`, which stands for an item
    /// produced by node `id`, is expressed through query source references.
    pub fn resolve(
        &self,
        id: NodeId,
        parameter: &Rc<Parameter>,
        expression: &Rc<Expr>,
    ) -> VisitResult {
        if let Some(source) = self.context.redirected(id) {
            let reference = QuerySourceReference::expr(source);
            return ReplacingVisitor::replace_parameter(parameter, &reference, expression);
        }

        self.chain[id].resolve(id, parameter, expression, self)
    }

    /// Resolves the body of a one-parameter lambda whose parameter is an item of `id`.
    pub fn resolve_lambda(&self, id: NodeId, lambda: &Rc<Expr>) -> VisitResult {
        let (parameter, body) = single_param_lambda(lambda)?;
        self.resolve(id, parameter, body)
    }

    /// The query source node `id` introduced.
    pub fn query_source(&self, id: NodeId) -> Result<Rc<QuerySource>, StructuralError> {
        let call = || self.chain[id].info().call.to_string();

        match self.context.get(id) {
            Some(ContextInfo::QuerySource(source)) => Ok(Rc::clone(source)),
            Some(_) => Err(StructuralError::NotAQuerySource(call())),
            None => Err(StructuralError::NotProcessed(call())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{expr::ops, parser::chain::ParseInfo, types::Type};

    #[test]
    fn test_add_twice_fails() {
        let mut context = ClauseGenerationContext::default();
        let call = ops::source("Source", Type::Int32);
        let id = NodeId::new(0);

        context
            .add(id, &call, ContextInfo::Selector)
            .expect("first add succeeds");

        assert_eq!(
            context.add(id, &call, ContextInfo::Selector),
            Err(StructuralError::AlreadyProcessed("Source".to_string()))
        );
        assert_eq!(context.len(), 1);
    }

    #[test]
    fn test_query_source_lookup() {
        let mut chain = OperationChain::default();
        let info = ParseInfo::new("x", ops::source("Source", Type::Int32));
        let id = chain.add(crate::parser::nodes::MainSourceNode::new(info));
        let mut context = ClauseGenerationContext::default();

        assert_eq!(
            ResolveCx::new(&chain, &context).query_source(id).unwrap_err(),
            StructuralError::NotProcessed("Source".to_string())
        );

        context
            .add(id, &chain[id].info().call, ContextInfo::Selector)
            .expect("add succeeds");

        assert_eq!(
            ResolveCx::new(&chain, &context).query_source(id).unwrap_err(),
            StructuralError::NotAQuerySource("Source".to_string())
        );
    }
}
