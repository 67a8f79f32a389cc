mod rules;

use std::{fmt, rc::Rc, sync::Arc};

use itertools::Itertools;
use rustc_hash::FxHashMap;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::{
    error::{InnerError, transform::TransformError, typing::TypeError},
    expr::{Expr, NodeKind},
    visitor::{VisitResult, Visitor, dispatch},
};

pub type RuleFn = dyn Fn(&Rc<Expr>) -> Result<Rc<Expr>, TransformError> + Send + Sync;

/// A named rewrite of one node into an equivalent one.
///
/// Returning the input `Rc` means "no change".
#[derive(Clone)]
pub struct RewriteRule {
    name: SmolStr,
    /// Empty for generic rules.
    kinds: SmallVec<[NodeKind; 2]>,
    func: Arc<RuleFn>,
}

impl RewriteRule {
    /// A rule that only applies to nodes of the given kinds.
    pub fn new<F>(name: impl Into<SmolStr>, kinds: impl IntoIterator<Item = NodeKind>, func: F) -> Self
    where
        F: Fn(&Rc<Expr>) -> Result<Rc<Expr>, TransformError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kinds: kinds.into_iter().collect(),
            func: Arc::new(func),
        }
    }

    /// A rule that is offered every node.
    pub fn generic<F>(name: impl Into<SmolStr>, func: F) -> Self
    where
        F: Fn(&Rc<Expr>) -> Result<Rc<Expr>, TransformError> + Send + Sync + 'static,
    {
        Self::new(name, [], func)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kinds(&self) -> &[NodeKind] {
        &self.kinds
    }

    pub fn is_generic(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn apply(&self, expr: &Rc<Expr>) -> VisitResult {
        let kind = expr.node_kind();

        if !self.is_generic() && !self.kinds.contains(&kind) {
            return Err(TypeError::KindMismatch {
                rule: self.name.clone(),
                expected: self.kinds.iter().join(" or "),
                actual: kind,
            }
            .into());
        }

        Ok((self.func)(expr)?)
    }
}

impl fmt::Debug for RewriteRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RewriteRule")
            .field("name", &self.name)
            .field("kinds", &self.kinds)
            .finish()
    }
}

/// Rewrite rules keyed by the node kind they handle.
#[derive(Debug, Clone, Default)]
pub struct TransformationRegistry {
    by_kind: FxHashMap<NodeKind, Vec<RewriteRule>>,
    generic: Vec<RewriteRule>,
}

impl TransformationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in simplifications.
    pub fn with_default_rules() -> Self {
        let mut registry = Self::new();
        rules::register_defaults(&mut registry);
        registry
    }

    pub fn register(&mut self, rule: RewriteRule) {
        if rule.is_generic() {
            self.generic.push(rule);
            return;
        }

        for kind in rule.kinds.iter().copied() {
            self.by_kind.entry(kind).or_default().push(rule.clone());
        }
    }

    /// Rules to try on `expr`: those registered for its kind, then the
    /// generic ones, each group in registration order.
    pub fn applicable(&self, expr: &Expr) -> Vec<&RewriteRule> {
        self.by_kind
            .get(&expr.node_kind())
            .into_iter()
            .flatten()
            .chain(self.generic.iter())
            .collect()
    }

    pub fn has_rules_for(&self, kind: NodeKind) -> bool {
        self.by_kind.contains_key(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty() && self.generic.is_empty()
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteOptions {
    /// Rewrites allowed at a single node before giving up on reaching a fixed point.
    pub max_rewrites_per_node: usize,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            max_rewrites_per_node: 64,
        }
    }
}

/// Rewrites `tree` bottom-up, running the applicable rules at each node
/// until none of them changes it.
pub fn rewrite(
    tree: &Rc<Expr>,
    registry: &TransformationRegistry,
    options: RewriteOptions,
) -> VisitResult {
    if registry.is_empty() {
        return Ok(Rc::clone(tree));
    }

    Rewriter { registry, options }.visit(tree)
}

struct Rewriter<'a> {
    registry: &'a TransformationRegistry,
    options: RewriteOptions,
}

impl Rewriter<'_> {
    fn rewrite_node(&self, mut current: Rc<Expr>) -> VisitResult {
        let mut rewrites = 0;

        'fixed_point: loop {
            for rule in self.registry.applicable(&current) {
                let rewritten = rule.apply(&current)?;
                if Rc::ptr_eq(&rewritten, &current) {
                    continue;
                }

                if !current.ty().is_assignable_from(rewritten.ty()) {
                    return Err(TypeError::Mismatch {
                        original: current.to_string(),
                        expected: current.ty().clone(),
                        replacement: rewritten.to_string(),
                        actual: rewritten.ty().clone(),
                    }
                    .into());
                }

                rewrites += 1;
                if rewrites > self.options.max_rewrites_per_node {
                    return Err(InnerError::Transform(TransformError::RewriteLimitExceeded {
                        expression: current.to_string(),
                        limit: self.options.max_rewrites_per_node,
                    }));
                }

                tracing::trace!(rule = rule.name(), from = %current, to = %rewritten, "rewrote node");
                current = rewritten;
                continue 'fixed_point;
            }

            return Ok(current);
        }
    }
}

impl Visitor for Rewriter<'_> {
    fn visit(&mut self, expr: &Rc<Expr>) -> VisitResult {
        let kind = expr.node_kind();
        let current = match kind {
            // Extensions with dedicated rules are handled whole.
            NodeKind::Extension(_) if self.registry.has_rules_for(kind) => Rc::clone(expr),
            _ => dispatch(self, expr)?,
        };

        self.rewrite_node(current)
    }
}
