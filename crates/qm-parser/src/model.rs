mod clauses;
mod expressions;
mod result_operator;

use std::{fmt, rc::Rc};

use smol_str::SmolStr;

pub use clauses::{
    AdditionalFromClause, BodyClause, GroupJoinClause, JoinClause, MainFromClause, OrderByClause,
    Ordering, OrderingDirection, SelectClause, WhereClause,
};
pub use expressions::{QuerySourceReference, SubQueryExpr};
pub use result_operator::ResultOperator;

use crate::{error::InnerError, expr::Expr, types::Type, visitor::VisitResult};

pub type ExprTransform<'a> = dyn FnMut(&Rc<Expr>) -> VisitResult + 'a;

/// A clause that yields items: the target of a [`QuerySourceReference`].
///
/// Compared by identity.
#[derive(Debug)]
pub struct QuerySource {
    pub item_name: SmolStr,
    pub item_type: Type,
}

impl QuerySource {
    pub fn new(item_name: impl Into<SmolStr>, item_type: Type) -> Rc<Self> {
        Rc::new(Self {
            item_name: item_name.into(),
            item_type,
        })
    }
}

impl fmt::Display for QuerySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.item_type, self.item_name)
    }
}

/// The structured result of parsing one operation chain.
#[derive(Debug, Clone)]
pub struct QueryModel {
    pub main_from_clause: MainFromClause,
    pub body_clauses: Vec<BodyClause>,
    pub select_clause: SelectClause,
    pub result_operators: Vec<ResultOperator>,
}

impl QueryModel {
    pub fn new(main_from_clause: MainFromClause, select_clause: SelectClause) -> Self {
        Self {
            main_from_clause,
            body_clauses: Vec::new(),
            select_clause,
            result_operators: Vec::new(),
        }
    }

    /// The type of what executing the query would produce.
    pub fn result_type(&self) -> Type {
        let selected = self
            .main_from_clause
            .from_expression
            .ty()
            .with_item(self.select_clause.selector.ty().clone());

        self.result_operators
            .iter()
            .fold(selected, |ty, operator| operator.result_type(&ty))
    }

    /// Every clause that yields items, in clause order.
    pub fn query_sources(&self) -> impl Iterator<Item = &Rc<QuerySource>> {
        std::iter::once(&self.main_from_clause.source)
            .chain(self.body_clauses.iter().filter_map(BodyClause::query_source))
            .chain(
                self.result_operators
                    .iter()
                    .filter_map(ResultOperator::query_source),
            )
    }

    /// Replaces every expression held by the model's clauses with `f`'s result.
    pub fn transform_expressions(&mut self, f: &mut ExprTransform<'_>) -> Result<(), InnerError> {
        self.main_from_clause.transform_expressions(f)?;
        for clause in self.body_clauses.iter_mut() {
            clause.transform_expressions(f)?;
        }
        self.select_clause.transform_expressions(f)?;
        for operator in self.result_operators.iter_mut() {
            operator.transform_expressions(f)?;
        }
        Ok(())
    }
}

impl fmt::Display for QueryModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.main_from_clause)?;
        for clause in &self.body_clauses {
            write!(f, " {clause}")?;
        }
        write!(f, " {}", self.select_clause)?;
        for operator in &self.result_operators {
            write!(f, " => {operator}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::expr::{BinaryOp, ops};

    #[fixture]
    fn model() -> QueryModel {
        let source = QuerySource::new("x", Type::Int32);
        let reference = QuerySourceReference::expr(&source);
        let mut model = QueryModel::new(
            MainFromClause::new(Rc::clone(&source), ops::source("Source", Type::Int32)),
            SelectClause::new(Rc::clone(&reference)),
        );
        model.body_clauses.push(BodyClause::Where(WhereClause {
            predicate: Expr::binary(BinaryOp::GreaterThan, reference, Expr::constant(10)),
        }));
        model
    }

    #[rstest]
    fn test_display(model: QueryModel) {
        assert_eq!(
            model.to_string(),
            "from Int32 x in Source where (x > 10) select x"
        );
    }

    #[rstest]
    fn test_result_type_with_operators(mut model: QueryModel) {
        assert_eq!(model.result_type(), Type::queryable(Type::Int32));

        model.result_operators.push(ResultOperator::Take(Expr::constant(5)));
        model.result_operators.push(ResultOperator::Count);

        assert_eq!(model.result_type(), Type::Int32);
        assert_eq!(
            model.to_string(),
            "from Int32 x in Source where (x > 10) select x => Take(5) => Count()"
        );
    }

    #[rstest]
    fn test_transform_expressions_visits_every_clause(mut model: QueryModel) {
        let mut seen = Vec::new();
        model
            .transform_expressions(&mut |expr| {
                seen.push(expr.to_string());
                Ok(Rc::clone(expr))
            })
            .expect("transform succeeds");

        assert_eq!(seen, vec!["Source", "(x > 10)", "x"]);
    }

    #[rstest]
    fn test_sub_query_display(model: QueryModel) {
        let ty = model.result_type();
        let sub_query = SubQueryExpr::expr(model, ty);

        assert_eq!(
            sub_query.to_string(),
            "{from Int32 x in Source where (x > 10) select x}"
        );
        assert!(sub_query.as_extension::<SubQueryExpr>().is_some());
    }

    #[rstest]
    fn test_query_sources(model: QueryModel) {
        let names = model
            .query_sources()
            .map(|source| source.item_name.as_str())
            .collect::<Vec<_>>();

        assert_eq!(names, vec!["x"]);
    }
}
