use std::rc::Rc;

use qm_parser::{
    BinaryOp, DefaultEvaluatableFilter, EvaluationErrorPolicy, Expr, Parameter, QueryModel,
    QueryParser, Type, ops, partial_eval::evaluate_independent_subtrees,
};

fn main() {
    divan::main();
}

fn where_chain(length: usize) -> Rc<Expr> {
    (0..length).fold(ops::source("Source", Type::Int32), |source, i| {
        let x = Parameter::new(format!("x{i}"), Type::Int32);
        let n = i32::try_from(i).unwrap_or(i32::MAX);
        ops::where_(
            source,
            Expr::lambda(
                [Rc::clone(&x)],
                Expr::binary(BinaryOp::GreaterThan, Expr::parameter(&x), Expr::constant(n)),
            ),
        )
    })
}

fn constant_sum(terms: i32) -> Rc<Expr> {
    let x = Parameter::new("x", Type::Int32);
    (0..terms).fold(Expr::parameter(&x), |acc, n| {
        Expr::binary(
            BinaryOp::Add,
            acc,
            Expr::binary(BinaryOp::Multiply, Expr::constant(n), Expr::constant(2)),
        )
    })
}

#[divan::bench(args = [10, 100])]
fn parse_where_chain(bencher: divan::Bencher, length: usize) {
    let query = where_chain(length);
    let parser = QueryParser::default();

    bencher.bench_local(|| -> QueryModel { parser.parse(divan::black_box(&query)).unwrap() });
}

#[divan::bench(name = "parse_select_many_then_count")]
fn parse_select_many_then_count() -> QueryModel {
    let c = Parameter::new("c", Type::Int32);
    let x = Parameter::new("x", Type::Int32);
    let y = Parameter::new("y", Type::Int32);
    let query = ops::count(
        ops::select_many(
            ops::source("Source", Type::Int32),
            Expr::lambda([c], ops::source("Source2", Type::Int32)),
            Some(Expr::lambda(
                [Rc::clone(&x), Rc::clone(&y)],
                Expr::binary(BinaryOp::Add, Expr::parameter(&x), Expr::parameter(&y)),
            )),
        ),
        None,
    );

    QueryParser::default().parse(&query).unwrap()
}

#[divan::bench(args = [100, 1000])]
fn partial_evaluation(bencher: divan::Bencher, terms: i32) {
    let tree = constant_sum(terms);

    bencher.bench_local(|| {
        evaluate_independent_subtrees(
            divan::black_box(&tree),
            &DefaultEvaluatableFilter,
            EvaluationErrorPolicy::Defer,
        )
        .unwrap()
    });
}
