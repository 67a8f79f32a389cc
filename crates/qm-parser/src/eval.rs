pub mod error;

use std::{cmp::Ordering, rc::Rc};

use error::EvalError;

use crate::{
    expr::{BinaryOp, Expr, ExprKind, MethodKind, Parameter, UnaryOp},
    partial_eval::PartialEvaluationFailure,
    types::Type,
    value::{RecordValue, Value},
};

/// In-memory evaluator for parameter-bound trees.
///
/// Used by the partial evaluator to fold constant sub-trees, and to check that
/// a folded tree behaves like the original for a given set of bindings.
#[derive(Debug, Default, Clone)]
pub struct Evaluator {
    bindings: Vec<(Rc<Parameter>, Value)>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, param: &Rc<Parameter>, value: Value) -> Self {
        self.bindings.push((Rc::clone(param), value));
        self
    }

    pub fn evaluate(&self, expr: &Rc<Expr>) -> Result<Value, EvalError> {
        match expr.kind() {
            ExprKind::Constant(value) => Ok(value.clone()),
            ExprKind::Parameter(param) => self
                .bindings
                .iter()
                .rev()
                .find_map(|(bound, value)| Rc::ptr_eq(bound, param).then(|| value.clone()))
                .ok_or_else(|| EvalError::UnboundParameter(param.name.clone())),
            ExprKind::Binary { op, left, right } => self.eval_binary(*op, left, right, expr),
            ExprKind::Unary { op, operand } => {
                let value = self.evaluate(operand)?;
                match op {
                    UnaryOp::Not => match value {
                        Value::Boolean(b) => Ok(Value::Boolean(!b)),
                        Value::Null => Ok(Value::Null),
                        v => Err(invalid_types("Not", [&v])),
                    },
                    UnaryOp::Negate => match value {
                        Value::Int32(n) => n
                            .checked_neg()
                            .map(Value::Int32)
                            .ok_or_else(|| EvalError::Overflow(expr.to_string())),
                        Value::Int64(n) => n
                            .checked_neg()
                            .map(Value::Int64)
                            .ok_or_else(|| EvalError::Overflow(expr.to_string())),
                        Value::Double(n) => Ok(Value::Double(-n)),
                        v => Err(invalid_types("-", [&v])),
                    },
                    UnaryOp::Convert => convert(value, expr.ty(), expr),
                }
            }
            ExprKind::Call {
                method,
                object,
                args,
            } => match method.kind {
                MethodKind::Native(func) => {
                    let object = object.as_ref().map(|o| self.evaluate(o)).transpose()?;
                    let args = args
                        .iter()
                        .map(|arg| self.evaluate(arg))
                        .collect::<Result<Vec<_>, _>>()?;
                    func(object.as_ref(), &args)
                }
                MethodKind::QueryOperator | MethodKind::Opaque => {
                    Err(EvalError::NotEvaluatable(expr.to_string()))
                }
            },
            ExprKind::Member {
                object: Some(object),
                name,
            } => {
                let value = self.evaluate(object)?;
                let unknown = || EvalError::UnknownMember(value.name().into(), name.clone());
                match (&value, name.as_str()) {
                    (Value::Record(record), name) => record.get(name).cloned().ok_or_else(unknown),
                    (Value::String(s), "Length") => i32::try_from(s.chars().count())
                        .map(Value::Int32)
                        .map_err(|_| EvalError::Overflow(expr.to_string())),
                    (Value::Array(items), "Count") => i32::try_from(items.len())
                        .map(Value::Int32)
                        .map_err(|_| EvalError::Overflow(expr.to_string())),
                    _ => Err(unknown()),
                }
            }
            ExprKind::Member { object: None, .. } | ExprKind::Lambda { .. } => {
                Err(EvalError::NotEvaluatable(expr.to_string()))
            }
            ExprKind::Conditional {
                test,
                if_true,
                if_false,
            } => match self.evaluate(test)? {
                Value::Boolean(true) => self.evaluate(if_true),
                Value::Boolean(false) => self.evaluate(if_false),
                v => Err(invalid_types("IIF", [&v])),
            },
            ExprKind::New { record, args } => {
                let fields = args
                    .iter()
                    .map(|arg| self.evaluate(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Record(Rc::new(RecordValue {
                    record: Rc::clone(record),
                    fields,
                })))
            }
            ExprKind::ListInit { items } => items
                .iter()
                .map(|item| self.evaluate(item))
                .collect::<Result<Vec<_>, _>>()
                .map(|items| Value::Array(Rc::new(items))),
            ExprKind::Extension(extension) => {
                if let Some(failure) = expr.as_extension::<PartialEvaluationFailure>() {
                    return Err(failure.error().clone());
                }

                match extension.reduce() {
                    Some(reduced) => self.evaluate(&reduced),
                    None => Err(EvalError::NotEvaluatable(expr.to_string())),
                }
            }
        }
    }

    fn eval_binary(
        &self,
        op: BinaryOp,
        left: &Rc<Expr>,
        right: &Rc<Expr>,
        expr: &Expr,
    ) -> Result<Value, EvalError> {
        match op {
            BinaryOp::AndAlso | BinaryOp::OrElse => {
                let short_circuit = op == BinaryOp::OrElse;
                match self.evaluate(left)? {
                    Value::Boolean(l) if l == short_circuit => Ok(Value::Boolean(l)),
                    Value::Boolean(_) => match self.evaluate(right)? {
                        Value::Boolean(r) => Ok(Value::Boolean(r)),
                        v => Err(invalid_types(op.symbol(), [&Value::Boolean(!short_circuit), &v])),
                    },
                    v => Err(invalid_types(op.symbol(), [&v])),
                }
            }
            BinaryOp::Coalesce => match self.evaluate(left)? {
                Value::Null => self.evaluate(right),
                value => Ok(value),
            },
            op if op.is_comparison() => {
                compare(op, &self.evaluate(left)?, &self.evaluate(right)?)
            }
            op => arithmetic(op, self.evaluate(left)?, self.evaluate(right)?, expr),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int32(i32),
    Int64(i64),
    Double(f64),
}

impl Number {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Int32(n) => Some(Number::Int32(*n)),
            Value::Int64(n) => Some(Number::Int64(*n)),
            Value::Double(n) => Some(Number::Double(*n)),
            _ => None,
        }
    }

    fn as_i64(self) -> i64 {
        match self {
            Number::Int32(n) => i64::from(n),
            Number::Int64(n) => n,
            Number::Double(n) => n as i64,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int32(n) => f64::from(n),
            Number::Int64(n) => n as f64,
            Number::Double(n) => n,
        }
    }

    /// Brings both operands to the wider of the two representations.
    fn promote(left: Self, right: Self) -> (Self, Self) {
        match (left, right) {
            (Number::Int32(_), Number::Int32(_)) => (left, right),
            (Number::Double(_), _) | (_, Number::Double(_)) => {
                (Number::Double(left.as_f64()), Number::Double(right.as_f64()))
            }
            _ => (Number::Int64(left.as_i64()), Number::Int64(right.as_i64())),
        }
    }

    fn partial_cmp(left: Self, right: Self) -> Option<Ordering> {
        match Self::promote(left, right) {
            (Number::Int32(l), Number::Int32(r)) => Some(l.cmp(&r)),
            (Number::Int64(l), Number::Int64(r)) => Some(l.cmp(&r)),
            (l, r) => l.as_f64().partial_cmp(&r.as_f64()),
        }
    }
}

macro_rules! checked_integer_op {
    ($op:expr, $l:expr, $r:expr, $variant:path, $overflow:expr) => {
        match $op {
            BinaryOp::Add => $l.checked_add($r).map($variant).ok_or_else($overflow),
            BinaryOp::Subtract => $l.checked_sub($r).map($variant).ok_or_else($overflow),
            BinaryOp::Multiply => $l.checked_mul($r).map($variant).ok_or_else($overflow),
            BinaryOp::Divide if $r == 0 => Err(EvalError::ZeroDivision),
            BinaryOp::Divide => $l.checked_div($r).map($variant).ok_or_else($overflow),
            BinaryOp::Modulo if $r == 0 => Err(EvalError::ZeroDivision),
            BinaryOp::Modulo => $l.checked_rem($r).map($variant).ok_or_else($overflow),
            _ => Err(invalid_types($op.symbol(), [&$variant($l), &$variant($r)])),
        }
    };
}

fn arithmetic(op: BinaryOp, left: Value, right: Value, expr: &Expr) -> Result<Value, EvalError> {
    let overflow = || EvalError::Overflow(expr.to_string());

    match (&left, &right) {
        (Value::String(_), _) | (_, Value::String(_)) if op == BinaryOp::Add => Ok(Value::String(
            format!("{}{}", plain_text(&left), plain_text(&right)).into(),
        )),
        _ => match (Number::of(&left), Number::of(&right)) {
            (Some(l), Some(r)) => match Number::promote(l, r) {
                (Number::Int32(l), Number::Int32(r)) => {
                    checked_integer_op!(op, l, r, Value::Int32, overflow)
                }
                (Number::Int64(l), Number::Int64(r)) => {
                    checked_integer_op!(op, l, r, Value::Int64, overflow)
                }
                (l, r) => {
                    let (l, r) = (l.as_f64(), r.as_f64());
                    match op {
                        BinaryOp::Add => Ok(Value::Double(l + r)),
                        BinaryOp::Subtract => Ok(Value::Double(l - r)),
                        BinaryOp::Multiply => Ok(Value::Double(l * r)),
                        BinaryOp::Divide => Ok(Value::Double(l / r)),
                        BinaryOp::Modulo => Ok(Value::Double(l % r)),
                        _ => Err(invalid_types(op.symbol(), [&left, &right])),
                    }
                }
            },
            _ => Err(invalid_types(op.symbol(), [&left, &right])),
        },
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    let numbers = Number::of(left).zip(Number::of(right));
    let ordering = match (numbers, left, right) {
        (Some((l, r)), _, _) => Number::partial_cmp(l, r),
        (None, Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (None, Value::Boolean(l), Value::Boolean(r)) => Some(l.cmp(r)),
        _ => None,
    };

    let result = match op {
        BinaryOp::Equal => ordering.map_or_else(|| left == right, Ordering::is_eq),
        BinaryOp::NotEqual => ordering.map_or_else(|| left != right, Ordering::is_ne),
        _ if ordering.is_none() && numbers.is_none() && !left.is_null() && !right.is_null() => {
            return Err(invalid_types(op.symbol(), [left, right]));
        }
        BinaryOp::LessThan => ordering.is_some_and(Ordering::is_lt),
        BinaryOp::LessThanOrEqual => ordering.is_some_and(Ordering::is_le),
        BinaryOp::GreaterThan => ordering.is_some_and(Ordering::is_gt),
        BinaryOp::GreaterThanOrEqual => ordering.is_some_and(Ordering::is_ge),
        _ => return Err(invalid_types(op.symbol(), [left, right])),
    };

    Ok(Value::Boolean(result))
}

fn convert(value: Value, to: &Type, expr: &Expr) -> Result<Value, EvalError> {
    let overflow = || EvalError::Overflow(expr.to_string());

    match (to, value) {
        (Type::Object, value) | (_, value @ Value::Null) => Ok(value),
        (Type::Int32, Value::Int64(n)) => i32::try_from(n).map(Value::Int32).map_err(|_| overflow()),
        (Type::Int32, Value::Double(n)) => {
            let n = n.trunc();
            if n.is_finite() && n >= f64::from(i32::MIN) && n <= f64::from(i32::MAX) {
                Ok(Value::Int32(n as i32))
            } else {
                Err(overflow())
            }
        }
        (Type::Int64, Value::Int32(n)) => Ok(Value::Int64(i64::from(n))),
        (Type::Int64, Value::Double(n)) => {
            let n = n.trunc();
            if n.is_finite() && n >= i64::MIN as f64 && n < i64::MAX as f64 {
                Ok(Value::Int64(n as i64))
            } else {
                Err(overflow())
            }
        }
        (Type::Double, Value::Int32(n)) => Ok(Value::Double(f64::from(n))),
        (Type::Double, Value::Int64(n)) => Ok(Value::Double(n as f64)),
        (Type::String, value) => Ok(Value::String(plain_text(&value).into())),
        (to, value) if to.is_assignable_from(&value.ty()) => Ok(value),
        (to, value) => Err(EvalError::InvalidConversion {
            from: value.name().into(),
            to: to.clone(),
        }),
    }
}

fn plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.to_string(),
        Value::Null => String::new(),
        v => v.to_string(),
    }
}

#[cold]
fn invalid_types<'a>(op: &str, args: impl IntoIterator<Item = &'a Value>) -> EvalError {
    EvalError::InvalidTypes {
        op: op.into(),
        args: args.into_iter().map(|v| v.name().into()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{
        expr::Method,
        types::RecordType,
    };

    fn constant(value: impl Into<Value>) -> Rc<Expr> {
        Expr::constant(value)
    }

    #[rstest]
    #[case::add(BinaryOp::Add, constant(2), constant(3), Ok(Value::Int32(5)))]
    #[case::promote_long(BinaryOp::Multiply, constant(2), constant(3i64), Ok(Value::Int64(6)))]
    #[case::promote_double(BinaryOp::Add, constant(1), constant(0.5), Ok(Value::Double(1.5)))]
    #[case::concat(BinaryOp::Add, constant("a"), constant(1), Ok(Value::String("a1".into())))]
    #[case::divide_by_zero(BinaryOp::Divide, constant(1), constant(0), Err(EvalError::ZeroDivision))]
    #[case::modulo_by_zero(BinaryOp::Modulo, constant(1i64), constant(0i64), Err(EvalError::ZeroDivision))]
    #[case::overflow(
        BinaryOp::Add,
        constant(i32::MAX),
        constant(1),
        Err(EvalError::Overflow(format!("({} + 1)", i32::MAX)))
    )]
    #[case::greater_than(BinaryOp::GreaterThan, constant(11), constant(10), Ok(Value::Boolean(true)))]
    #[case::mixed_equal(BinaryOp::Equal, constant(1), constant(1.0), Ok(Value::Boolean(true)))]
    #[case::string_less(BinaryOp::LessThan, constant("a"), constant("b"), Ok(Value::Boolean(true)))]
    #[case::null_compare(BinaryOp::LessThan, constant(Value::Null), constant(1), Ok(Value::Boolean(false)))]
    #[case::coalesce(BinaryOp::Coalesce, constant(Value::Null), constant(7), Ok(Value::Int32(7)))]
    #[case::invalid(
        BinaryOp::Subtract,
        constant(true),
        constant(1),
        Err(EvalError::InvalidTypes { op: "-".into(), args: vec!["boolean".into(), "int32".into()] })
    )]
    fn test_binary(
        #[case] op: BinaryOp,
        #[case] left: Rc<Expr>,
        #[case] right: Rc<Expr>,
        #[case] expected: Result<Value, EvalError>,
    ) {
        let expr = Expr::binary(op, left, right);
        assert_eq!(Evaluator::new().evaluate(&expr), expected);
    }

    #[test]
    fn test_short_circuit_skips_right_operand() {
        let failing = Expr::binary(
            BinaryOp::Equal,
            Expr::binary(BinaryOp::Divide, constant(1), constant(0)),
            constant(1),
        );
        let expr = Expr::binary(BinaryOp::AndAlso, constant(false), failing);

        assert_eq!(Evaluator::new().evaluate(&expr), Ok(Value::Boolean(false)));
    }

    #[rstest]
    #[case::long_to_int(constant(42i64), Type::Int32, Ok(Value::Int32(42)))]
    #[case::double_truncates(constant(2.9), Type::Int32, Ok(Value::Int32(2)))]
    #[case::int_to_string(constant(5), Type::String, Ok(Value::String("5".into())))]
    #[case::out_of_range(
        constant(i64::MAX),
        Type::Int32,
        Err(EvalError::Overflow(format!("Convert({}, Int32)", i64::MAX)))
    )]
    #[case::invalid(
        constant(true),
        Type::Int32,
        Err(EvalError::InvalidConversion { from: "boolean".into(), to: Type::Int32 })
    )]
    fn test_convert(
        #[case] operand: Rc<Expr>,
        #[case] ty: Type,
        #[case] expected: Result<Value, EvalError>,
    ) {
        assert_eq!(
            Evaluator::new().evaluate(&Expr::convert(operand, ty)),
            expected
        );
    }

    #[test]
    fn test_bound_parameter() {
        let x = Parameter::new("x", Type::Int32);
        let expr = Expr::binary(BinaryOp::Multiply, Expr::parameter(&x), constant(2));

        assert_eq!(
            Evaluator::new().bind(&x, Value::Int32(21)).evaluate(&expr),
            Ok(Value::Int32(42))
        );
        assert_eq!(
            Evaluator::new().evaluate(&expr),
            Err(EvalError::UnboundParameter("x".into()))
        );
    }

    #[test]
    fn test_record_member_and_length() {
        let pair = RecordType::new("Pair", [("Item1", Type::String), ("Item2", Type::Int32)]);
        let record = Expr::new_record(&pair, [constant("abc"), constant(2)]);
        let length = Expr::field(
            Expr::field(record, "Item1").expect("field exists"),
            "Length",
        )
        .expect("member exists");

        assert_eq!(Evaluator::new().evaluate(&length), Ok(Value::Int32(3)));
    }

    #[test]
    fn test_native_and_opaque_calls() {
        fn abs(_: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
            match args {
                [Value::Int32(n)] => Ok(Value::Int32(n.abs())),
                _ => Err(EvalError::UserDefined {
                    message: "abs expects one int32".to_string(),
                }),
            }
        }

        let native = Expr::call(
            Method::native("Math", "Abs", Type::Int32, abs),
            None,
            [constant(-3)],
        );
        let opaque = Expr::call(Method::opaque("Db", "Now", Type::Int64), None, []);

        assert_eq!(Evaluator::new().evaluate(&native), Ok(Value::Int32(3)));
        assert_eq!(
            Evaluator::new().evaluate(&opaque),
            Err(EvalError::NotEvaluatable("Now()".to_string()))
        );
    }
}
