use track_core::Axis;

use super::parser::{BinaryOp, Expr, UnaryOp, Var};

/// Result of evaluating a (sub)expression over `len` elements.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Scalar(f64),
    Bool(bool),
    Numbers(Vec<f64>),
    Mask(Vec<bool>),
}

fn truthy(v: f64) -> bool {
    v != 0.0 && !v.is_nan()
}

impl Value {
    fn number_at(&self, k: usize) -> f64 {
        match self {
            Value::Scalar(v) => *v,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Numbers(v) => v[k],
            Value::Mask(m) => f64::from(u8::from(m[k])),
        }
    }

    fn bool_at(&self, k: usize) -> bool {
        match self {
            Value::Scalar(v) => truthy(*v),
            Value::Bool(b) => *b,
            Value::Numbers(v) => truthy(v[k]),
            Value::Mask(m) => m[k],
        }
    }

    fn is_uniform(&self) -> bool {
        matches!(self, Value::Scalar(_) | Value::Bool(_))
    }

    /// Elementwise truth over `len` elements; NaN counts as false.
    pub fn into_mask(self, len: usize) -> Vec<bool> {
        match self {
            Value::Mask(m) => m,
            Value::Numbers(v) => v.into_iter().map(truthy).collect(),
            other => vec![other.bool_at(0); len],
        }
    }
}

/// Variable bindings for one evaluation.
pub struct Env<'a> {
    pub len: usize,
    pub time: Option<&'a [f64]>,
    pub axes: &'a [(Axis, Vec<f64>)],
    pub quantified: &'a [Vec<bool>],
}

impl Env<'_> {
    fn var(&self, var: Var) -> Result<&[f64], String> {
        match var {
            Var::Time => self.time.ok_or_else(|| "'t' is not bound here".to_string()),
            Var::Axis(axis) => self
                .axes
                .iter()
                .find(|(a, _)| *a == axis)
                .map(|(_, v)| v.as_slice())
                .ok_or_else(|| format!("axis '{axis}' is not available")),
        }
    }
}

pub fn eval(expr: &Expr, env: &Env<'_>) -> Result<Value, String> {
    match expr {
        Expr::Number(v) => Ok(Value::Scalar(*v)),
        Expr::Var(var) => Ok(Value::Numbers(env.var(*var)?.to_vec())),
        Expr::Quantified(idx) => env
            .quantified
            .get(*idx)
            .map(|m| Value::Mask(m.clone()))
            .ok_or_else(|| format!("quantifier {idx} was not evaluated")),
        Expr::Call(func, inner) => {
            let value = eval(inner, env)?;
            Ok(map_numbers(&value, env.len, |v| func.apply(v)))
        }
        Expr::Unary(UnaryOp::Neg, inner) => {
            let value = eval(inner, env)?;
            Ok(map_numbers(&value, env.len, |v| -v))
        }
        Expr::Unary(UnaryOp::Not, inner) => {
            let value = eval(inner, env)?;
            if value.is_uniform() {
                return Ok(Value::Bool(!value.bool_at(0)));
            }
            Ok(Value::Mask((0..env.len).map(|k| !value.bool_at(k)).collect()))
        }
        Expr::Binary(op, lhs, rhs) => {
            let a = eval(lhs, env)?;
            let b = eval(rhs, env)?;
            Ok(binary(*op, &a, &b, env.len))
        }
    }
}

fn map_numbers(value: &Value, len: usize, f: impl Fn(f64) -> f64) -> Value {
    if value.is_uniform() {
        return Value::Scalar(f(value.number_at(0)));
    }
    Value::Numbers((0..len).map(|k| f(value.number_at(k))).collect())
}

/// Floored remainder: the result takes the sign of the divisor.
fn floored_rem(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r + b
    } else {
        r
    }
}

fn binary(op: BinaryOp, a: &Value, b: &Value, len: usize) -> Value {
    let uniform = a.is_uniform() && b.is_uniform();
    let n = if uniform { 1 } else { len };
    let numeric = |f: fn(f64, f64) -> f64| -> Value {
        let out: Vec<f64> = (0..n).map(|k| f(a.number_at(k), b.number_at(k))).collect();
        if uniform {
            Value::Scalar(out[0])
        } else {
            Value::Numbers(out)
        }
    };
    let compare = |f: fn(f64, f64) -> bool| -> Value {
        let out: Vec<bool> = (0..n).map(|k| f(a.number_at(k), b.number_at(k))).collect();
        if uniform {
            Value::Bool(out[0])
        } else {
            Value::Mask(out)
        }
    };
    let logic = |f: fn(bool, bool) -> bool| -> Value {
        let out: Vec<bool> = (0..n).map(|k| f(a.bool_at(k), b.bool_at(k))).collect();
        if uniform {
            Value::Bool(out[0])
        } else {
            Value::Mask(out)
        }
    };
    match op {
        BinaryOp::Add => numeric(|x, y| x + y),
        BinaryOp::Sub => numeric(|x, y| x - y),
        BinaryOp::Mul => numeric(|x, y| x * y),
        BinaryOp::Div => numeric(|x, y| x / y),
        BinaryOp::Rem => numeric(floored_rem),
        BinaryOp::Pow => numeric(f64::powf),
        BinaryOp::Lt => compare(|x, y| x < y),
        BinaryOp::Le => compare(|x, y| x <= y),
        BinaryOp::Gt => compare(|x, y| x > y),
        BinaryOp::Ge => compare(|x, y| x >= y),
        BinaryOp::Eq => compare(|x, y| x == y),
        BinaryOp::Ne => compare(|x, y| x != y),
        BinaryOp::And => logic(|x, y| x && y),
        BinaryOp::Or => logic(|x, y| x || y),
        BinaryOp::Xor => logic(|x, y| x != y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse;

    fn predicate_mask(text: &str, axes: &[(Axis, Vec<f64>)]) -> Vec<bool> {
        let parsed = parse(&format!("any(t >= 0, {text})")).unwrap();
        let len = axes[0].1.len();
        let env = Env {
            len,
            time: None,
            axes,
            quantified: &[],
        };
        eval(&parsed.terms[0].predicate, &env)
            .unwrap()
            .into_mask(len)
    }

    #[test]
    fn elementwise_comparisons_and_connectives() {
        let axes = vec![
            (Axis::X, vec![-1.0, 0.5, 2.0, f64::NAN]),
            (Axis::Px, vec![0.0, 1.0, 1.0, 1.0]),
        ];
        assert_eq!(
            predicate_mask("(x > 0) & (px != 0)", &axes),
            vec![false, true, true, false]
        );
        assert_eq!(
            predicate_mask("x > 1 or px == 0", &axes),
            vec![true, false, true, false]
        );
        assert_eq!(predicate_mask("~(x < 1)", &axes), vec![false, false, true, true]);
        assert_eq!(predicate_mask("x ^ px", &axes), vec![true, false, false, true]);
        assert_eq!(predicate_mask("abs(x) >= 1", &axes), vec![true, false, true, false]);
    }

    #[test]
    fn numeric_values_as_booleans() {
        let axes = vec![(Axis::W, vec![0.0, 3.0, f64::NAN])];
        assert_eq!(predicate_mask("w", &axes), vec![false, true, false]);
        assert_eq!(predicate_mask("w * 0 + 1", &axes), vec![true, true, false]);
        assert_eq!(predicate_mask("1 < 2", &axes), vec![true, true, true]);
    }

    #[test]
    fn remainder_takes_divisor_sign() {
        assert_eq!(floored_rem(-1.0, 3.0), 2.0);
        assert_eq!(floored_rem(4.0, -3.0), -2.0);
        assert_eq!(floored_rem(6.0, 3.0), 0.0);
    }

    #[test]
    fn time_expressions_filter_times() {
        let parsed = parse("any((t >= 10) & (t % 20 == 0), x > 0)").unwrap();
        let times = [0.0, 10.0, 20.0, 30.0, 40.0];
        let env = Env {
            len: times.len(),
            time: Some(&times),
            axes: &[],
            quantified: &[],
        };
        let mask = eval(&parsed.terms[0].time, &env).unwrap().into_mask(times.len());
        assert_eq!(mask, vec![false, false, true, false, true]);
    }
}
