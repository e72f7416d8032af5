// Tree-walking evaluator for the expression language
//
// Pure given a context snapshot: evaluation reads fields of the current
// object and the scope chain but never mutates the AST or the context.
//
// Numeric model: i64 for everything that fits, BigInt beyond (overflow
// promotes), f64 for floats. Integer division yields an integer when exact
// and a float otherwise; `%` is floored modulo. Division or modulo by zero
// is a parse error.

use crate::error::Error;
use crate::interp::context::Context;
use crate::value::Value;
use num_bigint::BigInt;
use num_traits::cast::ToPrimitive;
use num_traits::{Signed, Zero};

use super::ast::{BinOp, Expr, ExprKind, UnaryOp};

/// Evaluate an expression against a context, producing a value.
pub fn eval(expr: &Expr, ctx: &Context) -> Result<Value, Error> {
    eval_inner(expr, ctx).map_err(|e| e.with_span_if_none(expr.span))
}

fn eval_inner(expr: &Expr, ctx: &Context) -> Result<Value, Error> {
    match &expr.kind {
        ExprKind::IntLiteral(v) => Ok(match i64::try_from(*v) {
            Ok(n) => Value::Int(n),
            Err(_) => Value::BigInt(BigInt::from(*v)),
        }),
        ExprKind::FloatLiteral(v) => Ok(Value::Float(*v)),
        ExprKind::StringLiteral(v) => Ok(Value::Str(v.clone())),
        ExprKind::BoolLiteral(v) => Ok(Value::Bool(*v)),
        ExprKind::Ident(name) => ctx.resolve(name),
        ExprKind::EnumAccess { scope, member } => ctx.resolve_enum_member(scope, member),
        ExprKind::Unary { op, expr: inner } => {
            let v = eval(inner, ctx)?;
            eval_unary(*op, v)
        }
        ExprKind::Binary { op, lhs, rhs } => eval_binary(*op, lhs, rhs, ctx),
        ExprKind::Ternary {
            cond,
            then_expr,
            else_expr,
        } => {
            // only the selected branch is evaluated
            if eval(cond, ctx)?.truthy() {
                eval(then_expr, ctx)
            } else {
                eval(else_expr, ctx)
            }
        }
        ExprKind::Member { expr: recv, member } => {
            let v = eval(recv, ctx)?;
            eval_member(v, member)
        }
        ExprKind::Index { expr: recv, index } => {
            let v = eval(recv, ctx)?;
            let idx = eval(index, ctx)?.as_int()?;
            eval_index(v, idx)
        }
        ExprKind::MethodCall {
            expr: recv,
            method,
            args,
        } => {
            if !args.is_empty() {
                return Err(Error::parse(format!(
                    "method '{}' takes no arguments",
                    method
                )));
            }
            let v = eval(recv, ctx)?;
            eval_method(v, method)
        }
    }
}

fn eval_unary(op: UnaryOp, v: Value) -> Result<Value, Error> {
    match op {
        UnaryOp::Neg => match v {
            Value::Int(n) => Ok(match n.checked_neg() {
                Some(m) => Value::Int(m),
                None => Value::BigInt(-BigInt::from(n)),
            }),
            Value::BigInt(n) => Ok(Value::BigInt(-n)),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(Error::parse(format!(
                "cannot negate {}",
                other.type_name()
            ))),
        },
        UnaryOp::Not => Ok(Value::Bool(!v.truthy())),
    }
}

fn eval_binary(op: BinOp, lhs: &Expr, rhs: &Expr, ctx: &Context) -> Result<Value, Error> {
    // Logical operators short-circuit; everything else evaluates both sides.
    match op {
        BinOp::LogAnd => {
            let l = eval(lhs, ctx)?;
            if !l.truthy() {
                return Ok(Value::Bool(false));
            }
            let r = eval(rhs, ctx)?;
            return Ok(Value::Bool(r.truthy()));
        }
        BinOp::LogOr => {
            let l = eval(lhs, ctx)?;
            if l.truthy() {
                return Ok(Value::Bool(true));
            }
            let r = eval(rhs, ctx)?;
            return Ok(Value::Bool(r.truthy()));
        }
        _ => {}
    }

    let l = eval(lhs, ctx)?;
    let r = eval(rhs, ctx)?;
    match op {
        BinOp::Add => eval_add(l, r),
        BinOp::Sub => arith(l, r, i64::checked_sub, |a, b| a - b, |a, b| a - b),
        BinOp::Mul => arith(l, r, i64::checked_mul, |a, b| a * b, |a, b| a * b),
        BinOp::Div => eval_div(l, r),
        BinOp::Mod => eval_mod(l, r),
        BinOp::Eq => Ok(Value::Bool(l.value_eq(&r)?)),
        BinOp::Ne => Ok(Value::Bool(!l.value_eq(&r)?)),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => eval_compare(op, l, r),
        BinOp::BitAnd => bitwise(l, r, |a, b| a & b, |a, b| a & b),
        BinOp::BitOr => bitwise(l, r, |a, b| a | b, |a, b| a | b),
        BinOp::BitXor => bitwise(l, r, |a, b| a ^ b, |a, b| a ^ b),
        BinOp::Shl => eval_shl(l, r),
        BinOp::Shr => eval_shr(l, r),
        BinOp::LogAnd | BinOp::LogOr => unreachable!("handled above"),
    }
}

/// `+` concatenates when either operand is a string; otherwise numeric.
fn eval_add(l: Value, r: Value) -> Result<Value, Error> {
    match (&l, &r) {
        (Value::Str(a), _) => Ok(Value::Str(format!("{}{}", a, r.to_display_string()))),
        (_, Value::Str(b)) => Ok(Value::Str(format!("{}{}", l.to_display_string(), b))),
        _ => arith(l, r, i64::checked_add, |a, b| a + b, |a, b| a + b),
    }
}

/// Shared numeric ladder: float when either side is a float, otherwise
/// native integers with promotion to big integers on overflow.
fn arith(
    l: Value,
    r: Value,
    int_op: fn(i64, i64) -> Option<i64>,
    big_op: fn(BigInt, BigInt) -> BigInt,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, Error> {
    require_numeric(&l, &r)?;
    if matches!(l, Value::Float(_)) || matches!(r, Value::Float(_)) {
        return Ok(Value::Float(float_op(l.as_float()?, r.as_float()?)));
    }
    if let (Value::Int(a), Value::Int(b)) = (&l, &r) {
        if let Some(out) = int_op(*a, *b) {
            return Ok(Value::Int(out));
        }
    }
    Ok(normalize_big(big_op(l.as_bigint()?, r.as_bigint()?)))
}

fn eval_div(l: Value, r: Value) -> Result<Value, Error> {
    require_numeric(&l, &r)?;
    if matches!(l, Value::Float(_)) || matches!(r, Value::Float(_)) {
        let b = r.as_float()?;
        if b == 0.0 {
            return Err(Error::parse("division by zero"));
        }
        return Ok(Value::Float(l.as_float()? / b));
    }
    let a = l.as_bigint()?;
    let b = r.as_bigint()?;
    if b.is_zero() {
        return Err(Error::parse("division by zero"));
    }
    // Exact integer division stays integral; anything else becomes a float.
    if (&a % &b).is_zero() {
        Ok(normalize_big(a / b))
    } else {
        let fa = a.to_f64().unwrap_or(f64::INFINITY);
        let fb = b.to_f64().unwrap_or(f64::INFINITY);
        Ok(Value::Float(fa / fb))
    }
}

/// Floored modulo: the result follows the divisor's sign, so it is always
/// non-negative for a positive divisor.
fn eval_mod(l: Value, r: Value) -> Result<Value, Error> {
    require_numeric(&l, &r)?;
    if matches!(l, Value::Float(_)) || matches!(r, Value::Float(_)) {
        let a = l.as_float()?;
        let b = r.as_float()?;
        if b == 0.0 {
            return Err(Error::parse("modulo by zero"));
        }
        return Ok(Value::Float(a - b * (a / b).floor()));
    }
    let a = l.as_bigint()?;
    let b = r.as_bigint()?;
    if b.is_zero() {
        return Err(Error::parse("modulo by zero"));
    }
    let mut m = &a % &b;
    if !m.is_zero() && m.is_negative() != b.is_negative() {
        m += &b;
    }
    Ok(normalize_big(m))
}

fn eval_compare(op: BinOp, l: Value, r: Value) -> Result<Value, Error> {
    use std::cmp::Ordering;
    let ord = match (&l, &r) {
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        (a, b) if a.is_numeric() && b.is_numeric() => {
            if matches!(a, Value::Float(_)) || matches!(b, Value::Float(_)) {
                a.as_float()?
                    .partial_cmp(&b.as_float()?)
                    .ok_or_else(|| Error::parse("cannot order NaN"))?
            } else {
                a.as_bigint()?.cmp(&b.as_bigint()?)
            }
        }
        (a, b) => {
            return Err(Error::parse(format!(
                "cannot compare {} with {}",
                a.type_name(),
                b.type_name()
            )));
        }
    };
    let out = match op {
        BinOp::Lt => ord == Ordering::Less,
        BinOp::Le => ord != Ordering::Greater,
        BinOp::Gt => ord == Ordering::Greater,
        BinOp::Ge => ord != Ordering::Less,
        _ => unreachable!(),
    };
    Ok(Value::Bool(out))
}

/// Bitwise operands are coerced to integers (floor of numeric).
fn bitwise(
    l: Value,
    r: Value,
    int_op: fn(i64, i64) -> i64,
    big_op: fn(BigInt, BigInt) -> BigInt,
) -> Result<Value, Error> {
    match (&l, &r) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(int_op(*a, *b))),
        _ => Ok(normalize_big(big_op(l.as_bigint()?, r.as_bigint()?))),
    }
}

fn shift_amount(r: &Value) -> Result<u32, Error> {
    let n = r.as_int()?;
    u32::try_from(n).map_err(|_| Error::parse(format!("invalid shift amount {}", n)))
}

fn eval_shl(l: Value, r: Value) -> Result<Value, Error> {
    let n = shift_amount(&r)?;
    match &l {
        Value::Int(a) if n < 64 => {
            if let Some(out) = a.checked_shl(n) {
                // checked_shl only guards the shift count; detect value
                // overflow by shifting back
                if out >> n == *a {
                    return Ok(Value::Int(out));
                }
            }
            Ok(normalize_big(BigInt::from(*a) << n))
        }
        _ => Ok(normalize_big(l.as_bigint()? << n)),
    }
}

fn eval_shr(l: Value, r: Value) -> Result<Value, Error> {
    let n = shift_amount(&r)?;
    match &l {
        Value::Int(a) => Ok(Value::Int(if n >= 64 {
            if *a < 0 {
                -1
            } else {
                0
            }
        } else {
            a >> n
        })),
        _ => Ok(normalize_big(l.as_bigint()? >> n)),
    }
}

fn require_numeric(l: &Value, r: &Value) -> Result<(), Error> {
    for v in [l, r] {
        if !v.is_numeric() {
            return Err(Error::parse(format!(
                "expected a numeric operand, got {}",
                v.type_name()
            )));
        }
    }
    Ok(())
}

/// Keep big integers only when the native width cannot hold them.
fn normalize_big(v: BigInt) -> Value {
    match v.to_i64() {
        Some(n) => Value::Int(n),
        None => Value::BigInt(v),
    }
}

fn eval_member(recv: Value, member: &str) -> Result<Value, Error> {
    match &recv {
        Value::Null => Err(Error::parse(format!(
            "cannot access member '{}' of undefined",
            member
        ))),
        Value::Obj(obj) => {
            if member == "_parent" {
                return Ok(match obj.borrow().parent() {
                    Some(p) => Value::Obj(p),
                    None => Value::Null,
                });
            }
            if let Some(v) = obj.borrow().field(member) {
                return Ok(v.clone());
            }
            if obj.borrow().has_instance(member) {
                return crate::interp::realize_instance(obj, member);
            }
            Err(Error::parse(format!(
                "object has no member '{}'",
                member
            )))
        }
        Value::Stream(io) => {
            let io = io.borrow();
            match member {
                "size" => Ok(Value::Int(io.size() as i64)),
                "pos" => Ok(Value::Int(io.pos() as i64)),
                "eof" => Ok(Value::Bool(io.is_eof())),
                _ => Err(Error::parse(format!(
                    "stream has no member '{}'",
                    member
                ))),
            }
        }
        // zero-arg method sentinels work in member position too
        _ => eval_method(recv, member),
    }
}

fn eval_index(recv: Value, idx: i64) -> Result<Value, Error> {
    let at = usize::try_from(idx).ok();
    match recv {
        // out-of-range indexing yields the missing value
        Value::List(items) => Ok(at
            .and_then(|i| items.get(i).cloned())
            .unwrap_or(Value::Null)),
        Value::Bytes(bytes) => Ok(at
            .and_then(|i| bytes.get(i).copied())
            .map(|b| Value::Int(b as i64))
            .unwrap_or(Value::Null)),
        other => Err(Error::parse(format!(
            "cannot index into {}",
            other.type_name()
        ))),
    }
}

fn eval_method(recv: Value, method: &str) -> Result<Value, Error> {
    match method {
        "length" | "size" => match &recv {
            Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::Bytes(b) => Ok(Value::Int(b.len() as i64)),
            Value::List(items) => Ok(Value::Int(items.len() as i64)),
            other => Err(Error::parse(format!(
                "'{}' is not defined on {}",
                method,
                other.type_name()
            ))),
        },
        "to_i" => match &recv {
            Value::Int(_) | Value::BigInt(_) => Ok(recv),
            Value::Float(f) => Ok(Value::Int(f.floor() as i64)),
            Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
            Value::Str(s) => {
                let t = s.trim();
                if let Ok(n) = t.parse::<i64>() {
                    Ok(Value::Int(n))
                } else if let Ok(n) = t.parse::<BigInt>() {
                    Ok(Value::BigInt(n))
                } else {
                    Err(Error::parse(format!("cannot parse '{}' as integer", s)))
                }
            }
            other => Err(Error::parse(format!(
                "'to_i' is not defined on {}",
                other.type_name()
            ))),
        },
        "to_s" => Ok(Value::Str(recv.to_display_string())),
        _ => Err(Error::parse(format!("unknown method '{}'", method))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse;
    use crate::interp::context::{Context, Scope};
    use crate::schema::{EnumSpec, Meta, TypeSpec};
    use crate::stream::ByteStream;
    use crate::value::ObjectData;
    use rustc_hash::FxHashMap;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn test_context() -> Context {
        let mut ty = TypeSpec {
            meta: Meta::default(),
            params: Vec::new(),
            seq: Vec::new(),
            instances: Vec::new(),
            types: FxHashMap::default(),
            enums: FxHashMap::default(),
        };
        ty.enums.insert(
            "file_type".into(),
            Rc::new(EnumSpec {
                pairs: vec![(1, "text".into()), (2, "binary".into())],
            }),
        );
        let obj = ObjectData::new("test");
        Context {
            io: Rc::new(RefCell::new(ByteStream::new(&[0xAA, 0xBB, 0xCC]))),
            current: Rc::clone(&obj),
            parent: None,
            root: obj,
            scope: Scope::for_type(&ty, None),
            endian: None,
            encoding: None,
            index: None,
            last: None,
            filters: Rc::new(FxHashMap::default()),
        }
    }

    fn run(src: &str) -> Value {
        let ctx = test_context();
        eval(&parse(src).unwrap(), &ctx).unwrap()
    }

    fn run_int(src: &str) -> i64 {
        run(src).as_int().unwrap()
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(run_int("1 + 2 * 3"), 7);
        assert_eq!(run_int("(1 + 2) * 3"), 9);
        assert_eq!(run_int("10 - 3 - 2"), 5);
        assert_eq!(run_int("-5 + 2"), -3);
    }

    #[test]
    fn test_division_exact_is_int() {
        assert!(matches!(run("10 / 2"), Value::Int(5)));
        assert!(matches!(run("-10 / 2"), Value::Int(-5)));
    }

    #[test]
    fn test_division_inexact_is_float() {
        match run("7 / 2") {
            Value::Float(f) => assert_eq!(f, 3.5),
            other => panic!("expected float, got {:?}", other),
        }
    }

    #[test]
    fn test_division_by_zero() {
        let ctx = test_context();
        assert!(eval(&parse("1 / 0").unwrap(), &ctx).is_err());
        assert!(eval(&parse("1 % 0").unwrap(), &ctx).is_err());
        assert!(eval(&parse("1.0 / 0.0").unwrap(), &ctx).is_err());
    }

    #[test]
    fn test_floored_modulo() {
        assert_eq!(run_int("7 % 3"), 1);
        assert_eq!(run_int("-7 % 3"), 2);
        assert_eq!(run_int("7 % -3"), -2);
        assert_eq!(run_int("-7 % -3"), -1);
    }

    #[test]
    fn test_overflow_promotes() {
        let max = i64::MAX;
        let v = run(&format!("{} + 1", max));
        match v {
            Value::BigInt(b) => assert_eq!(b, BigInt::from(max) + 1),
            other => panic!("expected bigint, got {:?}", other),
        }
    }

    #[test]
    fn test_string_concat() {
        match run("\"abc\" + \"def\"") {
            Value::Str(s) => assert_eq!(s, "abcdef"),
            other => panic!("expected string, got {:?}", other),
        }
        match run("\"n=\" + 5") {
            Value::Str(s) => assert_eq!(s, "n=5"),
            other => panic!("expected string, got {:?}", other),
        }
    }

    #[test]
    fn test_string_compare() {
        assert!(matches!(run("\"abc\" < \"abd\""), Value::Bool(true)));
        assert!(matches!(run("\"b\" >= \"a\""), Value::Bool(true)));
        let ctx = test_context();
        assert!(eval(&parse("\"a\" < 1").unwrap(), &ctx).is_err());
    }

    #[test]
    fn test_bitwise_and_shift() {
        assert_eq!(run_int("0xF0 & 0x3C"), 0x30);
        assert_eq!(run_int("0xF0 | 0x0F"), 0xFF);
        assert_eq!(run_int("0xFF ^ 0x0F"), 0xF0);
        assert_eq!(run_int("1 << 10"), 1024);
        assert_eq!(run_int("1024 >> 3"), 128);
    }

    #[test]
    fn test_shift_promotes() {
        match run("1 << 63") {
            Value::BigInt(b) => assert_eq!(b, BigInt::from(1u64) << 63),
            other => panic!("expected bigint, got {:?}", other),
        }
    }

    #[test]
    fn test_logic_short_circuit() {
        // rhs would fail if evaluated
        assert!(matches!(run("false and (1 / 0 == 1)"), Value::Bool(false)));
        assert!(matches!(run("true or (1 / 0 == 1)"), Value::Bool(true)));
        assert!(matches!(run("not 0"), Value::Bool(true)));
        assert!(matches!(run("1 and \"x\""), Value::Bool(true)));
        assert!(matches!(run("0 or \"\""), Value::Bool(false)));
    }

    #[test]
    fn test_ternary_lazy() {
        assert_eq!(run_int("true ? 1 : 1 / 0"), 1);
        assert_eq!(run_int("0 ? 1 : 2"), 2);
    }

    #[test]
    fn test_methods() {
        assert_eq!(run_int("\"hello\".length"), 5);
        assert_eq!(run_int("\"hello\".size"), 5);
        assert_eq!(run_int("3.9.to_i()"), 3);
        assert_eq!(run_int("\"42\".to_i()"), 42);
        match run("7.to_s()") {
            Value::Str(s) => assert_eq!(s, "7"),
            other => panic!("expected string, got {:?}", other),
        }
        let ctx = test_context();
        assert!(eval(&parse("\"x\".frobnicate()").unwrap(), &ctx).is_err());
    }

    #[test]
    fn test_enum_access() {
        assert_eq!(run_int("file_type::binary"), 2);
        let ctx = test_context();
        assert!(eval(&parse("file_type::archive").unwrap(), &ctx).is_err());
        assert!(eval(&parse("nope::member").unwrap(), &ctx).is_err());
    }

    #[test]
    fn test_field_and_member_resolution() {
        let ctx = test_context();
        ctx.current.borrow_mut().set_field("width", Value::Int(4));
        ctx.current
            .borrow_mut()
            .set_field("name", Value::Str("png".into()));
        let v = eval(&parse("width * 2").unwrap(), &ctx).unwrap();
        assert_eq!(v.as_int().unwrap(), 8);
        let v = eval(&parse("name.length + width").unwrap(), &ctx).unwrap();
        assert_eq!(v.as_int().unwrap(), 7);
    }

    #[test]
    fn test_member_of_undefined_fails() {
        let ctx = test_context();
        assert!(eval(&parse("missing.anything").unwrap(), &ctx).is_err());
    }

    #[test]
    fn test_index_access() {
        let ctx = test_context();
        ctx.current.borrow_mut().set_field(
            "xs",
            Value::List(vec![Value::Int(10), Value::Int(20)]),
        );
        ctx.current
            .borrow_mut()
            .set_field("bs", Value::Bytes(vec![1, 2, 3]));
        assert_eq!(
            eval(&parse("xs[1]").unwrap(), &ctx).unwrap().as_int().unwrap(),
            20
        );
        assert_eq!(
            eval(&parse("bs[2]").unwrap(), &ctx).unwrap().as_int().unwrap(),
            3
        );
        // out-of-range is the missing value
        assert!(matches!(
            eval(&parse("xs[9]").unwrap(), &ctx).unwrap(),
            Value::Null
        ));
    }

    #[test]
    fn test_io_members() {
        let ctx = test_context();
        assert_eq!(
            eval(&parse("_io.size").unwrap(), &ctx).unwrap().as_int().unwrap(),
            3
        );
        assert_eq!(
            eval(&parse("_io.pos").unwrap(), &ctx).unwrap().as_int().unwrap(),
            0
        );
        assert!(matches!(
            eval(&parse("_io.eof").unwrap(), &ctx).unwrap(),
            Value::Bool(false)
        ));
    }

    #[test]
    fn test_bigint_equality() {
        let big = u64::MAX;
        assert!(matches!(
            run(&format!("0x{:X} == 0x{:X}", big, big)),
            Value::Bool(true)
        ));
        assert!(matches!(
            run(&format!("0x{:X} == 1", big)),
            Value::Bool(false)
        ));
    }

    #[test]
    fn test_error_carries_span() {
        let ctx = test_context();
        let err = eval(&parse("1 + \"x\" * 2").unwrap(), &ctx).unwrap_err();
        match err {
            Error::Parse(p) => assert!(p.span.is_some()),
            other => panic!("expected parse error, got {:?}", other),
        }
    }
}
