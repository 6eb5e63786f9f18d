//! Guard expressions (`condition:` on a field).
//!
//! Generated code embeds the guard text verbatim, so its meaning is whatever the C++
//! compiler makes of it. This module parses the same text into an [`Expr`] so the resolver
//! can check which names a guard refers to, and so the [codec](crate::codec) can evaluate it.

use pest::iterators::Pairs;
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;
use pest_derive::Parser as PestParser;

#[derive(PestParser)]
#[grammar = "guard.pest"]
struct GuardParser;

/// A name used inside a guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Name {
    /// `flags` or `header.flags`.
    Member(Vec<String>),
    /// `Color::Red`.
    Scoped { scope: String, item: String },
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Name::Member(path) => write!(f, "{}", path.join(".")),
            Name::Scoped { scope, item } => write!(f, "{}::{}", scope, item),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    BitNot,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Int(i128),
    Name(Name),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("unknown name '{0}'")]
    UnknownName(String),
    #[error("'{0}' is not an integer value")]
    NotInteger(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("shift amount {0} out of range")]
    BadShift(i128),
    #[error("arithmetic overflow")]
    Overflow,
}

/// Supplies values for names during evaluation.
pub trait Env {
    fn lookup(&self, name: &Name) -> Result<i128, EvalError>;
}

fn pratt() -> PrattParser<Rule> {
    PrattParser::new()
        .op(Op::infix(Rule::or, Assoc::Left))
        .op(Op::infix(Rule::and, Assoc::Left))
        .op(Op::infix(Rule::bit_or, Assoc::Left))
        .op(Op::infix(Rule::bit_xor, Assoc::Left))
        .op(Op::infix(Rule::bit_and, Assoc::Left))
        .op(Op::infix(Rule::eq, Assoc::Left) | Op::infix(Rule::ne, Assoc::Left))
        .op(Op::infix(Rule::lt, Assoc::Left)
            | Op::infix(Rule::le, Assoc::Left)
            | Op::infix(Rule::gt, Assoc::Left)
            | Op::infix(Rule::ge, Assoc::Left))
        .op(Op::infix(Rule::shl, Assoc::Left) | Op::infix(Rule::shr, Assoc::Left))
        .op(Op::infix(Rule::add, Assoc::Left) | Op::infix(Rule::sub, Assoc::Left))
        .op(Op::infix(Rule::mul, Assoc::Left)
            | Op::infix(Rule::div, Assoc::Left)
            | Op::infix(Rule::rem, Assoc::Left))
        .op(Op::prefix(Rule::not) | Op::prefix(Rule::bit_not) | Op::prefix(Rule::neg))
}

/// Parse guard text.
pub fn parse(source: &str) -> Result<Expr, String> {
    let mut pairs = GuardParser::parse(Rule::guard, source).map_err(|e| format!("invalid guard expression: {}", e))?;
    let guard = pairs.next().ok_or("empty guard")?;
    let expr = guard
        .into_inner()
        .find(|p| p.as_rule() == Rule::expr)
        .ok_or("empty guard")?;
    build(expr.into_inner(), &pratt())
}

fn build(pairs: Pairs<Rule>, pratt: &PrattParser<Rule>) -> Result<Expr, String> {
    pratt
        .map_primary(|primary| match primary.as_rule() {
            Rule::expr => build(primary.into_inner(), pratt),
            Rule::hex_int => int_literal(primary.as_str(), 16, 2),
            Rule::bin_int => int_literal(primary.as_str(), 2, 2),
            Rule::oct_int => int_literal(primary.as_str(), 8, 1),
            Rule::dec_int => int_literal(primary.as_str(), 10, 0),
            Rule::boolean => Ok(Expr::Int((primary.as_str() == "true") as i128)),
            Rule::member => Ok(Expr::Name(Name::Member(
                primary.into_inner().map(|p| p.as_str().to_string()).collect(),
            ))),
            Rule::scoped => {
                let mut parts = primary.into_inner().map(|p| p.as_str().to_string());
                let scope = parts.next().ok_or("scoped name: scope")?;
                let item = parts.next().ok_or("scoped name: item")?;
                Ok(Expr::Name(Name::Scoped { scope, item }))
            }
            rule => Err(format!("unexpected {:?} in guard", rule)),
        })
        .map_prefix(|op, rhs| {
            let op = match op.as_rule() {
                Rule::not => UnaryOp::Not,
                Rule::bit_not => UnaryOp::BitNot,
                _ => UnaryOp::Neg,
            };
            Ok(Expr::Unary(op, Box::new(rhs?)))
        })
        .map_infix(|lhs, op, rhs| {
            let op = match op.as_rule() {
                Rule::or => BinaryOp::Or,
                Rule::and => BinaryOp::And,
                Rule::bit_or => BinaryOp::BitOr,
                Rule::bit_xor => BinaryOp::BitXor,
                Rule::bit_and => BinaryOp::BitAnd,
                Rule::eq => BinaryOp::Eq,
                Rule::ne => BinaryOp::Ne,
                Rule::lt => BinaryOp::Lt,
                Rule::le => BinaryOp::Le,
                Rule::gt => BinaryOp::Gt,
                Rule::ge => BinaryOp::Ge,
                Rule::shl => BinaryOp::Shl,
                Rule::shr => BinaryOp::Shr,
                Rule::add => BinaryOp::Add,
                Rule::sub => BinaryOp::Sub,
                Rule::mul => BinaryOp::Mul,
                Rule::div => BinaryOp::Div,
                _ => BinaryOp::Rem,
            };
            Ok(Expr::Binary(op, Box::new(lhs?), Box::new(rhs?)))
        })
        .parse(pairs)
}

fn int_literal(text: &str, radix: u32, prefix: usize) -> Result<Expr, String> {
    let digits = text[prefix..].trim_end_matches(['u', 'U', 'l', 'L']);
    i128::from_str_radix(digits, radix)
        .map(Expr::Int)
        .map_err(|e| format!("integer literal '{}': {}", text, e))
}

impl Expr {
    /// Every name the expression mentions, left to right.
    pub fn names(&self) -> Vec<&Name> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a Name>) {
        match self {
            Expr::Int(_) => {}
            Expr::Name(n) => out.push(n),
            Expr::Unary(_, e) => e.collect_names(out),
            Expr::Binary(_, l, r) => {
                l.collect_names(out);
                r.collect_names(out);
            }
        }
    }

    /// Evaluate with C truthiness: comparisons and logical operators yield 0 or 1, and
    /// `&&` / `||` short-circuit.
    pub fn eval(&self, env: &dyn Env) -> Result<i128, EvalError> {
        match self {
            Expr::Int(v) => Ok(*v),
            Expr::Name(n) => env.lookup(n),
            Expr::Unary(op, e) => {
                let v = e.eval(env)?;
                match op {
                    UnaryOp::Not => Ok((v == 0) as i128),
                    UnaryOp::BitNot => Ok(!v),
                    UnaryOp::Neg => v.checked_neg().ok_or(EvalError::Overflow),
                }
            }
            Expr::Binary(BinaryOp::And, l, r) => {
                Ok((l.eval(env)? != 0 && r.eval(env)? != 0) as i128)
            }
            Expr::Binary(BinaryOp::Or, l, r) => {
                Ok((l.eval(env)? != 0 || r.eval(env)? != 0) as i128)
            }
            Expr::Binary(op, l, r) => {
                let a = l.eval(env)?;
                let b = r.eval(env)?;
                binary(*op, a, b)
            }
        }
    }

    pub fn is_true(&self, env: &dyn Env) -> Result<bool, EvalError> {
        Ok(self.eval(env)? != 0)
    }
}

fn binary(op: BinaryOp, a: i128, b: i128) -> Result<i128, EvalError> {
    let overflow = EvalError::Overflow;
    Ok(match op {
        BinaryOp::BitOr => a | b,
        BinaryOp::BitXor => a ^ b,
        BinaryOp::BitAnd => a & b,
        BinaryOp::Eq => (a == b) as i128,
        BinaryOp::Ne => (a != b) as i128,
        BinaryOp::Lt => (a < b) as i128,
        BinaryOp::Le => (a <= b) as i128,
        BinaryOp::Gt => (a > b) as i128,
        BinaryOp::Ge => (a >= b) as i128,
        BinaryOp::Shl | BinaryOp::Shr => {
            if !(0..128).contains(&b) {
                return Err(EvalError::BadShift(b));
            }
            if op == BinaryOp::Shl {
                a.checked_shl(b as u32).ok_or(overflow)?
            } else {
                a >> b
            }
        }
        BinaryOp::Add => a.checked_add(b).ok_or(overflow)?,
        BinaryOp::Sub => a.checked_sub(b).ok_or(overflow)?,
        BinaryOp::Mul => a.checked_mul(b).ok_or(overflow)?,
        BinaryOp::Div => {
            if b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            a.checked_div(b).ok_or(overflow)?
        }
        BinaryOp::Rem => {
            if b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            a.checked_rem(b).ok_or(overflow)?
        }
        BinaryOp::And => (a != 0 && b != 0) as i128,
        BinaryOp::Or => (a != 0 || b != 0) as i128,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapEnv(HashMap<String, i128>);

    impl Env for MapEnv {
        fn lookup(&self, name: &Name) -> Result<i128, EvalError> {
            self.0
                .get(&name.to_string())
                .copied()
                .ok_or_else(|| EvalError::UnknownName(name.to_string()))
        }
    }

    fn env(pairs: &[(&str, i128)]) -> MapEnv {
        MapEnv(pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect())
    }

    fn eval(src: &str, e: &MapEnv) -> i128 {
        parse(src).expect("parse").eval(e).expect("eval")
    }

    #[test]
    fn flag_test() {
        let e = env(&[("flags", 0x03)]);
        assert_eq!(eval("flags & 0x01", &e), 1);
        assert_eq!(eval("flags & 0x04", &e), 0);
        assert_eq!(eval("(flags & 0x02) != 0", &e), 1);
    }

    #[test]
    fn precedence_matches_c() {
        let e = env(&[]);
        assert_eq!(eval("1 + 2 * 3", &e), 7);
        assert_eq!(eval("1 << 2 + 1", &e), 8);
        assert_eq!(eval("6 & 3 == 3", &e), 0);
        assert_eq!(eval("1 || 0 && 0", &e), 1);
        assert_eq!(eval("-2 + 5", &e), 3);
        assert_eq!(eval("!0 + ~0", &e), 0);
        assert_eq!(eval("0b101 | 0x10u", &e), 21);
        assert_eq!(eval("true && !false", &e), 1);
    }

    #[test]
    fn leading_zero_is_octal() {
        let e = env(&[]);
        assert_eq!(eval("010", &e), 8);
        assert_eq!(eval("0777u", &e), 511);
        assert_eq!(eval("00", &e), 0);
        assert_eq!(eval("0", &e), 0);
        assert_eq!(eval("0u + 10", &e), 10);
        assert!(parse("09").is_err());
        assert!(parse("flags == 018").is_err());
    }

    #[test]
    fn names_are_collected() {
        let expr = parse("hdr.kind == Kind::Data && len > 0").expect("parse");
        let names: Vec<String> = expr.names().iter().map(|n| n.to_string()).collect();
        assert_eq!(names, vec!["hdr.kind", "Kind::Data", "len"]);
        assert_eq!(
            expr.names()[1],
            &Name::Scoped {
                scope: "Kind".into(),
                item: "Data".into()
            }
        );
    }

    #[test]
    fn short_circuit_skips_unknown_names() {
        let e = env(&[("a", 0)]);
        assert_eq!(eval("a && missing", &e), 0);
        assert!(parse("missing").expect("parse").eval(&e).is_err());
    }

    #[test]
    fn evaluation_errors() {
        let e = env(&[]);
        assert_eq!(parse("1 / 0").expect("parse").eval(&e), Err(EvalError::DivisionByZero));
        assert_eq!(parse("1 << 200").expect("parse").eval(&e), Err(EvalError::BadShift(200)));
    }

    #[test]
    fn rejects_malformed_text() {
        assert!(parse("flags &").is_err());
        assert!(parse("flags & & 1").is_err());
        assert!(parse("").is_err());
        assert!(parse("f(x)").is_err());
    }
}
