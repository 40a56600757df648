//! Scalar expressions over named fields and constants.
//!
//! An [`Expr`] is evaluated either directly, by walking the tree, or through an
//! [`EvaluationPlan`]: the tree with common subexpressions merged into a flat, ordered list of
//! steps. Both perform the same floating-point operations in the same order and give identical
//! results.
use crate::error::Error;
use crate::Real;
use nalgebra::DVector;
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::ops::{Add, Div, Mul, Neg, Sub};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Sqrt,
    Abs,
    Exp,
    Ln,
    Sin,
    Cos,
}

impl UnaryOp {
    fn apply<T: Real>(self, x: T) -> T {
        match self {
            Self::Neg => -x,
            Self::Sqrt => x.sqrt(),
            Self::Abs => x.abs(),
            Self::Exp => x.exp(),
            Self::Ln => x.ln(),
            Self::Sin => x.sin(),
            Self::Cos => x.cos(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Neg => "-",
            Self::Sqrt => "sqrt",
            Self::Abs => "abs",
            Self::Exp => "exp",
            Self::Ln => "ln",
            Self::Sin => "sin",
            Self::Cos => "cos",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn apply<T: Real>(self, a: T, b: T) -> T {
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div => a / b,
        }
    }

    fn symbol(self) -> char {
        match self {
            Self::Add => '+',
            Self::Sub => '-',
            Self::Mul => '*',
            Self::Div => '/',
        }
    }

    fn precedence(self) -> u8 {
        match self {
            Self::Add | Self::Sub => 1,
            Self::Mul | Self::Div => 2,
        }
    }
}

/// An expression tree.
///
/// Symbols name fields or constants and are resolved at evaluation time.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Symbol(String),
    Literal(f64),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Powi(Box<Expr>, i32),
}

impl Expr {
    pub fn symbol(name: impl Into<String>) -> Self {
        Self::Symbol(name.into())
    }

    pub fn literal(value: f64) -> Self {
        Self::Literal(value)
    }

    fn unary(self, op: UnaryOp) -> Self {
        Self::Unary(op, Box::new(self))
    }

    pub fn sqrt(self) -> Self {
        self.unary(UnaryOp::Sqrt)
    }

    pub fn abs(self) -> Self {
        self.unary(UnaryOp::Abs)
    }

    pub fn exp(self) -> Self {
        self.unary(UnaryOp::Exp)
    }

    pub fn ln(self) -> Self {
        self.unary(UnaryOp::Ln)
    }

    pub fn sin(self) -> Self {
        self.unary(UnaryOp::Sin)
    }

    pub fn cos(self) -> Self {
        self.unary(UnaryOp::Cos)
    }

    pub fn powi(self, exponent: i32) -> Self {
        Self::Powi(Box::new(self), exponent)
    }

    /// The names the expression refers to.
    pub fn symbols(&self) -> BTreeSet<&str> {
        let mut symbols = BTreeSet::new();
        self.collect_symbols(&mut symbols);
        symbols
    }

    fn collect_symbols<'a>(&'a self, symbols: &mut BTreeSet<&'a str>) {
        match self {
            Self::Symbol(name) => {
                symbols.insert(name.as_str());
            }
            Self::Literal(_) => {}
            Self::Unary(_, a) | Self::Powi(a, _) => a.collect_symbols(symbols),
            Self::Binary(_, a, b) => {
                a.collect_symbols(symbols);
                b.collect_symbols(symbols);
            }
        }
    }

    /// Evaluates the tree, resolving symbols in `operands`.
    pub fn evaluate<T: Real>(&self, operands: &BTreeMap<String, Operand<T>>) -> Result<Operand<T>, Error> {
        match self {
            Self::Symbol(name) => lookup(operands, name),
            Self::Literal(value) => Ok(Operand::Scalar(nalgebra::convert(*value))),
            Self::Unary(op, a) => Ok(a.evaluate(operands)?.map(|x| op.apply(x))),
            Self::Binary(op, a, b) => {
                let a = a.evaluate(operands)?;
                let b = b.evaluate(operands)?;
                a.zip_with(&b, |x, y| op.apply(x, y))
            }
            Self::Powi(a, exponent) => Ok(a.evaluate(operands)?.map(|x| x.powi(*exponent))),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::Binary(op, _, _) => op.precedence(),
            Self::Unary(UnaryOp::Neg, _) => 3,
            _ => 4,
        }
    }
}

fn lookup<T: Real>(operands: &BTreeMap<String, Operand<T>>, name: &str) -> Result<Operand<T>, Error> {
    operands
        .get(name)
        .cloned()
        .ok_or_else(|| Error::UnknownField { name: name.to_string() })
}

fn parenthesized(f: &mut Formatter<'_>, e: &Expr, min: u8) -> fmt::Result {
    if e.precedence() < min {
        write!(f, "({e})")
    } else {
        write!(f, "{e}")
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Symbol(name) => write!(f, "{name}"),
            Self::Literal(value) => write!(f, "{value}"),
            Self::Unary(UnaryOp::Neg, a) => {
                write!(f, "-")?;
                parenthesized(f, a, 4)
            }
            Self::Unary(op, a) => write!(f, "{}({a})", op.name()),
            Self::Binary(op, a, b) => {
                parenthesized(f, a, op.precedence())?;
                write!(f, " {} ", op.symbol())?;
                // The right operand of - and / binds tighter
                let min = match op {
                    BinaryOp::Sub | BinaryOp::Div => op.precedence() + 1,
                    _ => op.precedence(),
                };
                parenthesized(f, b, min)
            }
            Self::Powi(a, exponent) => {
                parenthesized(f, a, 4)?;
                write!(f, "^{exponent}")
            }
        }
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl $trait for Expr {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::Binary($op, Box::new(self), Box::new(rhs))
            }
        }

        impl $trait<f64> for Expr {
            type Output = Expr;

            fn $method(self, rhs: f64) -> Expr {
                Expr::Binary($op, Box::new(self), Box::new(Expr::Literal(rhs)))
            }
        }

        impl $trait<Expr> for f64 {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::Binary($op, Box::new(Expr::Literal(self)), Box::new(rhs))
            }
        }
    };
}

impl_binary_op!(Add, add, BinaryOp::Add);
impl_binary_op!(Sub, sub, BinaryOp::Sub);
impl_binary_op!(Mul, mul, BinaryOp::Mul);
impl_binary_op!(Div, div, BinaryOp::Div);

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        self.unary(UnaryOp::Neg)
    }
}

/// A value an expression operates on: a scalar or one value per DOF, point or node.
///
/// Scalars broadcast against arrays.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand<T: Real> {
    Scalar(T),
    Array(DVector<T>),
}

impl<T: Real> Operand<T> {
    pub fn array_len(&self) -> Option<usize> {
        match self {
            Self::Scalar(_) => None,
            Self::Array(values) => Some(values.len()),
        }
    }

    /// The values as an array of length `n`, broadcasting a scalar.
    pub fn into_array(self, n: usize) -> Result<DVector<T>, Error> {
        match self {
            Self::Scalar(value) => Ok(DVector::from_element(n, value)),
            Self::Array(values) if values.len() == n => Ok(values),
            Self::Array(values) => Err(Error::IncompatibleOperands {
                reason: format!("an array of length {} where {n} values are expected", values.len()),
            }),
        }
    }

    fn map(self, f: impl Fn(T) -> T) -> Self {
        match self {
            Self::Scalar(value) => Self::Scalar(f(value)),
            Self::Array(values) => Self::Array(values.map(f)),
        }
    }

    fn zip_with(&self, other: &Self, f: impl Fn(T, T) -> T) -> Result<Self, Error> {
        Ok(match (self, other) {
            (Self::Scalar(a), Self::Scalar(b)) => Self::Scalar(f(*a, *b)),
            (Self::Scalar(a), Self::Array(b)) => Self::Array(b.map(|y| f(*a, y))),
            (Self::Array(a), Self::Scalar(b)) => Self::Array(a.map(|x| f(x, *b))),
            (Self::Array(a), Self::Array(b)) => {
                if a.len() != b.len() {
                    return Err(Error::IncompatibleOperands {
                        reason: format!("arrays of lengths {} and {}", a.len(), b.len()),
                    });
                }
                Self::Array(a.zip_map(b, f))
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Step {
    Load(String),
    /// Bit pattern of the literal, so that `0.0` and `-0.0` stay distinct.
    Literal(u64),
    Unary(UnaryOp, usize),
    Binary(BinaryOp, usize, usize),
    Powi(usize, i32),
}

/// An expression with common subexpressions merged, as an ordered list of steps.
///
/// Each step only refers to earlier steps. The plan of a given expression is always the same.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationPlan {
    steps: Vec<Step>,
}

impl EvaluationPlan {
    pub fn new(expr: &Expr) -> Self {
        let mut steps = Vec::new();
        let mut seen = FxHashMap::default();
        Self::insert(expr, &mut steps, &mut seen);
        Self { steps }
    }

    fn insert(expr: &Expr, steps: &mut Vec<Step>, seen: &mut FxHashMap<Step, usize>) -> usize {
        let step = match expr {
            Expr::Symbol(name) => Step::Load(name.clone()),
            Expr::Literal(value) => Step::Literal(value.to_bits()),
            Expr::Unary(op, a) => Step::Unary(*op, Self::insert(a, steps, seen)),
            Expr::Binary(op, a, b) => {
                let a = Self::insert(a, steps, seen);
                let b = Self::insert(b, steps, seen);
                Step::Binary(*op, a, b)
            }
            Expr::Powi(a, exponent) => Step::Powi(Self::insert(a, steps, seen), *exponent),
        };
        *seen.entry(step).or_insert_with_key(|step| {
            steps.push(step.clone());
            steps.len() - 1
        })
    }

    /// The number of distinct subexpressions.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn evaluate<T: Real>(&self, operands: &BTreeMap<String, Operand<T>>) -> Result<Operand<T>, Error> {
        let mut values: Vec<Operand<T>> = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let value = match step {
                Step::Load(name) => lookup(operands, name)?,
                Step::Literal(value) => Operand::Scalar(nalgebra::convert(f64::from_bits(*value))),
                Step::Unary(op, a) => values[*a].clone().map(|x| op.apply(x)),
                Step::Binary(op, a, b) => values[*a].zip_with(&values[*b], |x, y| op.apply(x, y))?,
                Step::Powi(a, exponent) => values[*a].clone().map(|x| x.powi(*exponent)),
            };
            values.push(value);
        }
        values.pop().ok_or(Error::IncompatibleOperands {
            reason: "empty evaluation plan".to_string(),
        })
    }
}
