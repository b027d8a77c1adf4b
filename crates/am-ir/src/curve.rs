//! Normalised mapping curves.
//!
//! A curve maps `x ∈ [0,1]` to `y ∈ [0,1]`. It is either a table of evenly
//! spaced samples or an expression compiled once at load time into a
//! [`CurveExpr`] tree. Curves shape envelopes, velocity scaling and ramps.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use crate::Name;

/// A named curve.
#[derive(Clone, Debug, PartialEq)]
pub struct Curve {
    pub name: Name,
    pub data: CurveData,
}

/// Curve storage.
#[derive(Clone, Debug, PartialEq)]
pub enum CurveData {
    /// Evenly spaced samples over `[0,1]`, linearly interpolated.
    Table(Vec<f32>),
    /// Expression source and its compiled form (`None` = failed to compile).
    Expression {
        source: String,
        compiled: Option<CurveExpr>,
    },
}

impl Curve {
    /// Create a table curve.
    pub fn table(name: &str, points: Vec<f32>) -> Self {
        Self {
            name: crate::name(name),
            data: CurveData::Table(points),
        }
    }

    /// Create an expression curve from already compiled parts.
    pub fn expression(name: &str, source: &str, compiled: Option<CurveExpr>) -> Self {
        Self {
            name: crate::name(name),
            data: CurveData::Expression {
                source: String::from(source),
                compiled,
            },
        }
    }

    /// Whether the curve can be evaluated.
    pub fn is_valid(&self) -> bool {
        match &self.data {
            CurveData::Table(_) => true,
            CurveData::Expression { compiled, .. } => compiled.is_some(),
        }
    }

    /// Evaluate at `x` (clamped to `[0,1]`), clamping the result to `[0,1]`.
    ///
    /// Returns `None` when the curve is invalid or the expression does not
    /// produce a finite number at this point.
    pub fn sample(&self, x: f32) -> Option<f32> {
        let x = if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) };
        let y = match &self.data {
            CurveData::Table(points) => sample_table(points, x),
            CurveData::Expression { compiled, .. } => compiled.as_ref()?.eval(x)?,
        };
        Some(y.clamp(0.0, 1.0))
    }
}

/// Linear interpolation across evenly spaced table points.
fn sample_table(points: &[f32], x: f32) -> f32 {
    match points.len() {
        0 => x,
        1 => points[0],
        n => {
            let pos = x * (n - 1) as f32;
            let idx = (pos as usize).min(n - 2);
            let frac = pos - idx as f32;
            points[idx] + (points[idx + 1] - points[idx]) * frac
        }
    }
}

/// Binary operators in a curve expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Built-in functions available to curve expressions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Exp,
    Log,
    Sqrt,
    Abs,
    Pow,
    Min,
    Max,
    Clamp,
}

impl Function {
    /// Look up a function by its expression name.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sin" => Function::Sin,
            "cos" => Function::Cos,
            "tan" => Function::Tan,
            "exp" => Function::Exp,
            "log" | "ln" => Function::Log,
            "sqrt" => Function::Sqrt,
            "abs" => Function::Abs,
            "pow" => Function::Pow,
            "min" => Function::Min,
            "max" => Function::Max,
            "clamp" => Function::Clamp,
            _ => return None,
        })
    }

    /// Number of arguments the function takes.
    pub fn arity(self) -> usize {
        match self {
            Function::Pow | Function::Min | Function::Max => 2,
            Function::Clamp => 3,
            _ => 1,
        }
    }
}

/// Compiled curve expression over the single variable `x`.
#[derive(Clone, Debug, PartialEq)]
pub enum CurveExpr {
    Number(f32),
    X,
    Neg(Box<CurveExpr>),
    Binary(BinaryOp, Box<CurveExpr>, Box<CurveExpr>),
    Call(Function, Vec<CurveExpr>),
}

impl CurveExpr {
    /// Evaluate at `x`. `None` if any intermediate result is not finite.
    pub fn eval(&self, x: f32) -> Option<f32> {
        let v = match self {
            CurveExpr::Number(n) => *n,
            CurveExpr::X => x,
            CurveExpr::Neg(e) => -e.eval(x)?,
            CurveExpr::Binary(op, a, b) => {
                let a = a.eval(x)?;
                let b = b.eval(x)?;
                match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    BinaryOp::Pow => libm::powf(a, b),
                }
            }
            CurveExpr::Call(func, args) => {
                let arg = |i: usize| args.get(i).and_then(|a| a.eval(x));
                match func {
                    Function::Sin => libm::sinf(arg(0)?),
                    Function::Cos => libm::cosf(arg(0)?),
                    Function::Tan => libm::tanf(arg(0)?),
                    Function::Exp => libm::expf(arg(0)?),
                    Function::Log => libm::logf(arg(0)?),
                    Function::Sqrt => libm::sqrtf(arg(0)?),
                    Function::Abs => libm::fabsf(arg(0)?),
                    Function::Pow => libm::powf(arg(0)?, arg(1)?),
                    Function::Min => libm::fminf(arg(0)?, arg(1)?),
                    Function::Max => libm::fmaxf(arg(0)?, arg(1)?),
                    Function::Clamp => {
                        let (v, lo, hi) = (arg(0)?, arg(1)?, arg(2)?);
                        libm::fminf(libm::fmaxf(v, lo), hi)
                    }
                }
            }
        };
        v.is_finite().then_some(v)
    }
}
