//! Curve expression compiler.
//!
//! Expressions are written over the variable `x` with `+ - * / ^`,
//! parentheses, the constants `pi` and `e`, and the functions known to
//! [`Function`]. A compiled expression must yield a finite number at every
//! point of a 128-step grid over `[0,1]`, so invalid curves are caught at
//! load time rather than during playback.

use am_ir::{BinaryOp, ConfigError, Curve, CurveData, CurveExpr, CurveId, Function, Subproject};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "curve.pest"]
struct CurveParser;

/// Points checked when validating a compiled expression.
pub const VALIDATION_POINTS: usize = 128;

/// Compile and validate the expression of curve `id`.
pub fn compile_curve(id: CurveId, source: &str) -> Result<CurveExpr, ConfigError> {
    let malformed = |message: String| ConfigError::MalformedCurve { curve: id, message };

    let mut pairs = CurveParser::parse(Rule::curve, source).map_err(|e| {
        let (line, col) = match e.line_col {
            pest::error::LineColLocation::Pos(pos) => pos,
            pest::error::LineColLocation::Span(start, _) => start,
        };
        malformed(format!("syntax error at {line}:{col}: {}", e.variant.message()))
    })?;
    let expr_pair = pairs
        .next()
        .and_then(|curve| curve.into_inner().next())
        .ok_or_else(|| malformed("empty expression".into()))?;
    let expr = build_expr(expr_pair).map_err(malformed)?;

    for i in 0..VALIDATION_POINTS {
        let x = i as f32 / (VALIDATION_POINTS - 1) as f32;
        if expr.eval(x).is_none() {
            return Err(malformed(format!("not a finite number at x = {x:.3}")));
        }
    }
    Ok(expr)
}

/// Build an expression curve, keeping the source even when it fails.
pub fn expression_curve(id: CurveId, name: &str, source: &str) -> (Curve, Option<ConfigError>) {
    match compile_curve(id, source) {
        Ok(expr) => (Curve::expression(name, source, Some(expr)), None),
        Err(err) => (Curve::expression(name, source, None), Some(err)),
    }
}

/// Recompile every expression curve of a subproject from its source.
pub fn recompile_curves(subproject: &mut Subproject) -> Vec<ConfigError> {
    let mut errors = Vec::new();
    let sources: Vec<(CurveId, String)> = subproject
        .curves
        .iter()
        .filter_map(|(id, c)| match &c.data {
            CurveData::Expression { source, .. } => Some((id, source.clone())),
            CurveData::Table(_) => None,
        })
        .collect();
    for (id, source) in sources {
        let Some(name) = subproject.curve(id).map(|c| c.name) else {
            continue;
        };
        let (curve, err) = expression_curve(id, &name, &source);
        if let Some(err) = err {
            tracing::warn!(%err, "curve failed to compile");
            errors.push(err);
        }
        subproject.replace_curve(id, curve);
    }
    errors
}

fn build_expr(pair: Pair<'_, Rule>) -> Result<CurveExpr, String> {
    match pair.as_rule() {
        Rule::expr => fold_binary(pair, Rule::add_op),
        Rule::term => fold_binary(pair, Rule::mul_op),
        Rule::unary => {
            let mut negations = 0;
            let mut operand = None;
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::neg => negations += 1,
                    _ => operand = Some(build_expr(inner)?),
                }
            }
            let mut expr = operand.ok_or("missing operand")?;
            for _ in 0..negations {
                expr = CurveExpr::Neg(Box::new(expr));
            }
            Ok(expr)
        }
        Rule::power => {
            let mut inner = pair.into_inner();
            let base = build_expr(inner.next().ok_or("missing base")?)?;
            match inner.next() {
                Some(exp) => Ok(CurveExpr::Binary(BinaryOp::Pow, Box::new(base), Box::new(build_expr(exp)?))),
                None => Ok(base),
            }
        }
        Rule::number => pair
            .as_str()
            .parse::<f32>()
            .map(CurveExpr::Number)
            .map_err(|e| format!("bad number '{}': {e}", pair.as_str())),
        Rule::ident => match pair.as_str() {
            "x" => Ok(CurveExpr::X),
            "pi" => Ok(CurveExpr::Number(core::f32::consts::PI)),
            "e" => Ok(CurveExpr::Number(core::f32::consts::E)),
            other => Err(format!("unknown variable '{other}'")),
        },
        Rule::call => {
            let mut inner = pair.into_inner();
            let name = inner.next().ok_or("missing function name")?.as_str();
            let func = Function::from_name(name).ok_or_else(|| format!("unknown function '{name}'"))?;
            let args = inner.map(build_expr).collect::<Result<Vec<_>, _>>()?;
            if args.len() != func.arity() {
                return Err(format!("{name} takes {} argument(s), got {}", func.arity(), args.len()));
            }
            Ok(CurveExpr::Call(func, args))
        }
        rule => Err(format!("unexpected {rule:?}")),
    }
}

/// Left-fold `operand (op operand)*` sequences.
fn fold_binary(pair: Pair<'_, Rule>, op_rule: Rule) -> Result<CurveExpr, String> {
    let mut inner = pair.into_inner();
    let mut acc = build_expr(inner.next().ok_or("missing operand")?)?;
    while let Some(op) = inner.next() {
        debug_assert_eq!(op.as_rule(), op_rule);
        let op = match op.as_str() {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            other => return Err(format!("unknown operator '{other}'")),
        };
        let rhs = build_expr(inner.next().ok_or("missing operand")?)?;
        acc = CurveExpr::Binary(op, Box::new(acc), Box::new(rhs));
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str, x: f32) -> f32 {
        compile_curve(CurveId(0), source).unwrap().eval(x).unwrap()
    }

    #[test]
    fn precedence_and_associativity() {
        assert!((eval("1 - x - 0.25", 0.5) - 0.25).abs() < 1e-6);
        assert!((eval("x + x * 2", 0.25) - 0.75).abs() < 1e-6);
        assert!((eval("2 ^ 3 ^ 0", 0.0) - 2.0).abs() < 1e-6);
        assert!((eval("-x^2", 0.5) + 0.25).abs() < 1e-6);
    }

    #[test]
    fn functions_and_constants() {
        assert!((eval("sin(x * pi / 2)", 1.0) - 1.0).abs() < 1e-5);
        assert!((eval("clamp(x * 3, 0, 1)", 0.5) - 1.0).abs() < 1e-6);
        assert!((eval("max(x, 0.3)", 0.1) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn syntax_error_is_malformed() {
        let err = compile_curve(CurveId(2), "x +").unwrap_err();
        assert!(matches!(err, ConfigError::MalformedCurve { curve: CurveId(2), .. }));
    }

    #[test]
    fn non_finite_grid_point_is_rejected() {
        // 1/x is infinite at x = 0.
        assert!(compile_curve(CurveId(0), "1 / x").is_err());
        assert!(compile_curve(CurveId(0), "1 / (x + 1)").is_ok());
    }

    #[test]
    fn unknown_names_and_arity_are_rejected() {
        assert!(compile_curve(CurveId(0), "y * 2").is_err());
        assert!(compile_curve(CurveId(0), "foo(x)").is_err());
        assert!(compile_curve(CurveId(0), "pow(x)").is_err());
    }

    #[test]
    fn recompile_keeps_source_of_bad_curves() {
        let mut sp = Subproject::new("sp");
        let good = sp.add_curve(Curve::expression("good", "x*x", None));
        let bad = sp.add_curve(Curve::expression("bad", "sqrt(x - 2)", None));
        let errors = recompile_curves(&mut sp);
        assert_eq!(errors.len(), 1);
        assert!(sp.curve(good).unwrap().is_valid());
        let bad = sp.curve(bad).unwrap();
        assert!(!bad.is_valid());
        assert!(matches!(&bad.data, CurveData::Expression { source, .. } if source == "sqrt(x - 2)"));
    }
}
