//! Runtime curve evaluation with fallback for invalid curves.

use am_ir::Curve;

/// Evaluates curves for one consumer (an envelope phase, a ramp).
///
/// An invalid curve, or an expression that is not finite at some point,
/// yields the last good value this evaluator produced, or identity when
/// there is none, and raises `faulted`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CurveEvaluator {
    last_good: Option<f32>,
    faulted: bool,
}

impl CurveEvaluator {
    pub const fn new() -> Self {
        Self {
            last_good: None,
            faulted: false,
        }
    }

    /// Evaluate `curve` at `x`. `None` means linear (identity).
    pub fn evaluate(&mut self, curve: Option<&Curve>, x: f32) -> f32 {
        let x = if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) };
        let Some(curve) = curve else {
            return x;
        };
        match curve.sample(x) {
            Some(y) => {
                self.last_good = Some(y);
                y
            }
            None => {
                self.faulted = true;
                self.last_good.unwrap_or(x)
            }
        }
    }

    /// Evaluate as a 0→1 progression: the curve is normalised so the
    /// result is 0 at `x = 0` and 1 at `x = 1`.
    ///
    /// Falls back to linear when the curve is flat at its ends.
    pub fn progress(&mut self, curve: Option<&Curve>, x: f32) -> f32 {
        if curve.is_none() {
            return x.clamp(0.0, 1.0);
        }
        let y0 = self.evaluate(curve, 0.0);
        let y1 = self.evaluate(curve, 1.0);
        let span = y1 - y0;
        if libm::fabsf(span) < 1e-6 {
            return x.clamp(0.0, 1.0);
        }
        ((self.evaluate(curve, x) - y0) / span).clamp(0.0, 1.0)
    }

    /// Whether an invalid curve was hit.
    pub fn faulted(&self) -> bool {
        self.faulted
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use am_ir::{BinaryOp, CurveExpr};
    use alloc::boxed::Box;
    use alloc::vec;

    #[test]
    fn missing_curve_is_identity() {
        let mut eval = CurveEvaluator::new();
        assert_eq!(eval.evaluate(None, 0.25), 0.25);
        assert_eq!(eval.evaluate(None, 3.0), 1.0);
        assert!(!eval.faulted());
    }

    #[test]
    fn table_interpolates_and_clamps() {
        let curve = Curve::table("t", vec![0.0, 1.0, 0.0]);
        let mut eval = CurveEvaluator::new();
        assert!((eval.evaluate(Some(&curve), 0.25) - 0.5).abs() < 1e-6);
        assert_eq!(eval.evaluate(Some(&curve), -1.0), 0.0);
    }

    #[test]
    fn invalid_curve_returns_last_good_value() {
        let good = Curve::table("g", vec![0.3]);
        let bad = Curve::expression("b", "x/", None);
        let mut eval = CurveEvaluator::new();
        assert_eq!(eval.evaluate(Some(&bad), 0.7), 0.7);
        assert!(eval.faulted());
        eval.evaluate(Some(&good), 0.0);
        assert_eq!(eval.evaluate(Some(&bad), 0.7), 0.3);
    }

    #[test]
    fn non_finite_point_falls_back() {
        // 1 / x is infinite at zero.
        let expr = CurveExpr::Binary(
            BinaryOp::Div,
            Box::new(CurveExpr::Number(1.0)),
            Box::new(CurveExpr::X),
        );
        let curve = Curve::expression("inv", "1/x", Some(expr));
        let mut eval = CurveEvaluator::new();
        assert_eq!(eval.evaluate(Some(&curve), 0.5), 1.0);
        assert_eq!(eval.evaluate(Some(&curve), 0.0), 1.0);
        assert!(eval.faulted());
    }

    #[test]
    fn progress_is_normalised() {
        let curve = Curve::table("t", vec![0.2, 0.4, 0.8]);
        let mut eval = CurveEvaluator::new();
        assert_eq!(eval.progress(Some(&curve), 0.0), 0.0);
        assert!((eval.progress(Some(&curve), 1.0) - 1.0).abs() < 1e-6);
        let mid = eval.progress(Some(&curve), 0.5);
        assert!((mid - (0.4 - 0.2) / 0.6).abs() < 1e-5);
    }

    #[test]
    fn flat_curve_progress_is_linear() {
        let curve = Curve::table("flat", vec![0.5]);
        let mut eval = CurveEvaluator::new();
        assert_eq!(eval.progress(Some(&curve), 0.3), 0.3);
    }
}
