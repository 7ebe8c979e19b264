use crate::f;

/// Extends primitives with more specific formatting options
pub trait ValueExt {
    /// Better scientific number formatting
    ///
    /// Header summaries print slopes, intercepts, and calibration ranges that
    /// span many orders of magnitude, so a fixed exponent width keeps columns
    /// aligned.
    ///
    /// Works for anything that can be represented as scientific using the
    /// `LowerExp` trait, which is pretty much every numerical primitive.
    ///
    /// ```rust
    /// # use voltools_utils::ValueExt;
    /// assert_eq!((0.00125_f64).sci(3, 2), "1.250e-03".to_string());
    /// assert_eq!((-255.0_f64).sci(2, 2), "-2.55e+02".to_string());
    /// ```
    fn sci(&self, precision: usize, exp_pad: usize) -> String;
}

impl<T: std::fmt::LowerExp> ValueExt for T {
    fn sci(&self, precision: usize, exp_pad: usize) -> String {
        let num = f!("{:.precision$e}", &self, precision = precision);
        let (mantissa, exp) = match num.split_once('e') {
            Some(parts) => parts,
            None => return num,
        };
        let (sign, exp) = match exp.strip_prefix('-') {
            Some(exp) => ('-', exp),
            None => ('+', exp),
        };
        f!("{mantissa}e{sign}{exp:0>exp_pad$}")
    }
}

/// Repairs for header values that use zero or NaN to mean "not set"
pub trait FloatExt {
    /// Replace NaN or infinite values with `fallback`
    ///
    /// ```rust
    /// # use voltools_utils::FloatExt;
    /// assert_eq!(f64::NAN.finite_or(0.0), 0.0);
    /// assert_eq!(2.5_f64.finite_or(0.0), 2.5);
    /// ```
    fn finite_or(self, fallback: Self) -> Self;

    /// Replace zero, NaN, or infinite values with `fallback`
    ///
    /// ```rust
    /// # use voltools_utils::FloatExt;
    /// assert_eq!(0.0_f64.usable_or(1.0), 1.0);
    /// assert_eq!(f64::NAN.usable_or(1.0), 1.0);
    /// assert_eq!(0.5_f64.usable_or(1.0), 0.5);
    /// ```
    fn usable_or(self, fallback: Self) -> Self;
}

impl FloatExt for f64 {
    fn finite_or(self, fallback: Self) -> Self {
        if self.is_finite() {
            self
        } else {
            fallback
        }
    }

    fn usable_or(self, fallback: Self) -> Self {
        if self.is_finite() && self != 0.0 {
            self
        } else {
            fallback
        }
    }
}

impl FloatExt for f32 {
    fn finite_or(self, fallback: Self) -> Self {
        if self.is_finite() {
            self
        } else {
            fallback
        }
    }

    fn usable_or(self, fallback: Self) -> Self {
        if self.is_finite() && self != 0.0 {
            self
        } else {
            fallback
        }
    }
}
