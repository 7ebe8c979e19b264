use crate::error::{Error, Result};

/// Extends functionality for slices of float arrays
pub trait SliceExt<T> {
    /// Find the minimum value in float arrays
    ///
    /// Only provides the minimum value from a collection of valid numbers. Any
    /// NAN values, infinite values, or empty slices will return an error.
    ///
    /// ```rust
    /// # use voltools_utils::SliceExt;
    /// # use voltools_utils::Error;
    /// // Successful cases
    /// assert_eq!([1.1_f64, 0.5, 2.2].try_min(), Ok(0.5));
    /// assert_eq!([1.1, f32::MIN, 2.2].try_min(), Ok(f32::MIN));
    ///
    /// // Error cases
    /// assert_eq!([1.1, f32::NAN, 2.2].try_min(), Err(Error::SliceContainsUndefinedValues));
    /// assert_eq!(Vec::<f32>::new().try_min(), Err(Error::SliceContainsNoValues));
    /// ```
    ///
    /// The float primitives (`f32`/`f64`) do not implement `Ord` due to `NaN`
    /// being incomparable, so this uses `total_cmp` once undefined values
    /// have been ruled out.
    fn try_min(&self) -> Result<T>;

    /// Find the maximum value in float arrays
    ///
    /// Only provides the maximum value from a collection of valid numbers. Any
    /// NAN values, infinite values, or empty slices will return an error.
    ///
    /// ```rust
    /// # use voltools_utils::SliceExt;
    /// # use voltools_utils::Error;
    /// assert_eq!([1.1_f64, 0.5, 2.2].try_max(), Ok(2.2));
    /// assert_eq!([1.1_f64, f64::INFINITY].try_max(), Err(Error::SliceContainsUndefinedValues));
    /// ```
    fn try_max(&self) -> Result<T>;

    /// Find the (min, max) of the finite values only
    ///
    /// Sample buffers routinely carry NaN for masked voxels, so unlike
    /// [try_min()](SliceExt::try_min) these are skipped rather than treated
    /// as an error. A slice with no finite values at all is still an error.
    ///
    /// ```rust
    /// # use voltools_utils::SliceExt;
    /// # use voltools_utils::Error;
    /// assert_eq!([3.0_f64, f64::NAN, -1.0, 7.5].finite_extent(), Ok((-1.0, 7.5)));
    /// assert_eq!([f32::NAN, f32::INFINITY].finite_extent(), Err(Error::SliceContainsNoValues));
    /// ```
    fn finite_extent(&self) -> Result<(T, T)>;
}

macro_rules! impl_slice_ext {
    ($t:ty) => {
        impl SliceExt<$t> for [$t] {
            fn try_min(&self) -> Result<$t> {
                if self.iter().any(|v| !v.is_finite()) {
                    return Err(Error::SliceContainsUndefinedValues);
                };

                self.iter()
                    .min_by(|a, b| a.total_cmp(b))
                    .copied()
                    .ok_or(Error::SliceContainsNoValues)
            }

            fn try_max(&self) -> Result<$t> {
                if self.iter().any(|v| !v.is_finite()) {
                    return Err(Error::SliceContainsUndefinedValues);
                };

                self.iter()
                    .max_by(|a, b| a.total_cmp(b))
                    .copied()
                    .ok_or(Error::SliceContainsNoValues)
            }

            fn finite_extent(&self) -> Result<($t, $t)> {
                self.iter()
                    .filter(|v| v.is_finite())
                    .fold(None, |acc: Option<($t, $t)>, &v| match acc {
                        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
                        None => Some((v, v)),
                    })
                    .ok_or(Error::SliceContainsNoValues)
            }
        }
    };
}

impl_slice_ext!(f32);
impl_slice_ext!(f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extent_of_single_value() {
        assert_eq!([4.0_f64].finite_extent(), Ok((4.0, 4.0)));
    }

    #[test]
    fn extent_skips_infinities() {
        let values = [f32::NEG_INFINITY, 2.0, 1.0, f32::INFINITY];
        assert_eq!(values.finite_extent(), Ok((1.0, 2.0)));
    }
}
