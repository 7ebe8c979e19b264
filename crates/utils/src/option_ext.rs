use crate::f;

/// Extends Option for easy display formatting
pub trait OptionExt {
    /// Better option outputs
    ///
    /// Generic over anything that implements `Display`, this will either be the
    /// value contained within `Some()` or "none" for the `None` variant.
    ///
    /// ```rust
    /// # use voltools_utils::OptionExt;
    /// let colormap: Option<&str> = Some("gray");
    /// assert_eq!(colormap.display(), "gray");
    ///
    /// let label_lut: Option<u32> = None;
    /// assert_eq!(label_lut.display(), "none");
    /// ```
    fn display(&self) -> String;
}

impl<T: std::fmt::Display> OptionExt for Option<T> {
    fn display(&self) -> String {
        self.as_ref()
            .map(|value| f!("{value}"))
            .unwrap_or_else(|| "none".to_string())
    }
}
