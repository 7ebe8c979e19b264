/// Extends string types with useful functions
pub trait StringExt {
    /// Derive a NIfTI file name from a path or url
    ///
    /// Takes the last path segment, drops any query string and a trailing
    /// `.gz`, and makes sure the result ends in `.nii`. Anything that leaves
    /// an empty name falls back to `untitled.nii`.
    ///
    /// ```rust
    /// # use voltools_utils::StringExt;
    /// assert_eq!("https://host/data/mni152.nii.gz".nifti_name(), "mni152.nii");
    /// assert_eq!("./brain.mgz".nifti_name(), "brain.mgz.nii");
    /// assert_eq!("scan.nii?token=abc".nifti_name(), "scan.nii");
    /// assert_eq!("".nifti_name(), "untitled.nii");
    /// ```
    fn nifti_name(&self) -> String;
}

impl<T: AsRef<str>> StringExt for T {
    fn nifti_name(&self) -> String {
        let path = self.as_ref().split(['?', '#']).next().unwrap_or_default();
        let mut name = path.rsplit(['/', '\\']).next().unwrap_or_default().to_string();

        if name.to_lowercase().ends_with(".gz") {
            name.truncate(name.len() - 3);
        }

        if name.is_empty() {
            return "untitled.nii".to_string();
        }

        if !name.to_lowercase().ends_with(".nii") {
            name.push_str(".nii");
        }
        name
    }
}
