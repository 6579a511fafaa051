//! Navigation seam.

/// Moves the user somewhere else.
pub trait Navigator: Send + Sync {
    /// Navigate within the app (e.g. to the quiz page).
    fn push(&self, path: &str);

    /// Leave the app for an external URL (identity provider).
    fn redirect(&self, url: &str);
}
