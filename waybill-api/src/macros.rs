//! Helper macros for the API crate.

/// Implement `FromRef<AppState>` for a field so handlers can extract it
/// directly.
///
/// ```ignore
/// crate::impl_from_ref!(ApiLookup, lookup);
/// ```
#[macro_export]
macro_rules! impl_from_ref {
    ($type:ty, $field:ident) => {
        impl axum::extract::FromRef<$crate::state::AppState> for $type {
            fn from_ref(state: &$crate::state::AppState) -> Self {
                state.$field.clone()
            }
        }
    };
}
