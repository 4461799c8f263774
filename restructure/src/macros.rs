//! Utility macros for error construction.

/// Creates a [`crate::error::RestructureError`] from a kind and description,
/// with optional dynamic detail.
#[macro_export]
macro_rules! restructure_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::RestructureError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::RestructureError::from(($kind, $desc, $detail.to_string()))
    };
}

/// Creates and returns a [`crate::error::RestructureError`] from the current
/// function.
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return Err($crate::restructure_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return Err($crate::restructure_error!($kind, $desc, $detail))
    };
}
