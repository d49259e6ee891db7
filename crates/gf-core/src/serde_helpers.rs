//! Shared serde helper functions used across multiple modules.

/// Serde default function that returns `true`.
///
/// Used for `enabled` flags and `retain_failed_units`.
pub fn default_true() -> bool {
    true
}
