//! Helper macro enforcing consistent rotor log fields.
//!
//! Keeps a `platform` field present on every probe/selection/triage event so
//! downstream parsing can rely on it.

/// Log an event for a platform plus any extra fields.
#[macro_export]
macro_rules! rotor_event {
    ($level:ident, $target:expr, $event:expr, platform = $platform:expr $(, $field:ident = $value:expr )* $(,)?) => {
        tracing::$level!(
            target = $target,
            event = $event,
            platform = %$platform,
            $($field = %$value,)*
        )
    };
}
