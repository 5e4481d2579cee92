//! Custom macros for reducing code repetition in alphaplay

/// Log an error and continue execution (non-fatal error handling)
///
/// # Example
/// ```ignore
/// log_and_continue!(source.cancel_reading(), "cancel readers");
/// ```
#[macro_export]
macro_rules! log_and_continue {
    ($expr:expr, $context:expr) => {
        if let Err(e) = $expr {
            log::error!("Failed to {}: {}", $context, e);
        }
    };
}

/// Validate an enum-like string value
///
/// # Example
/// ```ignore
/// validate_enum!(pacing, "internal", "external");
/// validate_enum!(surface_format, "bgra8unorm", "rgba8unorm");
/// ```
#[macro_export]
macro_rules! validate_enum {
    ($value:expr, $($variant:expr),+) => {
        match $value {
            $($variant)|+ => Ok::<(), anyhow::Error>(()),
            _ => anyhow::bail!("Invalid value: {} (expected one of: {})", $value, [$($variant),+].join(", ")),
        }
    };
}

/// Deliver a notification to an observer while the emission gate is open
///
/// Evaluates to `false` when the gate has been closed by a purge, in which
/// case the notification is dropped.
///
/// # Example
/// ```ignore
/// emit_if_alive!(gate, sink.did_output_frame(frame));
/// ```
#[macro_export]
macro_rules! emit_if_alive {
    ($gate:expr, $call:expr) => {{
        let _guard = $gate.lock();
        if $gate.is_alive() {
            $call;
            true
        } else {
            log::trace!("Dropped notification from retired session");
            false
        }
    }};
}
