//! Operation lifecycle macros
//!
//! A public engine operation logs `start` when it begins and then exactly
//! one of `end` or `end_error`. Every lifecycle event carries `component`,
//! `op` and `event`; closing events add `duration_ms`, measured from the
//! [`Instant`](std::time::Instant) passed as `since`. Anything after that
//! uses ordinary `tracing` field syntax, with keys taken from
//! [`grove_core_types::schema`].

use std::time::Instant;

#[doc(hidden)]
pub use grove_core_types::schema::{EVENT_END, EVENT_END_ERROR, EVENT_START};

/// Whole milliseconds since `start`
pub fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[doc(hidden)]
#[macro_export]
macro_rules! __grove_lifecycle_event {
    ($level:ident, $op:expr, $event:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            component = module_path!(),
            op = $op,
            event = $event
            $(, $($field)*)?
        )
    };
}

/// Log the start of an operation
///
/// ```
/// # use grove_core::log_op_start;
/// log_op_start!("context_save");
/// log_op_start!("context_save", context_id = "c-1");
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr $(, $($field:tt)*)?) => {
        $crate::__grove_lifecycle_event!(
            info,
            $op,
            $crate::logging_facility::macros::EVENT_START
            $(, $($field)*)?
        )
    };
}

/// Log the successful end of an operation started at `since`
///
/// ```
/// # use grove_core::log_op_end;
/// let start = std::time::Instant::now();
/// log_op_end!("fetch", since = start, result_len = 3usize);
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, since = $start:expr $(, $($field:tt)*)?) => {
        $crate::__grove_lifecycle_event!(
            info,
            $op,
            $crate::logging_facility::macros::EVENT_END,
            duration_ms = $crate::logging_facility::macros::elapsed_ms($start)
            $(, $($field)*)?
        )
    };
}

/// Log the failure of an operation started at `since`
///
/// `err` is anything that converts into an
/// [`ExError`](crate::errors::ExError); its kind, code and rendered message
/// are attached to the event.
///
/// ```
/// # use grove_core::{log_op_error, errors::{ExError, ExErrorKind}};
/// let start = std::time::Instant::now();
/// let err = ExError::new(ExErrorKind::NotFound);
/// log_op_error!("object", err, since = start, entity = "Item");
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, since = $start:expr $(, $($field:tt)*)?) => {{
        let failure: $crate::errors::ExError = $err.into();
        $crate::__grove_lifecycle_event!(
            error,
            $op,
            $crate::logging_facility::macros::EVENT_END_ERROR,
            duration_ms = $crate::logging_facility::macros::elapsed_ms($start),
            err_kind = ?failure.kind(),
            err_code = failure.code(),
            error = %failure
            $(, $($field)*)?
        );
    }};
}
