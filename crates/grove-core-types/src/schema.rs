//! Canonical schema constants for structured logging and events
//!
//! These constants ensure consistency across all logging and error reporting.

// Keys present on every lifecycle event
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";

// Store, context and save identification
pub const FIELD_MODEL: &str = "model";
pub const FIELD_STORE_ID: &str = "store_id";
pub const FIELD_CONTEXT_ID: &str = "context_id";
pub const FIELD_SAVE_ID: &str = "save_id";
pub const FIELD_ENTITY: &str = "entity";

// Sizes
pub const FIELD_COMMITTED: &str = "committed";
pub const FIELD_RESULT_LEN: &str = "result_len";

// Failure details on end_error
pub const FIELD_ERR_KIND: &str = "err_kind";
pub const FIELD_ERR_CODE: &str = "err_code";
pub const FIELD_ERROR: &str = "error";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
