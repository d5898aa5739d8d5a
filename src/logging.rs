// Macros file - tracing macros are imported within the macro definitions

/// Standardized logging macros with consistent field names across the
/// import, sampling and session paths.

// ============================================================================
// Import Pipeline Logging Macros
// ============================================================================

/// Log the lifecycle of one import run.
#[macro_export]
macro_rules! log_import {
    (start, total_rows = $total:expr) => {
        tracing::info!(
            component = "import",
            total_rows = $total,
            "Import run started"
        );
    };
    (progress, row = $row:expr, imported = $imported:expr, duplicates = $dups:expr) => {
        tracing::debug!(
            component = "import",
            row = $row,
            imported = $imported,
            duplicates = $dups,
            "Import progress"
        );
    };
    (row_skipped, row = $row:expr, reason = $reason:expr) => {
        tracing::debug!(
            component = "import",
            row = $row,
            reason = $reason,
            "Row skipped"
        );
    };
    (batch_committed, ops = $ops:expr) => {
        tracing::debug!(
            component = "import",
            ops = $ops,
            "Write batch committed"
        );
    };
    (done, imported = $imported:expr, duplicates = $dups:expr, empty = $empty:expr, bad_data = $bad:expr) => {
        tracing::info!(
            component = "import",
            imported = $imported,
            duplicates = $dups,
            empty = $empty,
            bad_data = $bad,
            "Import run completed"
        );
    };
    (error, row = $row:expr, error = $error:expr) => {
        tracing::error!(
            component = "import",
            row = $row,
            error = %$error,
            "Import run aborted"
        );
    };
}

// ============================================================================
// Sampling Logging Macros
// ============================================================================

#[macro_export]
macro_rules! log_sampling {
    (draw, theme = $theme:expr, requested = $requested:expr, returned = $returned:expr) => {
        tracing::debug!(
            component = "sampling",
            theme = %$theme,
            requested = $requested,
            returned = $returned,
            "Theme sample drawn"
        );
    };
    (wraparound, theme = $theme:expr, shortfall = $shortfall:expr) => {
        tracing::debug!(
            component = "sampling",
            theme = %$theme,
            shortfall = $shortfall,
            "Random point landed near partition end, wrapping around"
        );
    };
    (level_filter_abandoned, theme = $theme:expr, level = $level:expr, remaining = $remaining:expr) => {
        tracing::warn!(
            component = "sampling",
            theme = %$theme,
            level = %$level,
            remaining = $remaining,
            "Level filter left too few questions, using unfiltered sample"
        );
    };
    (exam, total = $total:expr, per_theme = $per_theme:expr) => {
        tracing::info!(
            component = "sampling",
            total = $total,
            per_theme = $per_theme,
            "Composing balanced exam"
        );
    };
}

// ============================================================================
// Session Logging Macros
// ============================================================================

#[macro_export]
macro_rules! log_session {
    ($event:expr, mode = $mode:expr, question_count = $count:expr) => {
        tracing::info!(
            component = "session",
            event = $event,
            mode = ?$mode,
            question_count = $count,
            "Session event"
        );
    };
    ($event:expr, mode = $mode:expr, score = $score:expr, total = $total:expr) => {
        tracing::info!(
            component = "session",
            event = $event,
            mode = ?$mode,
            score = $score,
            total = $total,
            "Session event"
        );
    };
    ($event:expr) => {
        tracing::debug!(component = "session", event = $event, "Session event");
    };
}

// ============================================================================
// Database Operation Logging Macros
// ============================================================================

#[macro_export]
macro_rules! log_db_operation {
    (debug, $operation:expr, count = $count:expr) => {
        tracing::debug!(
            component = "database",
            operation = $operation,
            result_count = $count,
            "Database operation completed"
        );
    };
    (info, $operation:expr, $msg:expr) => {
        tracing::info!(
            component = "database",
            operation = $operation,
            "Database operation: {}", $msg
        );
    };
    (error, $operation:expr, error = $error:expr) => {
        tracing::error!(
            component = "database",
            operation = $operation,
            error = %$error,
            "Database operation failed"
        );
    };
}

// ============================================================================
// System Event Logging Macros
// ============================================================================

#[macro_export]
macro_rules! log_system_event {
    (startup, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "startup",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (config, $msg:expr) => {
        tracing::info!(event_type = "configuration", "System event: {}", $msg);
    };
}

// ============================================================================
// Validation Logging Macros
// ============================================================================

#[macro_export]
macro_rules! log_validation {
    (success, $component:expr, $msg:expr) => {
        tracing::debug!(
            event_type = "validation",
            component = $component,
            result = "success",
            "Validation completed: {}", $msg
        );
    };
    (failure, $component:expr, error = $error:expr) => {
        tracing::warn!(
            event_type = "validation",
            component = $component,
            result = "failure",
            error = %$error,
            "Validation failed"
        );
    };
}
