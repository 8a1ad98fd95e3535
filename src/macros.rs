// src/macros.rs

//
// Logging macros
//
// logging feature enabled → tracing, every event tagged with `link = <label>`
// logging feature disabled → only log_error prints to stderr
//

#![allow(unused_macros)]

// --------------------
// ERROR
// --------------------

#[cfg(feature = "logging")]
macro_rules! log_error {
    ($link:expr, $($arg:tt)+) => {
        tracing::error!(link = %$link, $($arg)+)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_error {
    ($link:expr, $($arg:tt)+) => {
        eprintln!("[{}] {}", $link, format_args!($($arg)+))
    };
}

// --------------------
// WARN
// --------------------

#[cfg(feature = "logging")]
macro_rules! log_warn {
    ($link:expr, $($arg:tt)+) => {
        tracing::warn!(link = %$link, $($arg)+)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_warn {
    ($link:expr, $($arg:tt)+) => {{
        let _ = &$link;
    }};
}

// --------------------
// INFO
// --------------------

#[cfg(feature = "logging")]
macro_rules! log_info {
    ($link:expr, $($arg:tt)+) => {
        tracing::info!(link = %$link, $($arg)+)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_info {
    ($link:expr, $($arg:tt)+) => {{
        let _ = &$link;
    }};
}

// --------------------
// DEBUG
// --------------------

#[cfg(feature = "logging")]
macro_rules! log_debug {
    ($link:expr, $($arg:tt)+) => {
        tracing::debug!(link = %$link, $($arg)+)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_debug {
    ($link:expr, $($arg:tt)+) => {{
        let _ = &$link;
    }};
}

pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_info;
pub(crate) use log_warn;
