//! Logging infrastructure for oxidized-vita

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Config, LogLevel};

/// Map a configured level onto a tracing level, `None` when logging is off
pub fn level_for(log_level: LogLevel) -> Option<Level> {
    match log_level {
        LogLevel::Off => None,
        LogLevel::Error => Some(Level::ERROR),
        LogLevel::Warn => Some(Level::WARN),
        LogLevel::Info => Some(Level::INFO),
        LogLevel::Debug => Some(Level::DEBUG),
        LogLevel::Trace => Some(Level::TRACE),
    }
}

/// Initialize the logging system based on configuration
pub fn init(config: &Config) {
    let Some(level) = level_for(config.debug.log_level) else {
        return;
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    if config.debug.trace_shader_decode {
        if let Ok(directive) = "shader=trace".parse() {
            filter = filter.add_directive(directive);
        }
    }
    if config.debug.trace_kernel_sync {
        if let Ok(directive) = "kernel=trace".parse() {
            filter = filter.add_directive(directive);
        }
    }

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true),
    );

    if config.debug.log_to_file {
        if let Ok(file) = std::fs::File::create(&config.debug.log_path) {
            let file_layer = fmt::layer().with_writer(file).with_ansi(false);
            let _ = subscriber.with(file_layer).try_init();
        } else {
            let _ = subscriber.try_init();
        }
    } else {
        let _ = subscriber.try_init();
    }
}

/// Initialize logging with default settings (for tools and tests)
pub fn init_default() {
    let filter = EnvFilter::from_default_env().add_directive(Level::INFO.into());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}

// Component-specific logging

/// Log a shader translator trace message
#[macro_export]
macro_rules! shader_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "shader", $($arg)*)
    };
}

/// Log a shader translator debug message
#[macro_export]
macro_rules! shader_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "shader", $($arg)*)
    };
}

/// Log a shader translator warning
#[macro_export]
macro_rules! shader_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: "shader", $($arg)*)
    };
}

/// Log a shader translator error
#[macro_export]
macro_rules! shader_error {
    ($($arg:tt)*) => {
        tracing::error!(target: "shader", $($arg)*)
    };
}

/// Log a shader cache debug message
#[macro_export]
macro_rules! cache_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "cache", $($arg)*)
    };
}

/// Log a shader cache warning
#[macro_export]
macro_rules! cache_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: "cache", $($arg)*)
    };
}

/// Log a kernel trace message
#[macro_export]
macro_rules! kernel_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "kernel", $($arg)*)
    };
}

/// Log a kernel debug message
#[macro_export]
macro_rules! kernel_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "kernel", $($arg)*)
    };
}

/// Log a kernel warning
#[macro_export]
macro_rules! kernel_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: "kernel", $($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(level_for(LogLevel::Off), None);
        assert_eq!(level_for(LogLevel::Warn), Some(Level::WARN));
        assert_eq!(level_for(LogLevel::Trace), Some(Level::TRACE));
    }

    #[test]
    fn test_init_is_repeatable() {
        init_default();
        init_default();
        crate::shader_debug!("logging initialised twice without panicking");
    }
}
