use std::sync::Once;

use env_logger::Env;
use log::LevelFilter;

static RUST_LOG_ONCE: Once = Once::new();

/// Level from `CAPTIVATE_LOG`, then `RUST_LOG`, defaulting to `info`.
pub fn env_level() -> LevelFilter {
    std::env::var("CAPTIVATE_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
        .as_deref()
        .and_then(parse_level)
        .unwrap_or(LevelFilter::Info)
}

pub fn parse_level(input: &str) -> Option<LevelFilter> {
    input.trim().parse::<LevelFilter>().ok()
}

/// Initialize logging for Rust binaries (stderr formatter). Later calls are no-ops.
pub fn init_rust_logging() {
    init_rust_logging_with(env_level());
}

pub fn init_rust_logging_with(level: LevelFilter) {
    RUST_LOG_ONCE.call_once(|| {
        let env = Env::default().default_filter_or(level.as_str().to_ascii_lowercase());
        // A logger may already be installed by a host application.
        let _ = env_logger::Builder::from_env(env)
            .format_timestamp_millis()
            .format_target(true)
            .try_init();
    });
}

#[cfg(feature = "python")]
pub use python::{init_python_logging, set_python_log_level};

#[cfg(feature = "python")]
mod python {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use log::{LevelFilter, Log, Metadata, Record};
    use once_cell::sync::OnceCell;
    use pyo3::prelude::*;

    static PY_LOGGER: OnceCell<&'static PyLogger> = OnceCell::new();

    /// Forwards `log` records to Python's `logging` module.
    struct PyLogger {
        filter: Mutex<LevelFilter>,
        loggers: Mutex<HashMap<String, Py<PyAny>>>,
    }

    fn python_level(level: log::Level) -> u32 {
        match level {
            log::Level::Error => 40,
            log::Level::Warn => 30,
            log::Level::Info => 20,
            log::Level::Debug => 10,
            log::Level::Trace => 5,
        }
    }

    impl PyLogger {
        fn logger_for(&self, py: Python<'_>, name: &str) -> PyResult<Py<PyAny>> {
            let mut loggers = self.loggers.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(logger) = loggers.get(name) {
                return Ok(logger.clone_ref(py));
            }
            let logger = py
                .import("logging")?
                .getattr("getLogger")?
                .call1((name,))?
                .unbind();
            loggers.insert(name.to_string(), logger.clone_ref(py));
            Ok(logger)
        }
    }

    impl Log for PyLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            let filter = *self.filter.lock().unwrap_or_else(|e| e.into_inner());
            metadata.level().to_level_filter() <= filter
        }

        fn log(&self, record: &Record) {
            if !self.enabled(record.metadata()) {
                return;
            }
            let name = record.target().replace("::", ".");
            let message = record.args().to_string();
            Python::attach(|py| {
                let result = self.logger_for(py, &name).and_then(|logger| {
                    logger
                        .bind(py)
                        .call_method1("log", (python_level(record.level()), message))
                        .map(|_| ())
                });
                if let Err(e) = result {
                    e.restore(py);
                }
            });
        }

        fn flush(&self) {}
    }

    /// Route Rust logs into Python's `logging`. Safe to call more than once.
    pub fn init_python_logging(level: LevelFilter) {
        let logger = PY_LOGGER.get_or_init(|| {
            let leaked: &'static PyLogger = Box::leak(Box::new(PyLogger {
                filter: Mutex::new(level),
                loggers: Mutex::new(HashMap::new()),
            }));
            leaked
        });
        if log::set_logger(*logger).is_ok() {
            log::set_max_level(level);
        }
        set_python_log_level(level);
    }

    pub fn set_python_log_level(level: LevelFilter) {
        if let Some(logger) = PY_LOGGER.get() {
            *logger.filter.lock().unwrap_or_else(|e| e.into_inner()) = level;
            log::set_max_level(level);
        }
    }
}
