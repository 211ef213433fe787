//! Logging.
//!
//! All diagnostic output goes through the `log` facade, never straight to
//! stderr, so the rest of the crate never has to know whether it's running
//! attended or as a daemon. Two destinations exist: stderr (the default)
//! and, on Unix, syslog. There is no separate "operational" vs.
//! "validation" logger instance -- both streams go through the same
//! target, distinguished by the `target:` RPKI object context that
//! `engine`'s warnings already bake into their message text (the file
//! name or URI each line is about), rather than a second `log::Log` impl.

use std::io::{self, Write};
use std::ops::DerefMut;
use std::process;
use std::sync::OnceLock;
use log::{error, LevelFilter};
use crate::config::Config;
use crate::error::Failed;
use crate::utils::sync::Mutex;


//------------ Logger ----------------------------------------------------------

/// Formats and writes log messages to the configured backend.
pub struct Logger {
    target: Mutex<LogBackend>,
    log_level: LevelFilter,
}

enum LogBackend {
    #[cfg(unix)]
    Syslog(SyslogLogger),
    Stderr { stderr: io::Stderr },
}

impl Logger {
    /// Installs the global logger, defaulting to stderr at level `warn`.
    ///
    /// Diagnostic output before the configuration is available (while
    /// parsing arguments, say) goes here. Call [`switch_logging`] once
    /// [`Config`] is ready to move to the configured target and level.
    ///
    /// [`switch_logging`]: Self::switch_logging
    pub fn init() -> Result<(), Failed> {
        log::set_max_level(LevelFilter::Warn);
        if log::set_logger(&GLOBAL_LOGGER).is_err() {
            eprintln!("Failed to initialize logger.\nAborting.");
            return Err(Failed);
        }
        Ok(())
    }

    /// Switches logging to whatever `config` asks for.
    pub fn switch_logging(config: &Config) -> Result<(), Failed> {
        let logger = Logger::new(config)?;
        GLOBAL_LOGGER.switch(logger);
        log::set_max_level(config.verbose);
        Ok(())
    }

    fn new(config: &Config) -> Result<Self, Failed> {
        let target = if config.syslog {
            Self::new_syslog_target()?
        } else {
            LogBackend::Stderr { stderr: io::stderr() }
        };
        Ok(Logger { target: Mutex::new(target), log_level: config.verbose })
    }

    #[cfg(unix)]
    fn new_syslog_target() -> Result<LogBackend, Failed> {
        SyslogLogger::new().map(LogBackend::Syslog)
    }

    #[cfg(not(unix))]
    fn new_syslog_target() -> Result<LogBackend, Failed> {
        error!("Syslog logging isn't available on this platform.");
        Err(Failed)
    }

    fn log(&self, record: &log::Record) {
        if self.should_ignore(record) {
            return;
        }
        if let Err(err) = self.try_log(record) {
            eprintln!("Logging failed: {}. Exiting.", err);
            process::exit(1);
        }
    }

    fn try_log(&self, record: &log::Record) -> Result<(), io::Error> {
        match self.target.lock().deref_mut() {
            #[cfg(unix)]
            LogBackend::Syslog(logger) => logger.log(record),
            LogBackend::Stderr { stderr } => {
                writeln!(stderr, "[{}] {}", record.level(), record.args())
            }
        }
    }

    fn flush(&self) {
        match self.target.lock().deref_mut() {
            #[cfg(unix)]
            LogBackend::Syslog(logger) => logger.flush(),
            LogBackend::Stderr { stderr } => { let _ = stderr.lock().flush(); }
        }
    }

    /// Filters out chatter from crates we link but don't want to hear from
    /// below info, unless we're at trace.
    fn should_ignore(&self, record: &log::Record) -> bool {
        if self.log_level >= LevelFilter::Trace {
            return false;
        }
        let module = match record.module_path() {
            Some(module) => module,
            None => return false,
        };
        record.level() > log::Level::Info && module.starts_with("rustls")
    }
}


//------------ SyslogLogger ---------------------------------------------------

#[cfg(unix)]
struct SyslogLogger(syslog::Logger<syslog::LoggerBackend, syslog::Formatter3164>);

#[cfg(unix)]
impl SyslogLogger {
    fn new() -> Result<Self, Failed> {
        let process = std::env::current_exe().ok().and_then(|path| {
            path.file_name().and_then(std::ffi::OsStr::to_str).map(ToString::to_string)
        }).unwrap_or_else(|| String::from("rtr-relay"));
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_DAEMON,
            hostname: None,
            process,
            pid: std::process::id(),
        };
        let logger = syslog::unix(formatter.clone())
            .or_else(|_| syslog::tcp(formatter.clone(), ("127.0.0.1", 601)))
            .or_else(|_| syslog::udp(formatter, ("127.0.0.1", 0), ("127.0.0.1", 514)));
        match logger {
            Ok(logger) => Ok(SyslogLogger(logger)),
            Err(err) => {
                error!("Cannot connect to syslog: {}", err);
                Err(Failed)
            }
        }
    }

    fn log(&mut self, record: &log::Record) -> Result<(), io::Error> {
        match record.level() {
            log::Level::Error => self.0.err(record.args()),
            log::Level::Warn => self.0.warning(record.args()),
            log::Level::Info => self.0.info(record.args()),
            log::Level::Debug => self.0.debug(record.args()),
            log::Level::Trace => self.0.debug(record.args()),
        }.map_err(|err| match err {
            syslog::Error::Io(err) => err,
            err => io::Error::new(io::ErrorKind::Other, err),
        })
    }

    fn flush(&mut self) {
        let _ = self.0.backend.flush();
    }
}


//------------ GlobalLogger ---------------------------------------------------

/// The static installed with `log::set_logger`.
///
/// Until [`Logger::switch_logging`] runs, every message just goes to
/// stderr -- good enough for argument-parsing errors that happen before a
/// `Config` exists.
struct GlobalLogger {
    inner: OnceLock<Logger>,
}

impl GlobalLogger {
    fn switch(&self, logger: Logger) {
        // Only ever called once, right after parsing the configuration.
        let _ = self.inner.set(logger);
    }
}

impl log::Log for GlobalLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        match self.inner.get() {
            Some(logger) => logger.log(record),
            None => eprintln!("[{}] {}", record.level(), record.args()),
        }
    }

    fn flush(&self) {
        if let Some(logger) = self.inner.get() {
            logger.flush()
        }
    }
}

static GLOBAL_LOGGER: GlobalLogger = GlobalLogger { inner: OnceLock::new() };
