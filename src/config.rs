//! Configuration.

use std::{env, fs, process};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use clap::{crate_authors, App, Arg, ArgMatches};
use dirs::home_dir;
use log::{error, LevelFilter};
use serde::Deserialize;


//------------ Config --------------------------------------------------------

/// The relay's full runtime configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Path to the directory that contains the repository cache.
    pub cache_dir: PathBuf,

    /// Path to the directory that contains the trust anchor locators.
    pub tal_dir: PathBuf,

    /// If set, never fetch -- validate whatever is already in the cache.
    pub offline: bool,

    /// Should we do strict validation?
    pub strict: bool,

    /// How to treat stale manifests and CRLs.
    pub stale: FilterPolicy,

    /// Certificate chains longer than this are refused.
    pub max_cert_depth: u32,

    /// Whether to randomize the order TAL URIs are tried in.
    pub shuffle_tal_uris: bool,

    /// Number of validation worker threads (one per TAL, capped at this).
    pub validation_threads: usize,

    /// How many past deltas the history keeps.
    pub history_size: usize,

    /// Addresses to listen for RTR connections on.
    pub rtr_listen: Vec<SocketAddr>,

    /// How often a full validation run is repeated.
    pub refresh: Duration,

    /// RTR refresh interval handed to routers (protocol version 1).
    pub rtr_refresh: u32,

    /// RTR retry interval handed to routers (protocol version 1).
    pub rtr_retry: u32,

    /// RTR expire interval handed to routers (protocol version 1).
    pub rtr_expire: u32,

    /// The log level filter for setting up logging.
    pub verbose: LevelFilter,

    /// Whether to also log through syslog (unix only).
    pub syslog: bool,

    /// Run a single validation pass and exit, instead of validating on a
    /// repeating `refresh` interval and serving RTR.
    pub once: bool,
}

impl Config {
    /// Parses `clap` arguments, layers an optional TOML file under them,
    /// and fills in `dirs`-derived defaults for anything still unset.
    pub fn create() -> Self {
        let matches = Self::app().get_matches();
        Self::from_arg_matches(&matches)
    }

    fn app<'a, 'b>() -> App<'a, 'b> {
        App::new("rtr-relay")
            .version("0.1.0")
            .author(crate_authors!())
            .about("validates RPKI route origin attestations and serves them over RTR")
            .arg(Arg::with_name("config")
                 .short("c")
                 .long("config")
                 .value_name("FILE")
                 .help("reads additional options from a TOML config file")
                 .takes_value(true)
            )
            .arg(Arg::with_name("basedir")
                 .short("b")
                 .long("base-dir")
                 .value_name("DIR")
                 .help("sets the base directory for cache and TALs")
                 .takes_value(true)
            )
            .arg(Arg::with_name("cachedir")
                 .long("cache-dir")
                 .value_name("DIR")
                 .help("sets the repository cache directory")
                 .takes_value(true)
            )
            .arg(Arg::with_name("taldir")
                 .short("t")
                 .long("tal-dir")
                 .value_name("DIR")
                 .help("sets the TAL directory")
                 .takes_value(true)
            )
            .arg(Arg::with_name("offline")
                 .long("offline")
                 .help("don't fetch, validate the cache as-is")
            )
            .arg(Arg::with_name("strict")
                 .long("strict")
                 .help("parse RPKI data in strict mode")
            )
            .arg(Arg::with_name("stale")
                 .long("stale")
                 .value_name("POLICY")
                 .possible_values(&["reject", "warn", "accept"])
                 .help("how to treat stale manifests and CRLs")
                 .takes_value(true)
            )
            .arg(Arg::with_name("max_cert_depth")
                 .long("max-cert-depth")
                 .value_name("COUNT")
                 .default_value("32")
                 .help("maximum CA certificate chain depth")
            )
            .arg(Arg::with_name("shuffle")
                 .long("shuffle-tal-uris")
                 .help("randomize the order TAL URIs are tried in")
            )
            .arg(Arg::with_name("validation_threads")
                 .long("validation-threads")
                 .value_name("COUNT")
                 .help("maximum number of concurrent TAL validation workers")
                 .takes_value(true)
            )
            .arg(Arg::with_name("history_size")
                 .long("history")
                 .value_name("COUNT")
                 .default_value("10")
                 .help("number of past deltas to keep")
            )
            .arg(Arg::with_name("listen")
                 .short("l")
                 .long("listen")
                 .value_name("ADDR:PORT")
                 .help("listen addr:port for RTR")
                 .takes_value(true)
                 .multiple(true)
            )
            .arg(Arg::with_name("refresh")
                 .long("refresh")
                 .value_name("SECONDS")
                 .default_value("3600")
                 .help("validation run interval in seconds")
            )
            .arg(Arg::with_name("rtr_refresh")
                 .long("rtr-refresh")
                 .value_name("SECONDS")
                 .default_value("3600")
            )
            .arg(Arg::with_name("rtr_retry")
                 .long("rtr-retry")
                 .value_name("SECONDS")
                 .default_value("600")
            )
            .arg(Arg::with_name("rtr_expire")
                 .long("rtr-expire")
                 .value_name("SECONDS")
                 .default_value("7200")
            )
            .arg(Arg::with_name("syslog")
                 .long("syslog")
                 .help("also log to syslog")
            )
            .arg(Arg::with_name("once")
                 .long("once")
                 .help("run a single validation pass and exit")
            )
            .arg(Arg::with_name("verbose")
                 .short("v")
                 .long("verbose")
                 .multiple(true)
                 .help("print more (and more) information")
            )
    }

    fn from_arg_matches(matches: &ArgMatches) -> Self {
        let cur_dir = match env::current_dir() {
            Ok(dir) => dir,
            Err(err) => {
                println!("Fatal: cannot get current directory ({}). Aborting.", err);
                process::exit(1);
            }
        };

        let file = matches.value_of("config").map(|path| {
            ConfigFile::read(&cur_dir.join(path))
        });

        let listen = match matches.values_of("listen") {
            Some(values) => {
                let mut listen = Vec::new();
                for val in values {
                    match val.to_socket_addrs() {
                        Ok(some) => listen.extend(some),
                        Err(_) => {
                            println!("Invalid socket address {}", val);
                            process::exit(1);
                        }
                    }
                }
                listen
            }
            None => {
                file.as_ref().and_then(|f| f.listen.clone()).unwrap_or_else(|| {
                    "127.0.0.1:3323".to_socket_addrs().unwrap().collect()
                })
            }
        };

        let (cache_dir, tal_dir) = Self::prepare_dirs(matches, &cur_dir);

        Config {
            cache_dir,
            tal_dir,
            offline: matches.is_present("offline"),
            strict: matches.is_present("strict"),
            stale: match matches.value_of("stale") {
                Some("reject") => FilterPolicy::Reject,
                Some("warn") => FilterPolicy::Warn,
                Some("accept") => FilterPolicy::Accept,
                Some(_) => unreachable!(),
                None => file.as_ref()
                    .and_then(|f| f.stale)
                    .unwrap_or(FilterPolicy::Reject),
            },
            max_cert_depth: parse_value(matches, "max_cert_depth", 32),
            shuffle_tal_uris: matches.is_present("shuffle"),
            validation_threads: matches.value_of("validation_threads")
                .and_then(|v| usize::from_str(v).ok())
                .unwrap_or_else(num_cpus::get),
            history_size: parse_value(matches, "history_size", 10),
            rtr_listen: listen,
            refresh: Duration::from_secs(parse_value(matches, "refresh", 3600)),
            rtr_refresh: parse_value(matches, "rtr_refresh", 3600),
            rtr_retry: parse_value(matches, "rtr_retry", 600),
            rtr_expire: parse_value(matches, "rtr_expire", 7200),
            verbose: match matches.occurrences_of("verbose") {
                0 => LevelFilter::Warn,
                1 => LevelFilter::Info,
                _ => LevelFilter::Debug,
            },
            syslog: matches.is_present("syslog"),
            once: matches.is_present("once"),
        }
    }

    /// Prepares and returns the cache dir and tal dir.
    fn prepare_dirs(matches: &ArgMatches, cur_dir: &Path) -> (PathBuf, PathBuf) {
        let base_dir = match matches.value_of("basedir") {
            Some(dir) => Some(cur_dir.join(dir)),
            None => home_dir().map(|dir| dir.join(".rtr-relay")),
        };
        let cache_dir = match matches.value_of("cachedir") {
            Some(dir) => cur_dir.join(dir),
            None => match base_dir {
                Some(ref dir) => dir.join("repository"),
                None => {
                    println!(
                        "Can't determine default working directory. \
                         Please use the -b option.\nAborting."
                    );
                    process::exit(1)
                }
            }
        };
        let tal_dir = match matches.value_of("taldir") {
            Some(dir) => cur_dir.join(dir),
            None => match base_dir {
                Some(ref dir) => dir.join("tals"),
                None => {
                    println!(
                        "Can't determine default working directory. \
                         Please use the -b option.\nAborting."
                    );
                    process::exit(1)
                }
            }
        };

        if let Err(err) = fs::create_dir_all(&cache_dir) {
            println!(
                "Can't create repository directory {}: {}.\nAborting.",
                cache_dir.display(), err
            );
            process::exit(1);
        }
        if let Err(err) = fs::create_dir_all(&tal_dir) {
            println!(
                "Can't create TAL directory {}: {}.\nAborting.",
                tal_dir.display(), err
            );
            process::exit(1);
        }

        (cache_dir, tal_dir)
    }
}

fn parse_value<T: FromStr>(matches: &ArgMatches, name: &str, default: T) -> T {
    match matches.value_of(name) {
        Some(value) => match T::from_str(value) {
            Ok(some) => some,
            Err(_) => {
                error!("Invalid value '{}' for --{} argument.", value, name);
                process::exit(1);
            }
        },
        None => default,
    }
}


//------------ ConfigFile -----------------------------------------------------

/// The subset of `Config` that may come from a TOML file.
///
/// Command-line arguments always take precedence; this only fills in
/// values the user didn't pass explicitly.
#[derive(Clone, Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    stale: Option<FilterPolicy>,

    #[serde(default)]
    listen: Option<Vec<SocketAddr>>,
}

impl ConfigFile {
    fn read(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                println!(
                    "Can't read config file {}: {}.\nAborting.",
                    path.display(), err
                );
                process::exit(1);
            }
        };
        match toml::from_str(&content) {
            Ok(file) => file,
            Err(err) => {
                println!(
                    "Can't parse config file {}: {}.\nAborting.",
                    path.display(), err
                );
                process::exit(1);
            }
        }
    }
}


//------------ FilterPolicy ---------------------------------------------------

/// How to treat manifests and CRLs that are past their `nextUpdate`.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum FilterPolicy {
    /// Reject the object and everything under it.
    Reject,

    /// Log a warning but process the object anyway.
    Warn,

    /// Silently process the object.
    Accept,
}

impl FromStr for FilterPolicy {
    type Err = FilterPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reject" => Ok(FilterPolicy::Reject),
            "warn" => Ok(FilterPolicy::Warn),
            "accept" => Ok(FilterPolicy::Accept),
            _ => Err(FilterPolicyError),
        }
    }
}

#[derive(Debug)]
pub struct FilterPolicyError;

impl std::fmt::Display for FilterPolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "expected one of \"reject\", \"warn\", \"accept\"")
    }
}

impl std::error::Error for FilterPolicyError { }


//============ Testing =========================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn filter_policy_from_str_roundtrips() {
        assert_eq!(FilterPolicy::from_str("reject").unwrap(), FilterPolicy::Reject);
        assert_eq!(FilterPolicy::from_str("warn").unwrap(), FilterPolicy::Warn);
        assert_eq!(FilterPolicy::from_str("accept").unwrap(), FilterPolicy::Accept);
        assert!(FilterPolicy::from_str("bogus").is_err());
    }
}
