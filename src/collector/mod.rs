//! Maintaining a local copy of the RPKI repositories.
//!
//! RPKI objects are published over one of two transports: rsync, or RRDP
//! (XML deltas served over HTTPS). Both are update protocols rather than
//! object stores in their own right, so a local cache has to be kept and
//! refreshed. This module owns that cache and the decision of which
//! transport to use for a given certificate authority; it does not itself
//! speak either wire protocol — that is delegated to a [`Fetcher`]
//! implementation so the traversal engine never has to know or care which
//! transport produced the bytes it is looking at.
//!
//! [`Collector`] holds the cache configuration. [`Collector::start`]
//! returns a [`Run`], a single validation pass's view of the cache, which
//! provides [`Run::load_ta`] for trust anchor certificates and
//! [`Run::repository`] for everything underneath them.

use std::{fs, io};
use std::path::PathBuf;
use bytes::Bytes;
use log::{error, warn};
use rpki::repository::tal::TalUri;
use rpki::uri;
use crate::config::Config;
use crate::error::Failed;
use crate::uri::CacheLocator;

mod fetch;

pub use self::fetch::{Fetcher, LocalFetcher, NullTransport};


//------------ Collector -------------------------------------------------------

/// Access to the currently published RPKI data.
///
/// `Collector` values don't do anything by themselves; call
/// [`start`][Self::start] to acquire a [`Run`] that actually fetches data.
#[derive(Debug)]
pub struct Collector {
    locator: CacheLocator,
    fetcher: Box<dyn Fetcher>,
}

impl Collector {
    /// Ensures the cache directory exists.
    pub fn init(config: &Config) -> Result<(), Failed> {
        if let Err(err) = fs::read_dir(&config.cache_dir) {
            if err.kind() == io::ErrorKind::NotFound {
                fs::create_dir_all(&config.cache_dir).map_err(|err| {
                    error!(
                        "Failed to create repository directory {}: {}",
                        config.cache_dir.display(), err
                    );
                    Failed
                })?;
            }
            else {
                error!(
                    "Failed to open repository directory {}: {}",
                    config.cache_dir.display(), err
                );
                return Err(Failed)
            }
        }
        Ok(())
    }

    /// Creates a new collector using the fetcher configured in `config`.
    pub fn new(config: &Config) -> Result<Self, Failed> {
        Self::init(config)?;
        let fetcher: Box<dyn Fetcher> = if config.offline {
            Box::new(NullTransport)
        } else {
            Box::new(LocalFetcher::new(config.cache_dir.clone()))
        };
        Ok(Collector {
            locator: CacheLocator::new(config.cache_dir.clone()),
            fetcher,
        })
    }

    /// Starts a new validation run using this collector.
    pub fn start(&self) -> Run {
        Run { collector: self }
    }

    pub fn cache_dir(&self) -> &std::path::Path {
        self.locator.base()
    }
}


//------------ Run -------------------------------------------------------------

/// A single validation run's access to the cache.
///
/// Safe to share across TAL worker threads: each call either reads
/// already-cached data or drives the fetcher, which is responsible for its
/// own internal synchronization if it needs any.
#[derive(Debug)]
pub struct Run<'a> {
    collector: &'a Collector,
}

impl<'a> Run<'a> {
    /// Fetches the single trust anchor certificate at `uri`.
    ///
    /// Blocks until the download finishes or fails. On failure, logs
    /// diagnostics and returns `None`.
    fn fetch_ta(&self, uri: &TalUri) -> Option<Bytes> {
        let dest = self.collector.locator.path_for(uri);
        match self.collector.fetcher.download_alt(uri, &dest) {
            Ok(()) => fs::read(&dest).ok().map(Bytes::from),
            Err(err) => {
                warn!("Failed to fetch trust anchor at {}: {}", uri, err);
                None
            }
        }
    }

    /// Tries each of `uris` in order, stopping at the first one for which
    /// both the fetch and `visit` succeed.
    ///
    /// This is the fallback contract a TAL's candidate URI list is
    /// processed under: a URI whose bytes don't even decode is no
    /// different, from the caller's perspective, than one that never
    /// downloaded at all — both just mean "try the next one."
    pub fn download_alt<T>(
        &self,
        uris: &[crate::uri::Uri],
        mut visit: impl FnMut(&crate::uri::Uri, Bytes) -> Option<T>,
    ) -> Option<T> {
        for uri in uris {
            let bytes = match self.fetch_ta(uri.target()) {
                Some(bytes) => bytes,
                None => continue,
            };
            if let Some(result) = visit(uri, bytes) {
                return Some(result)
            }
        }
        None
    }

    /// Opens access to the repository publishing under `ca_repository`,
    /// optionally preferring the RRDP repository advertised at
    /// `rpki_notify`.
    pub fn repository(
        &self,
        ca_repository: &uri::Rsync,
        rpki_notify: Option<&uri::Https>,
    ) -> Option<Repository<'a>> {
        if let Some(notify) = rpki_notify {
            let target = TalUri::Https(notify.clone());
            let dest = self.collector.locator.path_for(&target);
            if self.collector.fetcher.update_rrdp(notify, &dest).is_ok() {
                return Some(Repository { fetcher: &*self.collector.fetcher, root: dest });
            }
            warn!(
                "RRDP repository {} unavailable. Falling back to rsync.",
                notify
            );
        }
        let target = TalUri::Rsync(ca_repository.clone());
        let dest = self.collector.locator.path_for(&target);
        match self.collector.fetcher.update_rsync(ca_repository, &dest) {
            Ok(()) => Some(Repository { fetcher: &*self.collector.fetcher, root: dest }),
            Err(err) => {
                warn!("Failed to update rsync module {}: {}", ca_repository, err);
                None
            }
        }
    }
}


//------------ Repository -------------------------------------------------------

/// Access to a single already-updated repository.
#[derive(Debug)]
pub struct Repository<'a> {
    fetcher: &'a dyn Fetcher,
    root: PathBuf,
}

impl<'a> Repository<'a> {
    /// Loads a single object out of the repository.
    ///
    /// Logs and returns `None` if the object is missing or unreadable —
    /// a missing manifest entry does not abort the whole publication
    /// point, only that one object.
    pub fn load_object(&self, uri: &uri::Rsync) -> Option<Bytes> {
        self.fetcher.read_object(&self.root, uri)
    }
}
