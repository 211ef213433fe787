//! The transport boundary between the collector and the outside world.
//!
//! Actually speaking rsync or RRDP-over-HTTPS is somebody else's problem:
//! a production deployment plugs in a [`Fetcher`] backed by a real rsync
//! client and an RRDP HTTP client. What lives here is the seam itself,
//! named after FORT's `cache_download_alt`, plus a [`LocalFetcher`] that
//! treats the cache directory as already populated — useful for tests and
//! for operators who mirror repositories out-of-band.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use bytes::Bytes;
use rpki::repository::tal::TalUri;
use rpki::uri;
use crate::error::Error;


//------------ Fetcher -----------------------------------------------------------

/// Something that can populate the local cache from a remote repository.
pub trait Fetcher: fmt::Debug + Send + Sync {
    /// Fetches a single trust anchor certificate to `dest`.
    ///
    /// Named after the one-shot download FORT-validator's TAL parser
    /// performs for each candidate URI before giving up on it.
    fn download_alt(&self, uri: &TalUri, dest: &Path) -> Result<(), Error>;

    /// Brings the rsync module backing `uri` up to date under `dest`.
    fn update_rsync(&self, uri: &uri::Rsync, dest: &Path) -> Result<(), Error>;

    /// Brings the RRDP repository at `notify` up to date under `dest`.
    fn update_rrdp(&self, notify: &uri::Https, dest: &Path) -> Result<(), Error>;

    /// Reads a single object out of an already-updated repository root.
    fn read_object(&self, root: &Path, uri: &uri::Rsync) -> Option<Bytes>;
}


//------------ NullTransport -------------------------------------------------------

/// A fetcher that never succeeds.
///
/// Stands in for "no transport configured" (offline mode, or a disabled
/// rsync/RRDP pair): every operation reports failure so callers exercise
/// their fallback paths instead of silently doing nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullTransport;

impl Fetcher for NullTransport {
    fn download_alt(&self, uri: &TalUri, _dest: &Path) -> Result<(), Error> {
        Err(Error::Fetch(format!("{}: no transport configured", uri)))
    }

    fn update_rsync(&self, uri: &uri::Rsync, _dest: &Path) -> Result<(), Error> {
        Err(Error::Fetch(format!("{}: no transport configured", uri)))
    }

    fn update_rrdp(&self, notify: &uri::Https, _dest: &Path) -> Result<(), Error> {
        Err(Error::Fetch(format!("{}: no transport configured", notify)))
    }

    fn read_object(&self, _root: &Path, _uri: &uri::Rsync) -> Option<Bytes> {
        None
    }
}


//------------ LocalFetcher -------------------------------------------------------

/// A fetcher that never talks to the network.
///
/// Every operation assumes the cache directory already holds current data
/// — mirrored there by an external rsync/RRDP client, or left over from a
/// previous run — and simply fails if the expected file isn't there.
#[derive(Debug)]
pub struct LocalFetcher {
    #[allow(dead_code)]
    cache_dir: PathBuf,
}

impl LocalFetcher {
    pub fn new(cache_dir: PathBuf) -> Self {
        LocalFetcher { cache_dir }
    }
}

impl Fetcher for LocalFetcher {
    fn download_alt(&self, _uri: &TalUri, dest: &Path) -> Result<(), Error> {
        if dest.exists() {
            Ok(())
        } else {
            Err(Error::Fetch(format!(
                "{} not present in local cache", dest.display()
            )))
        }
    }

    fn update_rsync(&self, _uri: &uri::Rsync, dest: &Path) -> Result<(), Error> {
        if dest.exists() {
            Ok(())
        } else {
            fs::create_dir_all(dest).map_err(Error::from)
        }
    }

    fn update_rrdp(&self, _notify: &uri::Https, dest: &Path) -> Result<(), Error> {
        if dest.exists() {
            Ok(())
        } else {
            fs::create_dir_all(dest).map_err(Error::from)
        }
    }

    fn read_object(&self, root: &Path, uri: &uri::Rsync) -> Option<Bytes> {
        let path = root.join(uri.path());
        fs::read(path).ok().map(Bytes::from)
    }
}


//============ Testing ==========================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn download_alt_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = LocalFetcher::new(dir.path().to_path_buf());
        let uri = TalUri::Rsync(
            uri::Rsync::from_str("rsync://example.org/repo/ta.cer").unwrap()
        );
        let dest = dir.path().join("ta.cer");
        assert!(fetcher.download_alt(&uri, &dest).is_err());
        fs::write(&dest, b"cert bytes").unwrap();
        assert!(fetcher.download_alt(&uri, &dest).is_ok());
    }

    #[test]
    fn read_object_resolves_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let module_dir = dir.path().join("repo");
        fs::create_dir_all(&module_dir).unwrap();
        fs::write(module_dir.join("child.cer"), b"data").unwrap();
        let fetcher = LocalFetcher::new(dir.path().to_path_buf());
        let uri = uri::Rsync::from_str(
            "rsync://example.org/repo/child.cer"
        ).unwrap();
        let data = fetcher.read_object(dir.path(), &uri);
        assert_eq!(data.as_deref(), Some(&b"data"[..]));
    }

    #[test]
    fn null_transport_always_fails() {
        let fetcher = NullTransport;
        let uri = TalUri::Rsync(
            uri::Rsync::from_str("rsync://example.org/repo/ta.cer").unwrap()
        );
        assert!(fetcher.download_alt(&uri, Path::new("/tmp/x")).is_err());
        assert!(fetcher.read_object(Path::new("/tmp"), &uri::Rsync::from_str(
            "rsync://example.org/repo/ta.cer"
        ).unwrap()).is_none());
    }
}
