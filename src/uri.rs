//! URIs as they show up in a TAL or a certificate's SIA, plus the mapping
//! from such a URI to its local cache path.
//!
//! The actual rsync/HTTPS URI types (scheme validation, path joining,
//! percent-decoding) come from `rpki::uri`; this module only adds the
//! bookkeeping the validator itself needs: which TAL a URI was reached
//! through (for diagnostics) and where the fetched bytes for it live on
//! disk.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use rpki::repository::tal::TalUri;
use rpki::uri;


//------------ Uri -------------------------------------------------------------

/// A URI as encountered while walking the RPKI tree.
///
/// Cheap to clone: the actual string data is held behind an `Arc` and
/// shared between every clone, the way a manifest's deferred children all
/// share the one string backing their parent's SIA.
#[derive(Clone, Debug)]
pub struct Uri(Arc<Inner>);

#[derive(Debug)]
struct Inner {
    target: TalUri,
    tal_name: String,
}

impl Uri {
    /// Wraps a decoded `TalUri`, recording which TAL file it came from.
    pub fn new(target: TalUri, tal_name: impl Into<String>) -> Self {
        Uri(Arc::new(Inner { target, tal_name: tal_name.into() }))
    }

    /// Returns whether this is an rsync URI.
    pub fn is_rsync(&self) -> bool {
        matches!(self.0.target, TalUri::Rsync(_))
    }

    /// Returns whether this is an HTTPS (RRDP) URI.
    pub fn is_https(&self) -> bool {
        matches!(self.0.target, TalUri::Https(_))
    }

    /// Returns the underlying `rpki` URI value.
    pub fn target(&self) -> &TalUri {
        &self.0.target
    }

    /// The name of the TAL file this URI was taken from.
    ///
    /// Used purely for diagnostics: log lines and the per-worker file
    /// stack prefix themselves with it so that a parallel run of several
    /// TALs doesn't produce interleaved, unattributable output.
    pub fn tal_name(&self) -> &str {
        &self.0.tal_name
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.0.target {
            TalUri::Rsync(uri) => uri.fmt(f),
            TalUri::Https(uri) => uri.fmt(f),
        }
    }
}

impl PartialEq for Uri {
    fn eq(&self, other: &Self) -> bool {
        self.0.target == other.0.target
    }
}

impl Eq for Uri { }


//------------ CacheLocator ------------------------------------------------------

/// Maps URIs onto stable local paths under a cache root.
///
/// Two distinct URIs with overlapping rsync modules or distinct RRDP
/// notification URIs get disjoint path prefixes, so that concurrent TAL
/// workers downloading from related but non-identical namespaces never
/// race on the same file.
#[derive(Clone, Debug)]
pub struct CacheLocator {
    base: PathBuf,
}

impl CacheLocator {
    pub fn new(base: PathBuf) -> Self {
        CacheLocator { base }
    }

    /// Returns the local path a URI's content should live at.
    pub fn path_for(&self, target: &TalUri) -> PathBuf {
        match target {
            TalUri::Rsync(uri) => {
                self.base.join("rsync")
                    .join(uri.canonical_authority().as_ref())
                    .join(uri.module_name())
                    .join(uri.path())
            }
            TalUri::Https(uri) => {
                self.base.join("rrdp")
                    .join(sanitize_authority(uri.canonical_authority().as_ref()))
            }
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

/// Strips characters that would be awkward as a path component.
fn sanitize_authority(authority: &str) -> String {
    authority.chars().map(|ch| {
        if ch.is_ascii_alphanumeric() || ch == '.' || ch == '-' {
            ch
        } else {
            '_'
        }
    }).collect()
}


//============ Testing =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn sanitize_keeps_plain_hostnames() {
        assert_eq!(sanitize_authority("rrdp.example.org"), "rrdp.example.org");
    }

    #[test]
    fn sanitize_replaces_port_colon() {
        assert_eq!(sanitize_authority("example.org:1234"), "example.org_1234");
    }

    #[test]
    fn rsync_and_https_paths_are_disjoint() {
        let loc = CacheLocator::new(PathBuf::from("/cache"));
        let rsync = uri::Rsync::from_str(
            "rsync://example.org/repo/ta.cer"
        ).unwrap();
        let https = uri::Https::from_str(
            "https://example.org/rrdp/notify.xml"
        ).unwrap();
        let a = loc.path_for(&TalUri::Rsync(rsync));
        let b = loc.path_for(&TalUri::Https(https));
        assert_ne!(a, b);
        assert!(a.starts_with("/cache/rsync"));
        assert!(b.starts_with("/cache/rrdp"));
    }
}
