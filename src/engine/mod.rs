//! Validation of RPKI data: turning a trust anchor locator into validated
//! payload.
//!
//! This is a from-scratch walk of the certificate tree reachable from one
//! TAL, driven by an explicit [`DeferredStack`] rather than recursion or a
//! cross-TAL work queue -- each TAL gets its own worker (see
//! `crate::dispatcher`), so there is nothing to share. The crypto/ASN.1
//! heavy lifting (decode, signature check, resource encompassment) is all
//! delegated to the external `rpki` crate; this module is the glue that
//! walks manifests, tracks visited certificates, and turns valid ROAs and
//! router certificates into [`Vrp`]s.

mod stack;

pub use self::stack::{DeferredCert, DeferredStack};

use std::collections::HashSet;
use std::sync::Arc;
use bytes::Bytes;
use log::{debug, warn};
use rpki::repository::cert::{Cert, KeyUsage, ResourceCert};
use rpki::repository::crl::Crl;
use rpki::repository::crypto::keys::KeyIdentifier;
use rpki::repository::manifest::{Manifest, ManifestContent, ManifestHash};
use rpki::repository::roa::Roa;
use rpki::repository::sigobj::SignedObject;
use rpki::repository::tal::TalUri;
use rpki::repository::x509::{Validity, ValidationError};
use rpki::uri;
use crate::collector;
use crate::config::FilterPolicy;
use crate::error::Failed;
use crate::payload::{RoaEntry, RouterKey, Table, Vrp};
use crate::tal::Tal;
use crate::utils::str_from_ascii;


//------------ Configuration ---------------------------------------------------------

/// The file stack frame used for validation-log prefixes.
type FileStack = Vec<String>;


//------------ Engine ---------------------------------------------------------------

/// The validation settings shared by all TAL workers.
#[derive(Clone, Copy, Debug)]
pub struct Engine {
    /// Whether to apply the strict variant of the RPKI profile.
    strict: bool,

    /// How to treat manifests and CRLs past their `nextUpdate`.
    stale: FilterPolicy,

    /// The maximum certificate chain depth below a trust anchor.
    max_cert_depth: u32,
}

impl Engine {
    pub fn new(strict: bool, stale: FilterPolicy, max_cert_depth: u32) -> Self {
        Engine { strict, stale, max_cert_depth }
    }

    /// Validates one TAL's reachable subtree, returning its VRPs.
    ///
    /// This is the single entry point a dispatcher worker calls: it owns
    /// everything for the duration of the call -- the `collector::Run`,
    /// the deferred stack, the visited set, and the resulting table --
    /// and shares none of it with other workers.
    ///
    /// A root-level failure (no trust anchor validates) aborts the whole
    /// TAL. Failures below the root are logged and the offending subtree
    /// is simply skipped (the containment rule: one bad subtree doesn't
    /// sink the whole trust anchor).
    pub fn validate_tal(
        &self, tal: &Tal, collector: &collector::Run,
    ) -> Result<Table, Failed> {
        let mut files = FileStack::new();
        files.push(tal.file_name().to_string());

        let root = collector.download_alt(tal.uris(), |uri, bytes| {
            self.load_root(tal, uri.target(), bytes)
        });
        let root = match root {
            Some(root) => root,
            None => {
                warn!("{}: no trust anchor certificate validated.", tal.file_name());
                return Err(Failed)
            }
        };
        debug!("{}: trust anchor validated.", tal.file_name());

        let mut table = Table::new();
        let mut visited = HashSet::new();
        let mut stack = DeferredStack::new();

        self.process_pub_point(
            collector, &root, &mut stack, &mut visited, &mut table,
            0, &mut files,
        )?;

        while let Some(entry) = stack.pop() {
            if let Err(Failed) = self.process_deferred(
                collector, entry, &mut stack, &mut visited, &mut table,
                &mut files,
            ) {
                // Containment rule: a child subtree's failure never aborts
                // the TAL, it just produces fewer VRPs than it might have.
            }
        }

        Ok(table)
    }

    /// Decodes and validates the certificate at the root URI.
    ///
    /// Returns `None` (rather than propagating a `Failed`) for anything
    /// that should simply cause `download_alt` to try the TAL's next URI.
    fn load_root(
        &self, tal: &Tal, uri: &TalUri, bytes: Bytes,
    ) -> Option<Arc<CaCert>> {
        let cert = Cert::decode(bytes).ok()?;
        if &cert.subject_public_key_info().to_info_bytes() != tal.key_info() {
            warn!("{}: trust anchor key doesn't match TAL.", uri);
            return None
        }
        let cert = cert.validate_ta(
            tal.info(), self.strict
        ).map_err(|_| {
            warn!("{}: trust anchor certificate failed to validate.", uri);
        }).ok()?;
        CaCert::root(cert, uri.clone()).ok()
    }

    /// Fetches, validates, and processes a deferred CA certificate.
    fn process_deferred(
        &self,
        collector: &collector::Run,
        entry: DeferredCert,
        stack: &mut DeferredStack,
        visited: &mut HashSet<(KeyIdentifier, Bytes)>,
        table: &mut Table,
        files: &mut FileStack,
    ) -> Result<(), Failed> {
        if entry.depth > self.max_cert_depth {
            warn!(
                "{}: certificate chain too deep, skipping subtree.",
                entry.child_uri
            );
            return Err(Failed)
        }
        let repo = match collector.repository(
            entry.parent.ca_repository(), entry.parent.rpki_notify()
        ) {
            Some(repo) => repo,
            None => return Err(Failed),
        };
        let bytes = match repo.load_object(&entry.child_uri) {
            Some(bytes) => bytes,
            None => {
                warn!("{}: failed to load.", entry.child_uri);
                return Err(Failed)
            }
        };
        let cert = Cert::decode(bytes).map_err(|_| {
            warn!("{}: failed to decode.", entry.child_uri);
            Failed
        })?;
        if entry.parent.check_loop(&cert).is_err() {
            warn!("{}: certificate loop detected.", entry.child_uri);
            return Err(Failed)
        }
        let spki = cert.subject_public_key_info().to_info_bytes();
        if !visited.insert((cert.subject_key_identifier(), spki)) {
            warn!("{}: certificate already visited, skipping.", entry.child_uri);
            return Err(Failed)
        }
        let cert = cert.validate_ca(entry.parent.cert(), self.strict).map_err(|_| {
            warn!("{}: CA certificate failed to validate.", entry.child_uri);
            Failed
        })?;
        let ca = CaCert::chain(&entry.parent, entry.child_uri, cert)?;

        files.push(ca.uri().to_string());
        let res = self.process_pub_point(
            collector, &ca, stack, visited, table, entry.depth, files,
        );
        files.pop();
        res
    }

    /// Validates the manifest of `ca`'s publication point and processes
    /// every object listed on it.
    fn process_pub_point(
        &self,
        collector: &collector::Run,
        ca: &Arc<CaCert>,
        stack: &mut DeferredStack,
        visited: &mut HashSet<(KeyIdentifier, Bytes)>,
        table: &mut Table,
        depth: u32,
        files: &mut FileStack,
    ) -> Result<(), Failed> {
        let repo = match collector.repository(ca.ca_repository(), ca.rpki_notify()) {
            Some(repo) => repo,
            None => {
                warn!("{}: repository unavailable.", ca.rpki_manifest());
                return Err(Failed)
            }
        };

        let manifest_bytes = match repo.load_object(ca.rpki_manifest()) {
            Some(bytes) => bytes,
            None => {
                warn!("{}: manifest not found.", ca.rpki_manifest());
                return Err(Failed)
            }
        };
        let manifest = self.validate_manifest(ca, manifest_bytes)?;
        let (crl_uri, crl) = self.validate_crl(ca, &manifest, &repo)?;

        for item in manifest.content.iter() {
            let (file, hash) = item.into_pair();
            let file = match str_from_ascii(&file) {
                Ok(file) => file,
                Err(_) => {
                    warn!(
                        "{}: illegal file name {} in manifest.",
                        ca.rpki_manifest(), String::from_utf8_lossy(&file)
                    );
                    continue
                }
            };
            let uri = match ca.ca_repository().join(file.as_ref()) {
                Ok(uri) => uri,
                Err(_) => {
                    warn!(
                        "{}: illegal file name {} in manifest.",
                        ca.rpki_manifest(), file
                    );
                    continue
                }
            };
            let hash = ManifestHash::new(hash, manifest.content.file_hash_alg());
            let object = match repo.load_object(&uri) {
                Some(bytes) => bytes,
                None => {
                    warn!("{}: failed to load.", uri);
                    continue
                }
            };
            if hash.verify(&object).is_err() {
                warn!("{}: file has wrong manifest hash.", uri);
                continue
            }
            self.process_object(
                ca, &uri, file, object, &crl_uri, &crl, stack, table, depth,
            );
        }
        Ok(())
    }

    /// Dispatches a single manifest-listed object by its extension.
    #[allow(clippy::too_many_arguments)]
    fn process_object(
        &self,
        ca: &Arc<CaCert>,
        uri: &uri::Rsync,
        file: &str,
        object: Bytes,
        crl_uri: &uri::Rsync,
        crl: &Crl,
        stack: &mut DeferredStack,
        table: &mut Table,
        depth: u32,
    ) {
        if file.ends_with(".cer") {
            self.process_cer(ca, uri, object, crl_uri, crl, stack, table, depth);
        }
        else if file.ends_with(".roa") {
            self.process_roa(ca, uri, object, crl_uri, crl, table);
        }
        else if file.ends_with(".crl") {
            if uri != crl_uri {
                warn!("{}: stray CRL.", uri);
            }
        }
        else if file.ends_with(".gbr") {
            self.process_gbr(ca, uri, object, crl_uri, crl);
        }
        else {
            warn!("{}: unknown object type.", uri);
        }
    }

    /// Processes a `.cer` entry: either a CA certificate, deferred for
    /// later traversal, or an end-entity (BGPsec router) certificate,
    /// processed immediately.
    #[allow(clippy::too_many_arguments)]
    fn process_cer(
        &self,
        ca: &Arc<CaCert>,
        uri: &uri::Rsync,
        object: Bytes,
        crl_uri: &uri::Rsync,
        crl: &Crl,
        stack: &mut DeferredStack,
        table: &mut Table,
        depth: u32,
    ) {
        let cert = match Cert::decode(object) {
            Ok(cert) => cert,
            Err(_) => {
                warn!("{}: failed to decode.", uri);
                return
            }
        };
        if cert.key_usage() == KeyUsage::Ca {
            stack.push(DeferredCert {
                parent: ca.clone(),
                child_uri: uri.clone(),
                depth: depth + 1,
            });
            return
        }
        if self.check_crl(uri, &cert, crl_uri, crl).is_err() {
            return
        }
        let cert = match cert.validate_router(ca.cert(), self.strict) {
            Ok(cert) => cert,
            Err(_) => {
                warn!("{}: router certificate failed to validate.", uri);
                return
            }
        };
        match router_key_from_cert(&cert) {
            Some(key) => table.insert(Vrp::RouterKey(key)),
            None => warn!("{}: router certificate carries no AS number.", uri),
        }
    }

    /// Processes a `.roa` entry.
    fn process_roa(
        &self,
        ca: &Arc<CaCert>,
        uri: &uri::Rsync,
        object: Bytes,
        crl_uri: &uri::Rsync,
        crl: &Crl,
        table: &mut Table,
    ) {
        let roa = match Roa::decode(object, self.strict) {
            Ok(roa) => roa,
            Err(_) => {
                warn!("{}: decoding failed.", uri);
                return
            }
        };
        match roa.process(ca.cert(), self.strict, |cert| {
            self.check_crl(uri, cert, crl_uri, crl)
        }) {
            Ok((_cert, route)) => {
                let asn = route.as_id();
                for addr in route.iter() {
                    table.insert(Vrp::RoaEntry(RoaEntry::from_roa(asn, addr)));
                }
            }
            Err(_) => warn!("{}: validation failed.", uri),
        }
    }

    /// Processes a `.gbr` entry: validated, logged, but not turned into a
    /// VRP (it carries no routing information).
    fn process_gbr(
        &self, ca: &Arc<CaCert>, uri: &uri::Rsync, object: Bytes,
        crl_uri: &uri::Rsync, crl: &Crl,
    ) {
        let obj = match SignedObject::decode(object, self.strict) {
            Ok(obj) => obj,
            Err(_) => {
                warn!("{}: decoding failed.", uri);
                return
            }
        };
        match obj.process(ca.cert(), self.strict, |cert| {
            self.check_crl(uri, cert, crl_uri, crl)
        }) {
            Ok(_) => debug!("{}: valid Ghostbusters Record.", uri),
            Err(_) => warn!("{}: validation failed.", uri),
        }
    }

    /// Decodes and validates a publication point's manifest.
    fn validate_manifest(
        &self, ca: &Arc<CaCert>, bytes: Bytes,
    ) -> Result<ValidManifest, Failed> {
        let manifest = Manifest::decode(bytes, self.strict).map_err(|_| {
            warn!("{}: failed to decode.", ca.rpki_manifest());
            Failed
        })?;
        let (ee_cert, content) = manifest.validate(ca.cert(), self.strict).map_err(|_| {
            warn!("{}: failed to validate.", ca.rpki_manifest());
            Failed
        })?;
        if content.is_stale() {
            match self.stale {
                FilterPolicy::Reject => {
                    warn!("{}: stale manifest.", ca.rpki_manifest());
                    return Err(Failed)
                }
                FilterPolicy::Warn => warn!("{}: stale manifest.", ca.rpki_manifest()),
                FilterPolicy::Accept => {}
            }
        }
        Ok(ValidManifest { ee_cert, content })
    }

    /// Locates, decodes, and validates the CRL referenced by a manifest's
    /// EE certificate, and confirms it hasn't revoked that EE certificate.
    fn validate_crl(
        &self, ca: &Arc<CaCert>, manifest: &ValidManifest, repo: &collector::Repository,
    ) -> Result<(uri::Rsync, Crl), Failed> {
        let crl_uri = match manifest.ee_cert.crl_uri() {
            Some(uri) if uri.ends_with(".crl") => uri.clone(),
            _ => {
                warn!("{}: invalid CRL URI.", ca.rpki_manifest());
                return Err(Failed)
            }
        };
        let crl_name = crl_uri.relative_to(ca.ca_repository()).ok_or_else(|| {
            warn!("{}: CRL URI outside repository directory.", ca.rpki_manifest());
            Failed
        })?;

        let mut crl_bytes = None;
        for item in manifest.content.iter() {
            let (file, hash) = item.into_pair();
            if file == crl_name {
                let bytes = repo.load_object(&crl_uri).ok_or_else(|| {
                    warn!("{}: failed to load.", crl_uri);
                    Failed
                })?;
                let hash = ManifestHash::new(hash, manifest.content.file_hash_alg());
                if hash.verify(&bytes).is_err() {
                    warn!("{}: file has wrong hash.", crl_uri);
                    return Err(Failed)
                }
                crl_bytes = Some(bytes);
            }
            else if file.ends_with(b".crl") {
                warn!("{}: manifest contains unexpected CRLs.", ca.rpki_manifest());
                return Err(Failed)
            }
        }
        let crl_bytes = crl_bytes.ok_or_else(|| {
            warn!("{}: CRL not listed on manifest.", ca.rpki_manifest());
            Failed
        })?;

        let crl = Crl::decode(crl_bytes).map_err(|_| {
            warn!("{}: failed to decode.", crl_uri);
            Failed
        })?;
        if crl.validate(ca.cert().subject_public_key_info()).is_err() {
            warn!("{}: failed to validate.", crl_uri);
            return Err(Failed)
        }
        if crl.is_stale() {
            match self.stale {
                FilterPolicy::Reject => {
                    warn!("{}: stale CRL.", crl_uri);
                    return Err(Failed)
                }
                FilterPolicy::Warn => warn!("{}: stale CRL.", crl_uri),
                FilterPolicy::Accept => {}
            }
        }
        if crl.contains(manifest.ee_cert.serial_number()) {
            warn!("{}: manifest EE certificate has been revoked.", ca.rpki_manifest());
            return Err(Failed)
        }
        Ok((crl_uri, crl))
    }

    /// Checks whether `cert` has been revoked by the publication point's CRL.
    fn check_crl(
        &self, uri: &uri::Rsync, cert: &Cert, crl_uri: &uri::Rsync, crl: &Crl,
    ) -> Result<(), ValidationError> {
        match cert.crl_uri() {
            Some(some) if some == crl_uri => {}
            Some(_) | None => {
                warn!("{}: certificate's CRL differs from manifest's.", uri);
                return Err(ValidationError)
            }
        }
        if crl.contains(cert.serial_number()) {
            warn!("{}: certificate has been revoked.", uri);
            return Err(ValidationError)
        }
        Ok(())
    }
}

/// Extracts the single AS number a validated BGPsec router certificate
/// carries, along with its key identifier and raw SPKI, as a [`RouterKey`].
fn router_key_from_cert(cert: &ResourceCert) -> Option<RouterKey> {
    let asn = cert.as_resources().iter().next()?;
    let mut ski = [0u8; 20];
    ski.copy_from_slice(cert.subject_key_identifier().as_ref());
    let spki = cert.subject_public_key_info().to_info_bytes();
    Some(RouterKey::new(asn, ski, spki))
}


//------------ ValidManifest ---------------------------------------------------------

/// A manifest that has decoded and validated against its CA.
struct ValidManifest {
    ee_cert: ResourceCert,
    content: ManifestContent,
}


//------------ CaCert ----------------------------------------------------------------

/// A validated CA certificate plus a link to its issuer, for loop
/// detection and combined-validity tracking.
#[derive(Debug)]
pub struct CaCert {
    /// The CA certificate itself.
    cert: ResourceCert,

    /// The certificate's own location.
    uri: TalUri,

    /// The CA repository URI (`caRepository` SIA entry).
    ca_repository: uri::Rsync,

    /// The manifest URI (`rpkiManifest` SIA entry).
    rpki_manifest: uri::Rsync,

    /// The issuing CA, or `None` for a trust anchor.
    parent: Option<Arc<CaCert>>,

    /// The combined validity of this certificate and all its parents.
    combined_validity: Validity,
}

impl CaCert {
    /// Builds a `CaCert` for a validated trust anchor certificate.
    pub fn root(cert: ResourceCert, uri: TalUri) -> Result<Arc<Self>, Failed> {
        Self::new(cert, uri, None)
    }

    /// Builds a `CaCert` for a validated, issued CA certificate.
    pub fn chain(
        issuer: &Arc<Self>, uri: uri::Rsync, cert: ResourceCert,
    ) -> Result<Arc<Self>, Failed> {
        Self::new(cert, TalUri::Rsync(uri), Some(issuer.clone()))
    }

    fn new(
        cert: ResourceCert, uri: TalUri, parent: Option<Arc<Self>>,
    ) -> Result<Arc<Self>, Failed> {
        let combined_validity = match parent.as_ref() {
            Some(ca) => cert.validity().trim(ca.combined_validity()),
            None => cert.validity(),
        };
        let ca_repository = cert.ca_repository().ok_or_else(|| {
            warn!("{}: CA certificate has no repository URI.", uri);
            Failed
        })?.clone();
        let rpki_manifest = cert.rpki_manifest().ok_or_else(|| {
            warn!("{}: CA certificate has no manifest URI.", uri);
            Failed
        })?.clone();
        Ok(Arc::new(CaCert {
            cert, uri, ca_repository, rpki_manifest, parent, combined_validity,
        }))
    }

    /// Checks whether `cert` already appears somewhere in this chain.
    pub fn check_loop(&self, cert: &Cert) -> Result<(), Failed> {
        self.check_loop_id(cert.subject_key_identifier())
    }

    fn check_loop_id(&self, key_id: KeyIdentifier) -> Result<(), Failed> {
        if self.cert.subject_key_identifier() == key_id {
            Err(Failed)
        }
        else if let Some(ref parent) = self.parent {
            parent.check_loop_id(key_id)
        }
        else {
            Ok(())
        }
    }

    pub fn cert(&self) -> &ResourceCert {
        &self.cert
    }

    pub fn uri(&self) -> &TalUri {
        &self.uri
    }

    pub fn ca_repository(&self) -> &uri::Rsync {
        &self.ca_repository
    }

    pub fn rpki_manifest(&self) -> &uri::Rsync {
        &self.rpki_manifest
    }

    pub fn rpki_notify(&self) -> Option<&uri::Https> {
        self.cert.rpki_notify()
    }

    pub fn combined_validity(&self) -> Validity {
        self.combined_validity
    }
}
