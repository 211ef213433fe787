//! Trust Anchor Locators.
//!
//! A TAL is a tiny text file: a handful of comment lines, an ordered list
//! of URIs to try the trust anchor certificate at, a blank line, and a
//! base64-encoded SubjectPublicKeyInfo spanning the rest of the file. The
//! format is bit-exact (RFC 8630) and is reproduced here rather than
//! farmed out to the crypto crate, because validating *this* shape is
//! squarely the relying party's own job.

use std::fs::{read_dir, DirEntry, File, ReadDir};
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use base64::Engine;
use bytes::Bytes;
use log::debug;
use rpki::repository::tal::{TalInfo, TalUri};
use crate::uri::Uri;


//------------ Tal -------------------------------------------------------------

/// A parsed Trust Anchor Locator.
#[derive(Clone, Debug)]
pub struct Tal {
    /// The base name of the file the TAL was read from.
    ///
    /// Used for diagnostics (the per-worker file stack) and as the
    /// dispatcher's label for this TAL's worker thread.
    file_name: String,

    /// The URIs to try, in file order.
    uris: Vec<Uri>,

    /// The decoded (but not parsed) SubjectPublicKeyInfo.
    ///
    /// Whether this is actually a well-formed SPKI is the traversal
    /// engine's problem: it gets compared byte-for-byte against the root
    /// certificate's own SPKI.
    key_info: Bytes,
}

impl Tal {
    /// Returns the TAL's file name.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Returns the ordered list of candidate URIs.
    pub fn uris(&self) -> &[Uri] {
        &self.uris
    }

    /// Returns the decoded SubjectPublicKeyInfo bytes.
    pub fn key_info(&self) -> &Bytes {
        &self.key_info
    }

    /// Builds the `TalInfo` the external crate's `validate_ta` wants,
    /// identifying this TAL by its file name.
    pub fn info(&self) -> Arc<TalInfo> {
        TalInfo::from_name(self.file_name.clone()).into_arc()
    }

    /// Reads and parses a single TAL file.
    pub fn read<R: Read>(
        file_name: impl Into<String>, reader: &mut R,
    ) -> Result<Self, ReadError> {
        let file_name = file_name.into();
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        let mut data = data.as_slice();

        // Comment section: zero or more lines starting with '#'.
        while data.first() == Some(&b'#') {
            data = Self::skip_line(data)?;
        }

        // URI section: one URI per line up to the first blank line.
        let mut uris = Vec::new();
        loop {
            let (line, rest) = Self::take_line(data)?;
            if line.is_empty() {
                data = rest;
                break;
            }
            uris.push(Self::parse_uri(&file_name, line)?);
            data = rest;
        }
        if uris.is_empty() {
            return Err(ReadError::EmptyUriList);
        }

        // subjectPublicKeyInfo section: base64, whitespace-insensitive,
        // spanning the remainder of the file.
        if data.iter().all(u8::is_ascii_whitespace) {
            return Err(ReadError::UnexpectedEof);
        }
        let mut cleaned = Vec::with_capacity(data.len());
        cleaned.extend(data.iter().copied().filter(|b| !b.is_ascii_whitespace()));
        let key_info = base64::engine::general_purpose::STANDARD
            .decode(&cleaned)
            .map_err(ReadError::BadKeyInfoEncoding)?;

        Ok(Tal { file_name, uris, key_info: Bytes::from(key_info) })
    }

    /// Parses one URI line, rejecting anything but rsync/https schemes.
    fn parse_uri(file_name: &str, line: &[u8]) -> Result<Uri, ReadError> {
        let text = std::str::from_utf8(line)
            .map_err(|_| ReadError::BadUri(String::from_utf8_lossy(line).into_owned()))?;
        if let Ok(uri) = rpki::uri::Rsync::from_str(text) {
            return Ok(Uri::new(TalUri::Rsync(uri), file_name));
        }
        if let Ok(uri) = rpki::uri::Https::from_str(text) {
            return Ok(Uri::new(TalUri::Https(uri), file_name));
        }
        Err(ReadError::BadUri(text.into()))
    }

    /// Splits off the next `\n`- or `\r\n`-terminated line.
    ///
    /// Returns `Err(UnexpectedEof)` if there is no more data at all —
    /// the TAL ended before the blank separator or the key material.
    fn take_line(data: &[u8]) -> Result<(&[u8], &[u8]), ReadError> {
        if data.is_empty() {
            return Err(ReadError::UnexpectedEof);
        }
        match data.iter().position(|&b| b == b'\n') {
            Some(idx) => {
                let mut line = &data[..idx];
                if line.last() == Some(&b'\r') {
                    line = &line[..line.len() - 1];
                }
                Ok((line, &data[idx + 1..]))
            }
            None => Err(ReadError::UnexpectedEof),
        }
    }

    /// Skips a single line, discarding its content (used for comments).
    fn skip_line(data: &[u8]) -> Result<&[u8], ReadError> {
        Self::take_line(data).map(|(_, rest)| rest)
    }

    /// Reads every `.tal` file directly under `path`.
    pub fn read_dir<P: AsRef<Path>>(path: P) -> Result<TalIter, io::Error> {
        read_dir(path).map(TalIter)
    }
}


//------------ TalIter -----------------------------------------------------------

/// An iterator over the TALs in a directory.
///
/// Entries that aren't regular `.tal` files are silently skipped; entries
/// that are `.tal` files but fail to parse are surfaced as an error and
/// terminate the directory scan there (matching Routinator's `TalIter`).
pub struct TalIter(ReadDir);

impl Iterator for TalIter {
    type Item = Result<Tal, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.0.next() {
                Some(Ok(entry)) => match next_entry(entry) {
                    Ok(Some(tal)) => return Some(Ok(tal)),
                    Ok(None) => continue,
                    Err(err) => return Some(Err(err)),
                },
                Some(Err(err)) => return Some(Err(err.into())),
                None => return None,
            }
        }
    }
}

fn next_entry(entry: DirEntry) -> Result<Option<Tal>, ReadError> {
    let path = entry.path();
    if entry.file_type()?.is_dir() {
        return Ok(None);
    }
    if path.extension().and_then(|ext| ext.to_str()) != Some("tal") {
        return Ok(None);
    }
    let file_name = file_name_of(&path);
    debug!("Processing TAL {}", path.display());
    Tal::read(file_name, &mut File::open(&path)?).map(Some)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}


//------------ ReadError -------------------------------------------------------

/// Everything that can go wrong parsing a TAL.
#[derive(Debug)]
pub enum ReadError {
    Io(io::Error),
    UnexpectedEof,
    EmptyUriList,
    BadUri(String),
    BadKeyInfoEncoding(base64::DecodeError),
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ReadError::Io(err) => write!(f, "{}", err),
            ReadError::UnexpectedEof => {
                write!(f, "the TAL seems to end prematurely")
            }
            ReadError::EmptyUriList => {
                write!(f, "the TAL contains no URIs")
            }
            ReadError::BadUri(uri) => {
                write!(f, "bad trust anchor URI: {}", uri)
            }
            ReadError::BadKeyInfoEncoding(err) => {
                write!(f, "bad key info: {}", err)
            }
        }
    }
}

impl std::error::Error for ReadError { }

impl From<io::Error> for ReadError {
    fn from(err: io::Error) -> ReadError {
        ReadError::Io(err)
    }
}


//============ Testing ==========================================================

#[cfg(test)]
mod test {
    use super::*;

    fn sample(uris: &str, spki: &str) -> String {
        format!("# a comment\n{}\n\n{}", uris, spki)
    }

    #[test]
    fn happy_path() {
        let spki = "A".repeat(288);
        let content = sample(
            "rsync://example.org/repo/ta.cer\nhttps://example.org/rrdp/ta.cer",
            &spki,
        );
        let tal = Tal::read("sample.tal", &mut content.as_bytes()).unwrap();
        assert_eq!(tal.file_name(), "sample.tal");
        assert_eq!(tal.uris().len(), 2);
        assert!(tal.uris()[0].is_rsync());
        assert!(tal.uris()[1].is_https());
    }

    #[test]
    fn missing_spki_is_premature_eof() {
        let content = "rsync://example.org/repo/ta.cer\n\n";
        let err = Tal::read("sample.tal", &mut content.as_bytes()).unwrap_err();
        assert!(matches!(err, ReadError::UnexpectedEof));
    }

    #[test]
    fn empty_uri_list_is_rejected() {
        let content = "\nAAAA\n";
        let err = Tal::read("sample.tal", &mut content.as_bytes()).unwrap_err();
        assert!(matches!(err, ReadError::EmptyUriList));
    }

    #[test]
    fn bad_scheme_is_rejected() {
        let content = "ftp://example.org/ta.cer\n\nAAAA\n";
        let err = Tal::read("sample.tal", &mut content.as_bytes()).unwrap_err();
        assert!(matches!(err, ReadError::BadUri(_)));
    }

    #[test]
    fn no_blank_line_is_premature_eof() {
        // File ends mid-URI-section without ever reaching a blank line.
        let content = "rsync://example.org/repo/ta.cer";
        let err = Tal::read("sample.tal", &mut content.as_bytes()).unwrap_err();
        assert!(matches!(err, ReadError::UnexpectedEof));
    }
}
