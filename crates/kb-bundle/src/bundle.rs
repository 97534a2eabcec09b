//! Bundle archives.
//!
//! A bundle is a zip file named `<name>-<version>.kb` holding the
//! application document at `app.yaml` and, optionally, a tarball of
//! container images at `images.tar`.

use std::fmt;
use std::io::{Cursor, Read, Write};

use kb_core::Application;
use sha2::{Digest, Sha256};
use zip::write::SimpleFileOptions;

use crate::error::{BundleError, BundleResult};

pub const APP_FILE: &str = "app.yaml";
pub const IMAGES_FILE: &str = "images.tar";
pub const BUNDLE_EXTENSION: &str = "kb";
pub const LATEST: &str = "latest";

/// Content identity of a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BundleRef {
    pub name: String,
    pub version: String,
}

impl BundleRef {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn latest(name: impl Into<String>) -> Self {
        Self::new(name, LATEST)
    }

    pub fn is_latest(&self) -> bool {
        self.version.is_empty() || self.version == LATEST
    }

    pub fn filename(&self) -> String {
        format!("{}-{}.{BUNDLE_EXTENSION}", self.name, self.version)
    }

    /// Parse `name:version` or `name` (latest).
    pub fn parse(s: &str) -> Self {
        match s.split_once(':') {
            Some((name, version)) => Self::new(name, version),
            None => Self::latest(s),
        }
    }

    /// Parse a `<name>-<version>.kb` file name where the version is semver.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let stem = filename.strip_suffix(&format!(".{BUNDLE_EXTENSION}"))?;
        // Versions may contain '-', so try each split point from the left.
        stem.match_indices('-').find_map(|(idx, _)| {
            let (name, version) = (&stem[..idx], &stem[idx + 1..]);
            semver::Version::parse(version)
                .ok()
                .map(|_| Self::new(name, version))
        })
    }
}

impl fmt::Display for BundleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// An opened bundle archive.
#[derive(Debug, Clone)]
pub struct BundleFile {
    reference: BundleRef,
    application: Application,
    bytes: Vec<u8>,
}

impl BundleFile {
    /// Parse an archive and its application document.
    pub fn open(bytes: Vec<u8>) -> BundleResult<Self> {
        let mut doc = Vec::new();
        {
            let mut archive = zip::ZipArchive::new(Cursor::new(bytes.as_slice()))?;
            archive
                .by_name(APP_FILE)
                .map_err(|e| BundleError::Archive(format!("missing {APP_FILE}: {e}")))?
                .read_to_end(&mut doc)?;
        }

        let application: Application =
            serde_yaml::from_slice(&doc).map_err(|e| BundleError::Document(e.to_string()))?;
        application
            .validate()
            .map_err(|e| BundleError::Document(e.to_string()))?;

        let reference = BundleRef::new(&application.name, &application.version);
        Ok(Self {
            reference,
            application,
            bytes,
        })
    }

    /// Assemble an archive from an application and an optional image tarball.
    pub fn build(application: &Application, images: Option<&[u8]>) -> BundleResult<Self> {
        application
            .validate()
            .map_err(|e| BundleError::Document(e.to_string()))?;
        let doc =
            serde_yaml::to_string(application).map_err(|e| BundleError::Document(e.to_string()))?;

        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        zip.start_file(APP_FILE, options)?;
        zip.write_all(doc.as_bytes())?;
        if let Some(images) = images {
            let stored = options.compression_method(zip::CompressionMethod::Stored);
            zip.start_file(IMAGES_FILE, stored)?;
            zip.write_all(images)?;
        }
        let bytes = zip.finish()?.into_inner();

        Ok(Self {
            reference: BundleRef::new(&application.name, &application.version),
            application: application.clone(),
            bytes,
        })
    }

    pub fn reference(&self) -> &BundleRef {
        &self.reference
    }

    pub fn application(&self) -> &Application {
        &self.application
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn filename(&self) -> String {
        self.reference.filename()
    }

    pub fn sha256(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }

    pub fn has_images(&self) -> bool {
        zip::ZipArchive::new(Cursor::new(self.bytes.as_slice()))
            .map(|mut archive| archive.by_name(IMAGES_FILE).is_ok())
            .unwrap_or(false)
    }

    /// The image tarball, if the bundle carries one.
    pub fn images(&self) -> BundleResult<Option<Vec<u8>>> {
        let mut archive = zip::ZipArchive::new(Cursor::new(self.bytes.as_slice()))?;
        let mut file = match archive.by_name(IMAGES_FILE) {
            Ok(file) => file,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut images = Vec::new();
        file.read_to_end(&mut images)?;
        Ok(Some(images))
    }
}
