//! Object storage over plain HTTP.
//!
//! Objects live at `{base}/{section}/{release}/{file}`. Reads are `GET`,
//! writes are `PUT`. An optional `token` option is sent as a bearer token.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use crate::bundle::{BundleFile, BundleRef};
use crate::error::{BundleError, BundleResult};
use crate::source::{BundleMetadata, Source};

#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    base: String,
    token: Option<String>,
}

impl HttpSource {
    pub fn new(
        url: &str,
        section: &str,
        release: &str,
        options: BTreeMap<String, String>,
    ) -> BundleResult<Self> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(BundleError::InvalidSource(format!(
                "http source needs an http(s) url, got '{url}'"
            )));
        }
        let mut base = url.trim_end_matches('/').to_string();
        for part in [section, release] {
            if !part.is_empty() {
                base.push('/');
                base.push_str(part.trim_matches('/'));
            }
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base,
            token: options.get("token").cloned(),
        })
    }

    fn object_url(&self, file: &str) -> String {
        format!("{}/{file}", self.base)
    }

    fn request(&self, method: reqwest::Method, file: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.object_url(file));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn fetch(&self, file: &str, missing: &BundleRef) -> BundleResult<Vec<u8>> {
        let response = self.request(reqwest::Method::GET, file).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(BundleError::NotFound(missing.to_string())),
            status if !status.is_success() => Err(BundleError::Http(format!(
                "GET {} returned {status}",
                self.object_url(file)
            ))),
            _ => Ok(response.bytes().await?.to_vec()),
        }
    }

    async fn store(&self, file: &str, body: Vec<u8>) -> BundleResult<()> {
        let response = self
            .request(reqwest::Method::PUT, file)
            .body(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(BundleError::Http(format!(
                "PUT {} returned {}",
                self.object_url(file),
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Source for HttpSource {
    fn describe(&self) -> String {
        format!("http:{}", self.base)
    }

    async fn get(&self, bundle: &BundleRef) -> BundleResult<BundleFile> {
        let resolved = if bundle.is_latest() {
            let bytes = self
                .fetch(&BundleMetadata::filename(&bundle.name), bundle)
                .await?;
            let metadata: BundleMetadata = serde_json::from_slice(&bytes)
                .map_err(|e| BundleError::InvalidSource(e.to_string()))?;
            BundleRef::new(&bundle.name, metadata.latest.version)
        } else {
            bundle.clone()
        };

        debug!(url = %self.object_url(&resolved.filename()), "downloading bundle");
        let bytes = self.fetch(&resolved.filename(), &resolved).await?;
        BundleFile::open(bytes)
    }

    async fn put(&self, bundle: &BundleFile) -> BundleResult<()> {
        self.store(&bundle.filename(), bundle.bytes().to_vec()).await?;
        let metadata = serde_json::to_vec(&BundleMetadata::for_bundle(bundle))
            .map_err(|e| BundleError::InvalidSource(e.to_string()))?;
        self.store(&BundleMetadata::filename(&bundle.reference().name), metadata)
            .await?;
        debug!(bundle = %bundle.reference(), base = %self.base, "bundle uploaded");
        Ok(())
    }
}
