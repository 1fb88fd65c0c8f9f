use std::pin::Pin;

use anyhow::{anyhow, bail};
use bytes::Bytes;
use futures_core::Stream;
use hex::FromHex;
use hyper::{Body, Client, Request, StatusCode, Uri};
use hyper::client::HttpConnector;
use hyper::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use hyper_tls::HttpsConnector;
use tracing::{debug, trace};
use url::Url;

use crate::util::validating_http_body::{ExpectedChecksum, ValidatingHttpBody};

const USER_AGENT_VALUE: &str = concat!("arti-catalog/", env!("CARGO_PKG_VERSION"));

/// A response body that is validated against the checksums announced in the response headers
///  while it is being consumed
pub struct ValidatedDownload {
    pub data: Pin<Box<dyn Stream<Item = anyhow::Result<Bytes>> + Send + 'static>>,
    pub md5: Option<[u8;16]>,
    pub sha1: Option<[u8;20]>,
}

/// Downloads files relative to a fixed base URI, checking the body's integrity against a hashcode
///  if one is returned in a header.
///
/// User info in the base URI is not sent as part of the URI but as basic authentication.
///
/// Instances do HTTP connection caching internally, so keeping them alive has performance benefits.
pub struct ValidatingHttpDownloader {
    client: Client<HttpsConnector<HttpConnector>>,
    base_uri: String, // with trailing '/', without user info
    authorization: Option<HeaderValue>,
}
impl ValidatingHttpDownloader {
    pub fn new(base_uri: &str) -> anyhow::Result<ValidatingHttpDownloader> {
        let mut url = Url::parse(base_uri)?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        let authorization = if url.username().is_empty() && url.password().is_none() {
            None
        }
        else {
            let credentials = format!("{}:{}", url.username(), url.password().unwrap_or(""));
            let value = HeaderValue::from_str(&format!("Basic {}", base64::encode(credentials)))?;
            url.set_username("").map_err(|_| anyhow!("cannot strip credentials from {}", base_uri))?;
            url.set_password(None).map_err(|_| anyhow!("cannot strip credentials from {}", base_uri))?;
            Some(value)
        };

        let base_uri = url.to_string();
        // check that hyper accepts the base URI
        Uri::try_from(base_uri.clone())?;

        Ok(ValidatingHttpDownloader {
            client: Client::builder()
                .build::<_, Body>(HttpsConnector::new()),
            base_uri,
            authorization,
        })
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    /// Returns `None` if the server responds with 404, and an error for all other non-success responses
    pub async fn get(&self, path: &str) -> anyhow::Result<Option<ValidatedDownload>> {
        let artifact_path = format!("{}{}", self.base_uri, path);
        let mut request = Request::builder()
            .method("GET")
            .uri(Uri::try_from(artifact_path.clone())?)
            // Maven Central returns a 403 without a user agent
            .header(USER_AGENT, USER_AGENT_VALUE);
        if let Some(authorization) = &self.authorization {
            request = request.header(AUTHORIZATION, authorization.clone());
        }
        let request = request.body(Body::empty())?;

        trace!("getting {}", artifact_path);

        let response = self.client.request(request)
            .await?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                debug!("{} not found", artifact_path);
                return Ok(None);
            }
            status => bail!("GET {} returned {}", artifact_path, status),
        }

        let expected_sha1 = sha1_header(response.headers())?;
        let expected_md5 = md5_header(response.headers())?;

        let checksums = expected_sha1.map(ExpectedChecksum::Sha1).into_iter()
            .chain(expected_md5.map(ExpectedChecksum::Md5));
        Ok(Some(ValidatedDownload {
            data: Box::pin(ValidatingHttpBody::new(response.into_body(), checksums)),
            md5: expected_md5,
            sha1: expected_sha1,
        }))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, names: &[&str]) -> Option<&'a str> {
    names.iter()
        .filter_map(|name| headers.get(*name))
        .find_map(|h| h.to_str().ok())
}

fn sha1_header(headers: &HeaderMap) -> anyhow::Result<Option<[u8;20]>> {
    if let Some(sha1) = header_str(headers, &["x-checksum-sha1", "x-goog-meta-checksum-sha1"]) {
        return Ok(Some(<[u8;20]>::from_hex(sha1.trim())
            .map_err(|e| anyhow!("invalid SHA1 checksum header {:?}: {}", sha1, e))?));
    }

    // some servers use the SHA1 as ETag - anything else in an ETag is no checksum
    let etag = header_str(headers, &["etag"])
        .map(|s| s.trim_start_matches("W/").trim_matches('"'));
    Ok(etag.and_then(|s| <[u8;20]>::from_hex(s).ok()))
}

fn md5_header(headers: &HeaderMap) -> anyhow::Result<Option<[u8;16]>> {
    match header_str(headers, &["x-checksum-md5", "x-goog-meta-checksum-md5"]) {
        Some(md5) => Ok(Some(<[u8;16]>::from_hex(md5.trim())
            .map_err(|e| anyhow!("invalid MD5 checksum header {:?}: {}", md5, e))?)),
        None => Ok(None),
    }
}
