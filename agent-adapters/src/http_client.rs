use std::sync::Arc;
use std::time::Duration;

use hyper::body::to_bytes;
use hyper::client::HttpConnector;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use hyper::{Body, Client, Request, Uri};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::timeout;
use tracing::trace;
use webpki_roots::TLS_SERVER_ROOTS;

use crate::traits::{AdapterError, AdapterResult};

pub(crate) type HyperClient = Client<HttpsConnector<HttpConnector>, Body>;

#[allow(clippy::unnecessary_wraps)]
pub(crate) fn build_https_client() -> AdapterResult<HyperClient> {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let connector = HttpsConnector::from((http, Arc::new(config)));

    Ok(Client::builder().build::<_, Body>(connector))
}

/// One JSON round-trip shared by every adapter: encode, POST, bound by the
/// timeout, check status, decode.
pub(crate) struct JsonPost<'a> {
    pub client: &'a HyperClient,
    pub endpoint: &'a Uri,
    pub bearer: Option<&'a str>,
    pub timeout: Duration,
    pub label: &'static str,
}

impl JsonPost<'_> {
    pub(crate) async fn send<Req, Resp>(&self, payload: &Req) -> AdapterResult<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let label = self.label;
        let body = serde_json::to_vec(payload).map_err(|err| {
            AdapterError::invalid_request(format!("failed to encode {label} request: {err}"))
        })?;

        let mut builder =
            Request::post(self.endpoint.clone()).header(CONTENT_TYPE, "application/json");
        if let Some(token) = self.bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body)).map_err(|err| {
            AdapterError::transport(format!("failed to build {label} request: {err}"))
        })?;

        trace!(endpoint = %self.endpoint, "sending {label} request");
        let response = timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| AdapterError::transport(format!("{label} request timed out")))?
            .map_err(|err| AdapterError::transport(format!("{label} request failed: {err}")))?;

        let status = response.status();
        let bytes = to_bytes(response.into_body()).await.map_err(|err| {
            AdapterError::transport(format!("failed to read {label} response: {err}"))
        })?;

        if !status.is_success() {
            let reason = String::from_utf8_lossy(&bytes).to_string();
            return Err(AdapterError::Response {
                reason: format!("{label} returned {status}: {reason}"),
            });
        }

        serde_json::from_slice(&bytes).map_err(|err| AdapterError::Response {
            reason: format!("failed to decode {label} response: {err}"),
        })
    }
}

pub(crate) fn sanitize_base_url(input: &str, label: &str) -> AdapterResult<String> {
    let mut base = input.trim().to_owned();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(AdapterError::configuration(format!(
            "{label} base URL must start with http:// or https://"
        )));
    }
    if !base.ends_with('/') {
        base.push('/');
    }
    base.parse::<Uri>().map_err(|err| {
        AdapterError::configuration(format!("invalid {label} base URL: {err}"))
    })?;
    Ok(base)
}

pub(crate) fn endpoint(base_url: &str, path: &str, label: &str) -> AdapterResult<Uri> {
    format!("{base_url}{path}")
        .parse::<Uri>()
        .map_err(|err| AdapterError::configuration(format!("invalid {label} endpoint: {err}")))
}
