use std::time::Duration;

use issuelink_config::{TrackerConfig, TrackerKind};
use reqwest::{
    blocking::{Client, RequestBuilder, Response},
    header::{HeaderMap, HeaderValue, ACCEPT},
    StatusCode,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::error::{TrackerError, TrackerResult};

const USER_AGENT: &str = concat!("issuelink/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthMode {
    Basic { user: String, password: String },
    Bearer { token: String },
    /// Token sent in a vendor-specific header such as `PRIVATE-TOKEN`.
    Header { name: &'static str, value: String },
}

/// Authenticated HTTP client bound to one tracker's API root.
pub struct RpcConnection {
    vendor: TrackerKind,
    api_base: String,
    http: Client,
    auth: AuthMode,
}

impl RpcConnection {
    pub fn new(
        config: &TrackerConfig,
        api_base: impl Into<String>,
        auth: AuthMode,
    ) -> TrackerResult<Self> {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .danger_accept_invalid_certs(config.insecure)
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|source| TrackerError::Transport {
                vendor: config.kind,
                resource: "HTTP client".to_string(),
                source,
            })?;

        debug!(
            tracker = %config.name,
            vendor = %config.kind,
            api_base = %api_base,
            "opened RPC connection"
        );

        Ok(Self {
            vendor: config.kind,
            api_base,
            http,
            auth,
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn auth(&self) -> &AuthMode {
        &self.auth
    }

    pub fn get<T: DeserializeOwned>(&self, path: &str, resource: &str) -> TrackerResult<T> {
        self.get_with_query(path, &[], resource)
    }

    pub fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        resource: &str,
    ) -> TrackerResult<T> {
        let request = self.http.get(self.endpoint(path)).query(query);
        let response = self.send(request, resource)?;
        self.decode(response, resource)
    }

    pub fn post<B, T>(&self, path: &str, body: &B, resource: &str) -> TrackerResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.http.post(self.endpoint(path)).json(body);
        let response = self.send(request, resource)?;
        self.decode(response, resource)
    }

    /// PUT whose response body is ignored; Redmine answers updates with `204 No Content`.
    pub fn put<B>(&self, path: &str, body: &B, resource: &str) -> TrackerResult<()>
    where
        B: Serialize + ?Sized,
    {
        let request = self.http.put(self.endpoint(path)).json(body);
        self.send(request, resource)?;
        Ok(())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn with_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            AuthMode::Basic { user, password } => request.basic_auth(user, Some(password)),
            AuthMode::Bearer { token } => request.bearer_auth(token),
            AuthMode::Header { name, value } => request.header(*name, value),
        }
    }

    fn send(&self, request: RequestBuilder, resource: &str) -> TrackerResult<Response> {
        let response = self
            .with_auth(request)
            .send()
            .map_err(|source| TrackerError::Transport {
                vendor: self.vendor,
                resource: resource.to_string(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(TrackerError::NotFound {
                vendor: self.vendor,
                resource: resource.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(TrackerError::Rejected {
                vendor: self.vendor,
                resource: resource.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    fn decode<T: DeserializeOwned>(&self, response: Response, resource: &str) -> TrackerResult<T> {
        response.json().map_err(|source| TrackerError::Decode {
            vendor: self.vendor,
            resource: resource.to_string(),
            source,
        })
    }
}
