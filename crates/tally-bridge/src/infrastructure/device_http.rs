//! HTTP adapter for the switcher's JSON API.
//!
//! Every call is a `POST` with a JSON body.  The session token travels in a
//! plain request header (named `app` on the reference device); the login
//! request carries a fixed placeholder value in that same header.
//!
//! | operation           | default path                  | body                          |
//! |---------------------|-------------------------------|-------------------------------|
//! | login               | `/api/users/login`            | `{username, password}`        |
//! | list source groups  | `/api/source/groups/list`     | `{is_need_stream: true}`      |
//! | set preview         | `/api/preview/source/modify`  | `{from: source, to: preview}` |
//! | set program         | `/api/output/source/set`      | `{from: slot, to: slot+id}`   |
//!
//! Responses wrap their payload in a `data` field.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tally_core::{SourceGroup, StreamDescriptor};
use tracing::{debug, trace};

use crate::application::device::{AuthError, Credential, DeviceApi, DeviceError, DeviceIdentity};
use crate::infrastructure::storage::config::{DeviceConfig, EndpointPaths, OutputConfig};

/// Longest response body excerpt kept in a [`DeviceError::Status`].
const BODY_EXCERPT_LEN: usize = 256;

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Deserialize)]
struct LoginData {
    token: Option<Value>,
}

#[derive(Deserialize)]
struct WireGroup {
    #[serde(default)]
    streams: Option<Vec<WireStream>>,
}

#[derive(Deserialize)]
struct WireStream {
    id: Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    enable: Value,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    username: &'a str,
    password: &'a str,
}

impl WireStream {
    fn into_descriptor(self) -> Result<StreamDescriptor, DeviceError> {
        let id = match self.id {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            other => {
                return Err(DeviceError::MalformedResponse(format!(
                    "stream id must be a string or number, got {other}"
                )))
            }
        };
        let enabled = match self.enable {
            Value::Bool(b) => b,
            Value::Number(n) => n.as_i64() == Some(1),
            _ => false,
        };
        Ok(StreamDescriptor::new(
            id,
            self.name.unwrap_or_default(),
            self.url.unwrap_or_default(),
            enabled,
        ))
    }
}

/// Converts a groups-list response body into domain groups.
fn parse_groups(body: Envelope<Vec<WireGroup>>) -> Result<Vec<SourceGroup>, DeviceError> {
    let groups = body
        .data
        .ok_or_else(|| DeviceError::MalformedResponse("groups response has no data".into()))?;
    groups
        .into_iter()
        .map(|group| {
            group
                .streams
                .unwrap_or_default()
                .into_iter()
                .map(WireStream::into_descriptor)
                .collect::<Result<Vec<_>, _>>()
                .map(SourceGroup::new)
        })
        .collect()
}

fn preview_body(stream: &StreamDescriptor, output: &OutputConfig) -> Value {
    json!({
        "from": {
            "type": "source",
            "stream_id": stream.id,
            "stream_name": stream.name,
            "stream_url": stream.url,
            "pos_id": "",
            "output_id": output.output_id,
            "layout_id": "",
        },
        "to": {
            "type": "preview",
            "stream_id": stream.id,
            "stream_name": stream.name,
            "stream_url": stream.url,
            "output_id": output.output_id,
            "layout_id": "",
        },
    })
}

fn program_body(stream: &StreamDescriptor, output: &OutputConfig) -> Value {
    json!({
        "from": {
            "output_id": output.output_id,
            "pos_id": output.pos_id,
        },
        "to": {
            "output_id": output.output_id,
            "pos_id": output.pos_id,
            "stream_id": stream.id,
        },
    })
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_LEN).collect()
}

/// Folds a failed login round-trip into the auth taxonomy.
fn as_auth_error(err: DeviceError) -> AuthError {
    match err {
        DeviceError::Auth(auth) => auth,
        DeviceError::Transport(msg) => AuthError::Transport(msg),
        DeviceError::Timeout(after) => AuthError::Timeout(after),
        DeviceError::Status { status, .. } => AuthError::Status { status },
        DeviceError::MalformedResponse(msg) => AuthError::MalformedResponse(msg),
    }
}

// ── Adapter ───────────────────────────────────────────────────────────────────

/// [`DeviceApi`] over the switcher's HTTP API.
pub struct HttpDeviceApi {
    http: Client,
    base_url: String,
    auth_header: String,
    login_header_value: String,
    paths: EndpointPaths,
    output: OutputConfig,
    request_timeout: Duration,
}

impl HttpDeviceApi {
    /// # Errors
    ///
    /// [`DeviceError::Transport`] if the HTTP client cannot be constructed.
    pub fn new(device: &DeviceConfig, output: &OutputConfig) -> Result<Self, DeviceError> {
        let http = Client::builder()
            .timeout(device.request_timeout())
            .connect_timeout(device.connect_timeout())
            .build()
            .map_err(|e| DeviceError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: device.base_url(),
            auth_header: device.auth_header.clone(),
            login_header_value: device.login_header_value.clone(),
            paths: device.paths.clone(),
            output: output.clone(),
            request_timeout: device.request_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Sends one request and returns the body of a 2xx response.
    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        auth_value: &str,
        body: &B,
    ) -> Result<String, DeviceError> {
        let url = self.url(path);
        trace!(%url, "device request");

        let response = self
            .http
            .post(&url)
            .header(self.auth_header.as_str(), auth_value)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;
        debug!(%url, status = status.as_u16(), "device response");

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
            }
            .into());
        }
        if !status.is_success() {
            return Err(DeviceError::Status {
                status: status.as_u16(),
                body: excerpt(&text),
            });
        }
        Ok(text)
    }

    fn transport_error(&self, e: reqwest::Error) -> DeviceError {
        if e.is_timeout() {
            DeviceError::Timeout(self.request_timeout)
        } else {
            DeviceError::Transport(e.to_string())
        }
    }
}

fn decode<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T, DeviceError> {
    serde_json::from_str(text).map_err(|e| DeviceError::MalformedResponse(e.to_string()))
}

#[async_trait]
impl DeviceApi for HttpDeviceApi {
    async fn login(&self, identity: &DeviceIdentity) -> Result<Credential, AuthError> {
        let body = LoginBody {
            username: &identity.username,
            password: &identity.password,
        };
        let text = self
            .post(&self.paths.login, &self.login_header_value, &body)
            .await
            .map_err(as_auth_error)?;

        let envelope: Envelope<LoginData> = decode(&text).map_err(as_auth_error)?;
        match envelope.data.and_then(|d| d.token) {
            Some(Value::String(token)) if !token.is_empty() => Ok(Credential::new(token)),
            _ => Err(AuthError::MalformedResponse(
                "login response has no data.token string".to_string(),
            )),
        }
    }

    async fn list_source_groups(
        &self,
        credential: &Credential,
    ) -> Result<Vec<SourceGroup>, DeviceError> {
        let text = self
            .post(
                &self.paths.list_groups,
                credential.expose(),
                &json!({ "is_need_stream": true }),
            )
            .await?;
        parse_groups(decode(&text)?)
    }

    async fn set_preview(
        &self,
        credential: &Credential,
        stream: &StreamDescriptor,
    ) -> Result<(), DeviceError> {
        self.post(
            &self.paths.preview,
            credential.expose(),
            &preview_body(stream, &self.output),
        )
        .await
        .map(drop)
    }

    async fn set_program(
        &self,
        credential: &Credential,
        stream: &StreamDescriptor,
    ) -> Result<(), DeviceError> {
        self.post(
            &self.paths.output,
            credential.expose(),
            &program_body(stream, &self.output),
        )
        .await
        .map(drop)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
