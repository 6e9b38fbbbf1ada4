//! Typed client for the VMM control API, spoken as HTTP/1.1 over a Unix socket.

use std::path::{Path, PathBuf};
use std::time::Duration;

use hyper::body::Bytes;
use hyper::{Body, Client, Method, Request, StatusCode};
use hyperlocal::{UnixClientExt, UnixConnector, Uri as UnixUri};
use serde::de::DeserializeOwned;
use vmlite_shared::api::{PingResponse, VmInfo, endpoints};
use vmlite_shared::errors::{VmliteError, VmliteResult};

/// One control operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiRequest {
    Ping,
    Info,
    Pause,
    Resume,
    Reboot,
    /// Shut the guest down; the VMM process keeps running.
    Shutdown,
    /// Terminate the VMM process itself.
    ShutdownVmm,
}

impl ApiRequest {
    pub fn method(&self) -> Method {
        match self {
            ApiRequest::Ping | ApiRequest::Info => Method::GET,
            _ => Method::PUT,
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            ApiRequest::Ping => endpoints::VMM_PING,
            ApiRequest::Info => endpoints::VM_INFO,
            ApiRequest::Pause => endpoints::VM_PAUSE,
            ApiRequest::Resume => endpoints::VM_RESUME,
            ApiRequest::Reboot => endpoints::VM_REBOOT,
            ApiRequest::Shutdown => endpoints::VM_SHUTDOWN,
            ApiRequest::ShutdownVmm => endpoints::VMM_SHUTDOWN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Client bound to one API socket.
///
/// Every call is bounded by the configured timeout. A missing socket, or one
/// nobody is listening on, is [`VmliteError::NotRunning`]; a timeout or a
/// non-2xx status is [`VmliteError::Api`].
#[derive(Clone)]
pub struct ApiClient {
    socket: PathBuf,
    timeout: Duration,
    client: Client<UnixConnector>,
}

impl ApiClient {
    pub fn new(socket: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            socket: socket.into(),
            timeout,
            client: Client::unix(),
        }
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    pub async fn send(&self, request: ApiRequest) -> VmliteResult<ApiResponse> {
        let method = request.method();
        let path = request.path();

        if !self.socket.exists() {
            return Err(VmliteError::NotRunning(format!(
                "API socket {} does not exist",
                self.socket.display()
            )));
        }

        let uri: hyper::Uri = UnixUri::new(&self.socket, path).into();
        let req = Request::builder()
            .method(method.clone())
            .uri(uri)
            .header("Accept", "application/json")
            .body(Body::empty())
            .map_err(|e| VmliteError::Internal(format!("failed to build request: {}", e)))?;

        tracing::debug!(%method, path, "API request");

        let exchange = async {
            let response = self.client.request(req).await.map_err(|e| {
                if e.is_connect() {
                    VmliteError::NotRunning(format!(
                        "cannot connect to {}: {}",
                        self.socket.display(),
                        e
                    ))
                } else {
                    VmliteError::Api(format!("{} {} failed: {}", method, path, e))
                }
            })?;
            let status = response.status();
            let body = hyper::body::to_bytes(response.into_body())
                .await
                .map_err(|e| {
                    VmliteError::Api(format!("{} {} body read failed: {}", method, path, e))
                })?;
            Ok::<_, VmliteError>(ApiResponse { status, body })
        };

        let response = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| {
                VmliteError::Api(format!(
                    "{} {} timed out after {:?}",
                    method, path, self.timeout
                ))
            })??;

        if !response.status.is_success() {
            return Err(VmliteError::Api(format!(
                "{} {} returned {}: {}",
                method,
                path,
                response.status.as_u16(),
                String::from_utf8_lossy(&response.body).trim()
            )));
        }

        tracing::debug!(%method, path, status = response.status.as_u16(), "API response");
        Ok(response)
    }

    pub async fn ping(&self) -> VmliteResult<PingResponse> {
        self.send_json(ApiRequest::Ping).await
    }

    pub async fn info(&self) -> VmliteResult<VmInfo> {
        self.send_json(ApiRequest::Info).await
    }

    pub async fn pause(&self) -> VmliteResult<()> {
        self.send(ApiRequest::Pause).await.map(|_| ())
    }

    pub async fn resume(&self) -> VmliteResult<()> {
        self.send(ApiRequest::Resume).await.map(|_| ())
    }

    pub async fn reboot(&self) -> VmliteResult<()> {
        self.send(ApiRequest::Reboot).await.map(|_| ())
    }

    pub async fn shutdown(&self) -> VmliteResult<()> {
        self.send(ApiRequest::Shutdown).await.map(|_| ())
    }

    pub async fn shutdown_vmm(&self) -> VmliteResult<()> {
        self.send(ApiRequest::ShutdownVmm).await.map(|_| ())
    }

    async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> VmliteResult<T> {
        let response = self.send(request).await?;
        serde_json::from_slice(&response.body).map_err(|e| {
            VmliteError::Api(format!(
                "{} {} returned an unexpected body: {}",
                request.method(),
                request.path(),
                e
            ))
        })
    }
}
