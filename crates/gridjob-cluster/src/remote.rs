//! HTTP transport to a gridjobd instance.
//!
//! Each call opens a TCP connection, performs an HTTP/1 handshake and sends
//! one JSON request against the `/api/v1/jobs` routes. Non-2xx responses
//! and `success: false` envelopes become [`ClusterError::Remote`].

use bytes::Bytes;
use gridjob_core::{Accumulators, Dag, DeploymentResource, ExecutionOutcome, JobConfig};
use http::{Method, Request};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{ClusterError, ClusterResult};
use crate::registry::{ClusterFuture, ClusterRegistry, Transport};
use crate::wire::{ApiResponse, job_path, job_subpath};

const USER_AGENT: &str = "gridjob-client/0.1";

/// Cluster registry reached over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteCluster {
    address: String,
}

impl RemoteCluster {
    /// `address` is `host:port` of the gridjobd API.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Send one request and decode the envelope's `data`.
    async fn call<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> ClusterResult<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = match body {
            Some(b) => serde_json::to_vec(b).map_err(|e| ClusterError::Codec(e.to_string()))?,
            None => Vec::new(),
        };

        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|e| ClusterError::Transport(format!("connect {}: {e}", self.address)))?;
        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ClusterError::Transport(format!("handshake: {e}")))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let uri = format!("http://{}{}", self.address, path);
        let req = Request::builder()
            .method(method.clone())
            .uri(&uri)
            .header("host", &self.address)
            .header("user-agent", USER_AGENT)
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from(payload)))
            .map_err(|e| ClusterError::Transport(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| ClusterError::Transport(format!("{method} {path}: {e}")))?;
        let status = resp.status();
        let bytes = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| ClusterError::Transport(e.to_string()))?
            .to_bytes();
        debug!(%method, %path, %status, len = bytes.len(), "cluster response");

        let envelope: ApiResponse<T> = match serde_json::from_slice(&bytes) {
            Ok(env) => env,
            Err(_) if !status.is_success() => {
                return Err(ClusterError::Remote {
                    status: status.as_u16(),
                    message: String::from_utf8_lossy(&bytes).into_owned(),
                });
            }
            Err(e) => return Err(ClusterError::Codec(e.to_string())),
        };

        if !status.is_success() || !envelope.success {
            return Err(ClusterError::Remote {
                status: status.as_u16(),
                message: envelope
                    .error
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string()),
            });
        }
        Ok(envelope.data)
    }

    async fn call_unit<B>(&self, method: Method, path: &str, body: Option<&B>) -> ClusterResult<()>
    where
        B: Serialize + ?Sized,
    {
        self.call::<B, serde_json::Value>(method, path, body).await?;
        Ok(())
    }

    async fn call_data<T: DeserializeOwned>(&self, method: Method, path: &str) -> ClusterResult<T> {
        self.call::<(), T>(method, path, None)
            .await?
            .ok_or_else(|| ClusterError::Codec(format!("{path}: response carried no data")))
    }
}

impl ClusterRegistry for RemoteCluster {
    fn register_job<'a>(&'a self, job: &'a str, config: &'a JobConfig) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            self.call_unit(Method::POST, &job_path(job), Some(config))
                .await
        })
    }

    fn deploy_resources<'a>(
        &'a self,
        job: &'a str,
        resources: &'a [DeploymentResource],
    ) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            self.call_unit(Method::PUT, &job_subpath(job, "resources"), Some(resources))
                .await
        })
    }

    fn submit_graph<'a>(&'a self, job: &'a str, graph: &'a Dag) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            self.call_unit(Method::PUT, &job_subpath(job, "graph"), Some(graph))
                .await
        })
    }

    fn start_execution<'a>(&'a self, job: &'a str) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            self.call_unit::<()>(Method::POST, &job_subpath(job, "execution"), None)
                .await
        })
    }

    fn await_completion<'a>(&'a self, job: &'a str) -> ClusterFuture<'a, ExecutionOutcome> {
        Box::pin(async move {
            self.call_data(Method::GET, &job_subpath(job, "execution"))
                .await
        })
    }

    fn request_interrupt<'a>(&'a self, job: &'a str) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            self.call_unit::<()>(Method::POST, &job_subpath(job, "interrupt"), None)
                .await
        })
    }

    fn destroy_job<'a>(&'a self, job: &'a str) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            self.call_unit::<()>(Method::DELETE, &job_path(job), None)
                .await
        })
    }

    fn fetch_accumulators<'a>(&'a self, job: &'a str) -> ClusterFuture<'a, Accumulators> {
        Box::pin(async move {
            self.call_data(Method::GET, &job_subpath(job, "accumulators"))
                .await
        })
    }

    fn transport(&self) -> Transport {
        Transport::Remote
    }
}
