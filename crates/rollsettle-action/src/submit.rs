//! Job submission over HTTP.
//!
//! POSTs a rendered [`JobPayload`] to the external task runner. Submission
//! is time-bounded; the caller treats any failure as fire-and-forget (logged,
//! not retried).

use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use http_body_util::Full;
use hyper_util::rt::TokioIo;
use tracing::debug;

use crate::job::JobPayload;

/// Submit a job payload to the task runner endpoint.
///
/// `endpoint` is a full URL such as `http://task-runner:9090/v1/jobs`.
/// Returns an error for connection failures, non-2xx responses, and
/// timeouts; the payload is never resubmitted by this function.
pub async fn submit_job(
    endpoint: &str,
    payload: &JobPayload,
    timeout: Duration,
) -> anyhow::Result<()> {
    let uri: http::Uri = endpoint.parse().context("invalid task runner endpoint")?;
    let authority = uri
        .authority()
        .context("task runner endpoint has no host")?
        .clone();
    let address = match authority.port_u16() {
        Some(port) => format!("{}:{port}", authority.host()),
        None => format!("{}:80", authority.host()),
    };
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let body = serde_json::to_vec(payload).context("serializing job payload")?;

    let submission = async {
        let stream = tokio::net::TcpStream::connect(&address)
            .await
            .context("connecting to task runner")?;

        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .context("task runner handshake")?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let request = http::Request::builder()
            .method("POST")
            .uri(&path)
            .header("host", authority.as_str())
            .header("content-type", "application/json")
            .header("user-agent", "rollsettle-action/0.1")
            .body(Full::new(Bytes::from(body)))
            .context("building job request")?;

        let response = sender
            .send_request(request)
            .await
            .context("sending job request")?;

        anyhow::ensure!(
            response.status().is_success(),
            "task runner returned {}",
            response.status()
        );
        debug!(job = %payload.name, status = %response.status(), "job submitted");
        Ok(())
    };

    tokio::time::timeout(timeout, submission)
        .await
        .context("job submission timed out")?
}
