//! Execution of `HttpRequest` values.
//!
//! The client only needs "send this request, give me the status and body".
//! Anything that can do that implements `Transport`; tests script responses,
//! hosts use `UreqTransport`.

use thiserror::Error;

use crate::http::{HttpRequest, HttpResponse};

/// The request never produced an HTTP response (DNS, connect, TLS, I/O).
#[derive(Debug, Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).execute(request)
    }
}

#[cfg(feature = "ureq")]
pub use self::ureq_transport::UreqTransport;

#[cfg(feature = "ureq")]
mod ureq_transport {
    use super::{Transport, TransportError};
    use crate::http::{HttpMethod, HttpRequest, HttpResponse};

    /// Blocking transport on a single ureq agent.
    ///
    /// Status codes are returned as data, never as `Err`, so the client's
    /// response handler sees every 4xx/5xx. The agent keeps a cookie jar,
    /// which is how cookies ride along with bearer tokens.
    #[derive(Clone)]
    pub struct UreqTransport {
        agent: ureq::Agent,
    }

    impl UreqTransport {
        pub fn new() -> Self {
            let agent = ureq::Agent::config_builder()
                .http_status_as_error(false)
                .build()
                .new_agent();
            Self { agent }
        }
    }

    impl Default for UreqTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Transport for UreqTransport {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            let result = match request.method {
                HttpMethod::Get => {
                    let mut builder = self.agent.get(&request.path);
                    for (name, value) in &request.headers {
                        builder = builder.header(name.as_str(), value.as_str());
                    }
                    builder.call()
                }
                HttpMethod::Post => {
                    let mut builder = self.agent.post(&request.path);
                    for (name, value) in &request.headers {
                        builder = builder.header(name.as_str(), value.as_str());
                    }
                    match &request.body {
                        Some(body) => builder.send(body.as_bytes()),
                        None => builder.send_empty(),
                    }
                }
            };
            let mut response = result.map_err(|e| TransportError(e.to_string()))?;

            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|value| (name.as_str().to_string(), value.to_string()))
                })
                .collect();
            let body = body_or_empty(status, response.body_mut().read_to_string());

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        }
    }

    /// The status already arrived, so an unreadable body is handled like an
    /// unparsable one and reaches the client as `{}`.
    fn body_or_empty(status: u16, read: Result<String, ureq::Error>) -> String {
        read.unwrap_or_else(|e| {
            tracing::warn!(status, error = %e, "response body could not be read, treating as empty");
            String::new()
        })
    }

}
