use std::error::Error;

use log::{debug, error};
use reqwest::{Method, Response};
use reqwest_middleware::ClientWithMiddleware;
use serde::Serialize;

use crate::error::{ApiError, Result};

/// Sends a request through `client`, logging timing and transport failures.
///
/// The returned response may carry any status; mapping non-2xx responses is
/// left to the caller.
pub async fn execute_request<T: Serialize + ?Sized>(
    client: &ClientWithMiddleware,
    method: Method,
    url: &str,
    json_body: Option<&T>,
) -> Result<Response> {
    let mut request_builder = client.request(method.clone(), url);
    if let Some(body) = json_body {
        request_builder = request_builder.json(body);
    }

    debug!("Sending {} request to {}", method, url);
    let start_time = std::time::Instant::now();

    match request_builder.send().await {
        Ok(resp) => {
            debug!(
                "Got response from {} after {:?} with status {}",
                url,
                start_time.elapsed(),
                resp.status()
            );
            Ok(resp)
        }
        Err(e) => {
            let err = ApiError::from(e);
            // Refresh failures are already logged by the middleware.
            if let ApiError::Transport(inner) = &err {
                log_transport_error(method.as_str(), url, inner);
            }
            Err(err)
        }
    }
}

fn log_transport_error(method: &str, url: &str, e: &reqwest_middleware::Error) {
    error!("Failed HTTP {} request to {}: {}", method, url, e);
    if let Some(source) = e.source() {
        error!("Error source: {:?}", source);
    }

    if let reqwest_middleware::Error::Reqwest(e) = e {
        if e.is_timeout() {
            error!("Request timed out");
        }
        if e.is_connect() {
            error!("Connection error");
        }
        if e.is_body() {
            error!("Body error");
        }
        if e.is_decode() {
            error!("Decode error");
        }
    }
}

/// Turns a non-2xx response into [`ApiError::Status`].
pub async fn ensure_success(response: Response) -> Result<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(ApiError::from_response(response).await)
    }
}
