//! The remote conversion service.
//!
//! [`ConversionService`] is the seam between the orchestrator and the
//! network: it takes an accepted PDF and returns the raw response, or a
//! `Network` error if no response could be obtained. Interpreting the
//! response is [`crate::resolve`]'s job, so alternative transports (tests,
//! an in-process converter) only need to produce a [`ServiceResponse`].
//!
//! [`HttpConversionService`] is the production implementation:
//!
//! ```text
//! POST {base_url}/api/convert
//! Content-Type: multipart/form-data
//!   file=<pdf bytes>; filename="invoice.pdf"; type=application/pdf
//! ```

use crate::config::ClientConfig;
use crate::error::{ConversionError, Pdf2XlsxError};
use crate::intake::FileCandidate;
use crate::resolve::ServiceResponse;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use serde::Deserialize;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Anything that can turn a PDF into a service response.
pub trait ConversionService: Send + Sync {
    /// Submit `file` and wait for the complete response.
    ///
    /// Only transport failures are errors here; a failure *status* is a
    /// successful exchange and must come back as `Ok`.
    fn submit(
        &self,
        file: &FileCandidate,
    ) -> impl Future<Output = Result<ServiceResponse, ConversionError>> + Send;
}

/// Body of a `/health` response.
#[derive(Debug, Deserialize)]
struct HealthBody {
    status: String,
}

/// `reqwest`-backed client for the conversion service.
#[derive(Debug, Clone)]
pub struct HttpConversionService {
    client: reqwest::Client,
    convert_url: Url,
    health_url: Url,
    field_name: String,
}

impl HttpConversionService {
    pub fn new(config: &ClientConfig) -> Result<Self, Pdf2XlsxError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(concat!("pdf2xlsx/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Pdf2XlsxError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            convert_url: config.convert_url()?,
            health_url: config.health_url()?,
            field_name: config.field_name.clone(),
        })
    }

    pub fn convert_url(&self) -> &Url {
        &self.convert_url
    }

    /// Probe `GET /health`; the service must answer `{"status":"ok"}`.
    pub async fn health(&self) -> Result<(), Pdf2XlsxError> {
        let url = self.health_url.to_string();
        let unhealthy = |reason: String| Pdf2XlsxError::ServiceUnhealthy {
            url: url.clone(),
            reason,
        };

        let response = self
            .client
            .get(self.health_url.clone())
            .send()
            .await
            .map_err(|e| unhealthy(e.to_string()))?;
        if !response.status().is_success() {
            return Err(unhealthy(format!("HTTP {}", response.status())));
        }
        let body: HealthBody = response
            .json()
            .await
            .map_err(|e| unhealthy(format!("unexpected body: {e}")))?;
        if body.status != "ok" {
            return Err(unhealthy(format!("status '{}'", body.status)));
        }
        debug!("Conversion service at {} is healthy", url);
        Ok(())
    }
}

impl ConversionService for HttpConversionService {
    async fn submit(&self, file: &FileCandidate) -> Result<ServiceResponse, ConversionError> {
        let start = Instant::now();
        info!(
            "Uploading '{}' ({} bytes) to {}",
            file.name(),
            file.size_bytes(),
            self.convert_url
        );

        let part = Part::bytes(file.content().to_vec())
            .file_name(file.name().to_string())
            .mime_str(file.mime_type())?;
        let form = Form::new().part(self.field_name.clone(), part);

        let response = self
            .client
            .post(self.convert_url.clone())
            .multipart(form)
            .send()
            .await?;

        let status = response.status().as_u16();
        let content_disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        debug!(
            "Service answered HTTP {} with {} bytes in {}ms (disposition: {:?})",
            status,
            body.len(),
            start.elapsed().as_millis(),
            content_disposition
        );

        Ok(ServiceResponse {
            status,
            content_disposition,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_uses_configured_endpoints() {
        let config = ClientConfig::builder()
            .base_url("http://converter.internal:5000")
            .build()
            .unwrap();
        let svc = HttpConversionService::new(&config).unwrap();
        assert_eq!(
            svc.convert_url().as_str(),
            "http://converter.internal:5000/api/convert"
        );
        assert_eq!(svc.health_url.as_str(), "http://converter.internal:5000/health");
        assert_eq!(svc.field_name, "file");
    }
}
