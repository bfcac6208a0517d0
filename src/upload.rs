//! Upload client for the scan endpoint.
//! Sends the frozen frame as multipart field `file` (`capture.jpg`) and interprets the JSON reply.
//! A non-2xx status or a body carrying `error` is a failure; the server's message is kept verbatim.
//! One awaited request per capture: no retries, no cancellation.

use crate::results::{ScanOutcome, ScanResult};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

pub const GENERIC_SCAN_ERROR: &str = "Une erreur est survenue lors du scan.";
const UPLOAD_FIELD: &str = "file";
const UPLOAD_FILENAME: &str = "capture.jpg";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// Connection failure, timeout, or unreadable body.
    #[error("upload failed: {0}")]
    Network(String),

    /// Non-2xx reply. Holds the server's `error` string, or the generic fallback.
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// 2xx reply whose payload reports an extraction error.
    #[error("extraction error: {0}")]
    Extraction(String),
}

impl ScanError {
    pub fn user_message(&self) -> &str {
        match self {
            ScanError::Network(_) => GENERIC_SCAN_ERROR,
            ScanError::Server { message, .. } => message,
            ScanError::Extraction(message) => message,
        }
    }
}

#[async_trait]
pub trait ScanUploader {
    async fn upload(&self, jpeg: Vec<u8>) -> Result<ScanOutcome, ScanError>;
}

pub struct HttpScanUploader {
    client: Client,
    url: String,
}

impl HttpScanUploader {
    pub fn new(server_url: &str, upload_path: &str, timeout: Duration) -> Result<Self, ScanError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScanError::Network(format!("failed to create HTTP client: {}", e)))?;
        Ok(HttpScanUploader {
            client,
            url: join_url(server_url, upload_path),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[async_trait]
impl ScanUploader for HttpScanUploader {
    async fn upload(&self, jpeg: Vec<u8>) -> Result<ScanOutcome, ScanError> {
        info!(
            size_kb = (jpeg.len() + 512) / 1024,
            url = %self.url,
            "image captured, sending to server"
        );

        let part = Part::bytes(jpeg)
            .file_name(UPLOAD_FILENAME)
            .mime_str("image/jpeg")
            .map_err(|e| ScanError::Network(e.to_string()))?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                error!("failed to send image: {}", e);
                ScanError::Network(e.to_string())
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            error!("failed to read scan response: {}", e);
            ScanError::Network(e.to_string())
        })?;

        interpret_response(status, &body)
    }
}

/// Maps a raw endpoint reply to an outcome. Kept free of I/O so every branch is testable.
pub fn interpret_response(status: StatusCode, body: &str) -> Result<ScanOutcome, ScanError> {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error_field = parsed.as_ref().and_then(|v| v.get("error")).and_then(error_message);

    if !status.is_success() {
        let message = error_field.unwrap_or_else(|| GENERIC_SCAN_ERROR.to_string());
        error!(status = status.as_u16(), "scan rejected by server: {}", message);
        return Err(ScanError::Server {
            status: status.as_u16(),
            message,
        });
    }

    let raw = parsed.ok_or_else(|| {
        error!("scan response is not JSON: {}", body);
        ScanError::Network("response body is not valid JSON".to_string())
    })?;

    if let Some(message) = error_field {
        error!("extraction failed: {}", message);
        return Err(ScanError::Extraction(message));
    }

    if let Some(file) = raw.get("uploaded_file").and_then(Value::as_str) {
        return Ok(ScanOutcome::Uploaded {
            file: file.to_string(),
        });
    }

    const FIELDS: [&str; 5] = ["nom", "prenom", "licence", "annee_validite", "classement"];
    if raw.is_object() && FIELDS.iter().any(|f| raw.get(*f).is_some()) {
        let result: ScanResult = serde_json::from_value(raw.clone())
            .map_err(|e| ScanError::Network(format!("malformed scan result: {}", e)))?;
        return Ok(ScanOutcome::Extracted { result, raw });
    }

    Ok(ScanOutcome::Unexpected { raw })
}

/// Message for a truthy `error` value. Null, `false`, `0` and `""` mean no error;
/// any other non-string value is an error without readable text.
fn error_message(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        _ => Some(GENERIC_SCAN_ERROR.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_message_is_kept_verbatim() {
        let err = interpret_response(StatusCode::BAD_REQUEST, r#"{"error":"Aucun fichier n'a été envoyé"}"#)
            .unwrap_err();
        assert_eq!(err.user_message(), "Aucun fichier n'a été envoyé");
        assert!(matches!(err, ScanError::Server { status: 400, .. }));
    }

    #[test]
    fn test_server_error_without_message_uses_fallback() {
        for body in ["<html>502 Bad Gateway</html>", "{}", r#"{"error": 42}"#, ""] {
            let err = interpret_response(StatusCode::BAD_GATEWAY, body).unwrap_err();
            assert_eq!(err.user_message(), GENERIC_SCAN_ERROR, "body: {:?}", body);
        }
    }

    #[test]
    fn test_success_with_error_field_is_a_failure() {
        let err = interpret_response(
            StatusCode::OK,
            r#"{"error":"Erreur lors de l'analyse de la réponse du modèle IA.","raw_response":"..."}"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ScanError::Extraction("Erreur lors de l'analyse de la réponse du modèle IA.".to_string())
        );
    }

    #[test]
    fn test_success_with_non_string_error_is_a_failure() {
        for body in [
            r#"{"nom":"MARTIN","error":true}"#,
            r#"{"error":{"code":3,"detail":"timeout"}}"#,
            r#"{"error":["quota"]}"#,
            r#"{"error":1}"#,
        ] {
            let err = interpret_response(StatusCode::OK, body).unwrap_err();
            assert_eq!(err, ScanError::Extraction(GENERIC_SCAN_ERROR.to_string()), "body: {}", body);
        }
    }

    #[test]
    fn test_falsy_error_field_is_not_a_failure() {
        for body in [
            r#"{"nom":"MARTIN","error":null}"#,
            r#"{"nom":"MARTIN","error":false}"#,
            r#"{"nom":"MARTIN","error":""}"#,
            r#"{"nom":"MARTIN","error":0}"#,
        ] {
            let outcome = interpret_response(StatusCode::OK, body).unwrap();
            assert_eq!(outcome.extracted().and_then(|r| r.nom.as_deref()), Some("MARTIN"), "body: {}", body);
        }
    }

    #[test]
    fn test_extraction_result() {
        let outcome = interpret_response(
            StatusCode::OK,
            r#"{"nom":"MARTIN","prenom":"Léa","licence":"1234567B","annee_validite":"2025","classement":"30/1"}"#,
        )
        .unwrap();
        let result = outcome.extracted().unwrap();
        assert_eq!(result.nom.as_deref(), Some("MARTIN"));
        assert_eq!(result.classement.as_deref(), Some("30/1"));
    }

    #[test]
    fn test_upload_acknowledgment() {
        let outcome = interpret_response(StatusCode::OK, r#"{"uploaded_file":"2026-10-19_10-00-00-capture.jpg"}"#).unwrap();
        assert_eq!(
            outcome,
            ScanOutcome::Uploaded { file: "2026-10-19_10-00-00-capture.jpg".to_string() }
        );
    }

    #[test]
    fn test_unexpected_and_unparseable_success() {
        assert!(matches!(
            interpret_response(StatusCode::OK, r#"{"status":"ok"}"#),
            Ok(ScanOutcome::Unexpected { .. })
        ));
        let err = interpret_response(StatusCode::OK, "not json").unwrap_err();
        assert_eq!(err.user_message(), GENERIC_SCAN_ERROR);
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://localhost:5001/", "/scan"), "http://localhost:5001/scan");
        assert_eq!(join_url("http://localhost:5001", "scan"), "http://localhost:5001/scan");
    }

    #[tokio::test]
    #[ignore = "requires a scan server on localhost:5001"]
    async fn test_real_upload() {
        // Run with a server up: cargo test test_real_upload -- --ignored
        let uploader = HttpScanUploader::new("http://localhost:5001", "/scan", Duration::from_secs(30)).unwrap();
        let frame = image::DynamicImage::new_rgb8(64, 40);
        let frozen = crate::frame::FrozenFrame::encode(&frame, crate::frame::FrameMode::Native, 95).unwrap();
        let result = uploader.upload(frozen.jpeg).await;
        println!("Result: {:?}", result);
        assert!(result.is_ok() || matches!(result, Err(ScanError::Server { .. })));
    }
}
