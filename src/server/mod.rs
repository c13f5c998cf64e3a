//! Blocking HTTP front end over tiny_http
//!
//! Requests are served one at a time from the accept loop. Each one gets a
//! tracing span carrying a generated request id.

pub mod routes;

pub use routes::{route, status_for, HttpRequest, HttpResponse};

use std::error::Error;
use std::io::Read;

use tiny_http::{Header, Request, Response, Server};
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::export::ContasolExporter;
use crate::ingest::{Ingestor, TesseractCli};
use crate::ledger::EntryGenerator;
use crate::rules::RuleTable;
use crate::types::LedgerResult;
use crate::utils::EnhancedAsientoValidator;

/// Everything a request handler needs, built once at startup
pub struct AppState {
    pub generator: EntryGenerator,
    pub exporter: ContasolExporter,
    pub ingestor: Ingestor,
    /// Attachment name of the exported ledger file
    pub export_file_name: String,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> LedgerResult<Self> {
        let rules = match &config.rules.path {
            Some(path) => RuleTable::from_csv_path(path)?,
            None => RuleTable::pgc_default(),
        };
        info!(rules = rules.len(), custom = config.rules.path.is_some(), "classification rules loaded");

        let mut generator = EntryGenerator::new(rules)
            .with_accounts(config.ledger.accounts())
            .with_validator(Box::new(EnhancedAsientoValidator));
        if let Some(account) = &config.ledger.fallback_account {
            generator = generator.with_fallback_account(account, config.ledger.default_tax_rate.clone())?;
        }

        let recognizer = TesseractCli::new(config.ocr.command.clone(), config.ocr.language.clone());

        Ok(Self {
            generator,
            exporter: ContasolExporter::new(config.export.options.clone()),
            ingestor: Ingestor::new(Box::new(recognizer)).with_min_pdf_chars(config.ocr.min_pdf_chars),
            export_file_name: config.export.file_name.clone(),
            max_body_bytes: config.server.max_body_bytes,
        })
    }
}

/// Bind the configured address and serve until the process is stopped
pub fn serve(config: &AppConfig) -> Result<(), Box<dyn Error + Send + Sync>> {
    let state = AppState::from_config(config)?;
    let address = config.bind_address();
    let server = Server::http(&address)?;
    info!(%address, "listening");

    for mut request in server.incoming_requests() {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "request",
            id = %request_id,
            method = %request.method(),
            url = %request.url()
        );
        let _guard = span.enter();

        let response = match read_request(&mut request, state.max_body_bytes) {
            Ok(http_request) => route(&state, &http_request),
            Err(response) => response,
        };
        info!(status = response.status, bytes = response.body.len(), "response");

        if let Err(e) = request.respond(into_tiny_response(response)) {
            warn!(error = %e, "failed to send response");
        }
    }

    Ok(())
}

/// Copy method, url, headers and body out of a tiny_http request,
/// refusing bodies over `limit` bytes
fn read_request(request: &mut Request, limit: usize) -> Result<HttpRequest, HttpResponse> {
    if request.body_length().is_some_and(|len| len > limit) {
        return Err(HttpResponse::payload_too_large(limit));
    }

    let mut body = Vec::new();
    let read = request
        .as_reader()
        .take(limit as u64 + 1)
        .read_to_end(&mut body);
    if let Err(e) = read {
        warn!(error = %e, "failed to read request body");
        return Err(HttpResponse::error(400, "Io", &format!("could not read body: {e}")));
    }
    if body.len() > limit {
        return Err(HttpResponse::payload_too_large(limit));
    }

    let headers = request
        .headers()
        .iter()
        .map(|h| (h.field.to_string(), h.value.as_str().to_string()))
        .collect();

    Ok(HttpRequest::new(
        &request.method().to_string(),
        request.url(),
        headers,
        body,
    ))
}

fn into_tiny_response(response: HttpResponse) -> Response<std::io::Cursor<Vec<u8>>> {
    let mut tiny = Response::from_data(response.body).with_status_code(response.status);
    for (name, value) in &response.headers {
        match Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            Ok(header) => tiny = tiny.with_header(header),
            Err(()) => warn!(header = %name, "dropping invalid response header"),
        }
    }
    tiny
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LedgerError;

    #[test]
    fn test_state_uses_configured_fallback() {
        let mut config = AppConfig::default();
        config.ledger.fallback_account = Some("629".to_string());
        let state = AppState::from_config(&config).unwrap();

        let rule = state.generator.classify("Cena con clientes").unwrap();
        assert_eq!(rule.account_code, "629");
        assert_eq!(state.export_file_name, "export_contasol.csv");
    }

    #[test]
    fn test_state_reports_missing_rule_file() {
        let mut config = AppConfig::default();
        config.rules.path = Some("/nonexistent/reglas.csv".into());
        assert!(matches!(AppState::from_config(&config), Err(LedgerError::Io(_))));
    }

    #[test]
    fn test_tiny_response_keeps_status() {
        let response = into_tiny_response(HttpResponse::error(415, "UnsupportedFileType", "xlsx"));
        assert_eq!(response.status_code().0, 415);
    }
}
