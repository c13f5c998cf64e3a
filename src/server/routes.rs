//! Request routing, independent of the socket layer

use std::path::Path;

use serde::Serialize;
use serde_json::json;
use tracing::{error, warn};

use crate::export::{export_file_name, write_account_listing, AccountRecord};
use crate::ingest::{Document, InvoiceRequest};
use crate::server::AppState;
use crate::types::{Asiento, LedgerError, LedgerResult};

pub const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";
pub const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const JSON_CONTENT_TYPE: &str = "application/json";
const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Set when a generated asiento should be checked by hand; lists the reasons
pub const REVIEW_HEADER: &str = "X-Revision-Manual";

const ROUTES: [&str; 6] = [
    "/",
    "/health",
    "/generar_asiento",
    "/exportar_asientos",
    "/subir_factura",
    "/subir_factura_excel",
];

/// Request as seen by the router
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Split `url` into path and query string
    pub fn new(method: &str, url: &str, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        let (path, query) = match url.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (url.to_string(), None),
        };
        Self {
            method: method.to_uppercase(),
            path,
            query,
            headers,
            body,
        }
    }

    /// Header value, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Decoded query parameter
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query.as_deref()?.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            if key != name {
                return None;
            }
            urlencoding::decode(&value.replace('+', " "))
                .ok()
                .map(|v| v.into_owned())
        })
    }

    /// Uploaded file: name from `?filename=` or `X-Filename`, type from `Content-Type`
    pub fn document(&self) -> Document {
        let file_name = self
            .query_param("filename")
            .or_else(|| self.header("X-Filename").map(str::to_string))
            .unwrap_or_else(|| "upload".to_string());
        Document::new(
            file_name,
            self.header("Content-Type").map(str::to_string),
            self.body.clone(),
        )
    }
}

/// Response produced by the router
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
            body,
        }
    }

    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status, JSON_CONTENT_TYPE, body),
            Err(e) => Self::from_error(&LedgerError::Json(e)),
        }
    }

    pub fn html(body: String) -> Self {
        Self::new(200, HTML_CONTENT_TYPE, body.into_bytes())
    }

    /// File download
    pub fn attachment(content_type: &str, file_name: &str, body: Vec<u8>) -> Self {
        let mut response = Self::new(200, content_type, body);
        response.headers.push((
            "Content-Disposition".to_string(),
            format!("attachment; filename=\"{}\"", safe_file_name(file_name)),
        ));
        response
    }

    /// `{"error": message, "kind": kind}` with the given status
    pub fn error(status: u16, kind: &str, message: &str) -> Self {
        Self::json(status, &json!({ "error": message, "kind": kind }))
    }

    /// Map a ledger error to its HTTP status
    pub fn from_error(err: &LedgerError) -> Self {
        let status = status_for(err);
        if status >= 500 {
            error!(kind = err.kind(), error = %err, "request failed");
        } else {
            warn!(kind = err.kind(), error = %err, "request rejected");
        }
        Self::error(status, err.kind(), &err.to_string())
    }

    pub fn payload_too_large(limit: usize) -> Self {
        Self::error(
            413,
            "PayloadTooLarge",
            &format!("request body exceeds {limit} bytes"),
        )
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Add the review header when any asiento was flagged
    pub fn with_review(mut self, asientos: &[Asiento]) -> Self {
        let reasons: Vec<String> = asientos
            .iter()
            .filter(|asiento| asiento.needs_review())
            .map(Asiento::review_summary)
            .collect();
        if !reasons.is_empty() {
            self.headers.push((REVIEW_HEADER.to_string(), reasons.join("; ")));
        }
        self
    }
}

/// 415 for unsupported uploads, 400 for bad input, 500 otherwise
pub fn status_for(err: &LedgerError) -> u16 {
    match err {
        LedgerError::UnsupportedFileType(_) => 415,
        e if e.is_client_error() => 400,
        _ => 500,
    }
}

/// Dispatch a request to its handler
pub fn route(state: &AppState, request: &HttpRequest) -> HttpResponse {
    let result = match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/") => Ok(HttpResponse::html(index_page())),
        ("GET", "/health") => Ok(HttpResponse::json(200, &json!({ "status": "ok" }))),
        ("POST", "/generar_asiento") => generate(state, request),
        ("POST", "/exportar_asientos") => export(state, request),
        ("POST", "/subir_factura") => upload(state, request),
        ("POST", "/subir_factura_excel") => upload_listing(state, request),
        (method, path) if ROUTES.contains(&path) => Ok(HttpResponse::error(
            405,
            "MethodNotAllowed",
            &format!("{method} is not allowed on {path}"),
        )),
        (_, path) => Ok(HttpResponse::error(
            404,
            "NotFound",
            &format!("no route for {path}"),
        )),
    };

    result.unwrap_or_else(|err| HttpResponse::from_error(&err))
}

fn generate(state: &AppState, request: &HttpRequest) -> LedgerResult<HttpResponse> {
    let invoice: InvoiceRequest = serde_json::from_slice(&request.body)?;
    let line = invoice.into_line()?;
    let asiento = state.generator.generate_auto(&line)?;
    Ok(HttpResponse::json(200, &asiento).with_review(std::slice::from_ref(&asiento)))
}

/// `?cliente=&periodo=` name the download `{cliente}_{periodo}.csv`
fn csv_file_name(state: &AppState, request: &HttpRequest) -> String {
    match (request.query_param("cliente"), request.query_param("periodo")) {
        (Some(client), Some(period)) if !client.trim().is_empty() && !period.trim().is_empty() => {
            export_file_name(&client, &period)
        }
        _ => state.export_file_name.clone(),
    }
}

fn export(state: &AppState, request: &HttpRequest) -> LedgerResult<HttpResponse> {
    let asientos: Vec<Asiento> = serde_json::from_slice(&request.body)?;
    if asientos.is_empty() {
        return Err(LedgerError::Validation("no asientos to export".to_string()));
    }

    let csv = state.exporter.export(&asientos)?;
    Ok(HttpResponse::attachment(CSV_CONTENT_TYPE, &csv_file_name(state, request), csv))
}

fn uploaded(request: &HttpRequest) -> LedgerResult<Document> {
    if request.body.is_empty() {
        return Err(LedgerError::Validation("no file uploaded".to_string()));
    }
    Ok(request.document())
}

fn upload(state: &AppState, request: &HttpRequest) -> LedgerResult<HttpResponse> {
    let document = uploaded(request)?;
    let lines = state.ingestor.ingest(&document)?;
    let asientos = state.generator.generate_all(&lines)?;
    let csv = state.exporter.export(&asientos)?;
    Ok(HttpResponse::attachment(CSV_CONTENT_TYPE, &csv_file_name(state, request), csv).with_review(&asientos))
}

fn upload_listing(state: &AppState, request: &HttpRequest) -> LedgerResult<HttpResponse> {
    let document = uploaded(request)?;
    let records: Vec<AccountRecord> = state
        .ingestor
        .extract_details(&document)?
        .iter()
        .map(AccountRecord::supplier)
        .collect();
    let workbook = write_account_listing(&records)?;

    let stem = Path::new(&document.file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("factura");
    Ok(HttpResponse::attachment(
        XLSX_CONTENT_TYPE,
        &format!("salida_{stem}.xlsx"),
        workbook,
    ))
}

/// Keep letters, digits, `.`, `_` and `-`
fn safe_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "download".to_string()
    } else {
        trimmed.to_string()
    }
}

fn index_page() -> String {
    r#"<!DOCTYPE html>
<html lang="es">
<head><meta charset="utf-8"><title>IAFiscal asientos</title></head>
<body>
<h1>IAFiscal: generador de asientos PGC</h1>
<ul>
<li><code>POST /generar_asiento</code> JSON <code>{"fecha", "concepto", "importe", "tipo_iva"?, "numero_factura"?, "proveedor"?}</code> devuelve las líneas del asiento.</li>
<li><code>POST /exportar_asientos?cliente=acme&amp;periodo=2024-01</code> JSON con una lista de asientos devuelve <code>acme_2024-01.csv</code> (sin parámetros, <code>export_contasol.csv</code>).</li>
<li><code>POST /subir_factura?filename=factura.pdf</code> PDF, imagen, JSON o CSV devuelve el CSV para Contasol.</li>
<li><code>POST /subir_factura_excel?filename=factura.png</code> devuelve el listado de cuentas en Excel.</li>
<li><code>GET /health</code> estado del servicio.</li>
<li>La cabecera <code>X-Revision-Manual</code> indica asientos que conviene revisar a mano.</li>
</ul>
</body>
</html>
"#
    .to_string()
}
