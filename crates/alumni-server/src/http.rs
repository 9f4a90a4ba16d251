use std::collections::HashMap;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::{Method, StatusCode, Uri};
use percent_encoding::percent_decode_str;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::{Error, Result};

pub type Response = hyper::Response<Full<Bytes>>;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// A fully buffered request, decoupled from the connection it arrived on.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Request {
    pub fn new(method: Method, uri: &Uri, headers: HeaderMap, body: Bytes) -> Self {
        let query = uri
            .query()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();

        Self {
            method,
            path: uri.path().to_string(),
            query,
            headers,
            body,
        }
    }

    /// Non-empty query parameter.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|_| Error::BadRequest("Corps de requête JSON invalide".to_string()))
    }

    /// Body as a JSON value; an empty body reads as `{}`.
    pub fn json_value(&self) -> Result<Value> {
        if self.body.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(json!({}));
        }
        self.json()
    }
}

pub fn decode_path_segment(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

pub fn response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response {
    let mut resp = hyper::Response::new(Full::new(body.into()));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    resp
}

pub fn json_response(status: StatusCode, body: &Value) -> Response {
    response(status, "application/json", body.to_string())
}

pub fn empty_response(status: StatusCode) -> Response {
    let mut resp = hyper::Response::new(Full::new(Bytes::new()));
    *resp.status_mut() = status;
    resp
}

pub fn success(data: Value) -> Response {
    json_response(StatusCode::OK, &json!({ "status": "success", "data": data }))
}

pub fn created(data: Value) -> Response {
    json_response(StatusCode::CREATED, &json!({ "status": "success", "data": data }))
}

pub fn success_message(message: &str) -> Response {
    json_response(StatusCode::OK, &json!({ "status": "success", "message": message }))
}

pub fn success_message_with_data(message: &str, data: Value) -> Response {
    json_response(
        StatusCode::OK,
        &json!({ "status": "success", "message": message, "data": data }),
    )
}

pub fn error_response(err: &Error) -> Response {
    if err.is_internal() {
        tracing::error!(error = %err, "request failed");
    } else if let Error::Upstream(msg) = err {
        tracing::warn!(error = %msg, "upstream failure");
    }

    let mut body = json!({ "status": "error", "message": err.public_message() });
    if let Some(issues) = err.issues() {
        body["issues"] = json!(issues);
    }
    json_response(err.status(), &body)
}

pub fn not_found() -> Response {
    json_response(
        StatusCode::NOT_FOUND,
        &json!({ "status": "error", "message": "Route introuvable" }),
    )
}

pub fn csv_attachment(filename: &str, body: Vec<u8>) -> Response {
    let mut resp = response(StatusCode::OK, "text/csv; charset=utf-8", body);
    let disposition = format!("attachment; filename=\"{filename}\"");
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        resp.headers_mut().insert(header::CONTENT_DISPOSITION, value);
    }
    resp
}

pub fn set_header(resp: &mut Response, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        resp.headers_mut().append(name, value);
    }
}

/// Allow the configured frontend origin, with credentials.
pub fn with_cors(mut resp: Response, origin: &str) -> Response {
    set_header(&mut resp, header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    let headers = resp.headers_mut();
    headers.insert(header::VARY, HeaderValue::from_static("Origin"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET,POST,PUT,PATCH,DELETE,OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Authorization,Content-Type,Accept,X-Requested-With"),
    );
    resp
}

/// Extract the `ids` array of a bulk request. Non-string items are dropped.
pub fn bulk_ids(body: &Value) -> Result<Vec<String>> {
    match body.get("ids").and_then(Value::as_array) {
        Some(items) if !items.is_empty() => Ok(items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()),
        _ => Err(Error::BadRequest(
            "Le champ \"ids\" doit être un tableau non vide".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_query_and_path() {
        let uri: Uri = "/alumni?search=marie%20c&page=2&city=".parse().unwrap();
        let req = Request::new(Method::GET, &uri, HeaderMap::new(), Bytes::new());

        assert_eq!(req.path, "/alumni");
        assert_eq!(req.query("search"), Some("marie c"));
        assert_eq!(req.query("page"), Some("2"));
        assert_eq!(req.query("city"), None);
        assert_eq!(decode_path_segment("a%40b.fr"), "a@b.fr");
    }

    #[test]
    fn bulk_ids_requires_non_empty_array() {
        assert!(bulk_ids(&json!({})).is_err());
        assert!(bulk_ids(&json!({ "ids": [] })).is_err());
        assert!(bulk_ids(&json!({ "ids": "a" })).is_err());
        assert_eq!(
            bulk_ids(&json!({ "ids": ["a", 3, null, "b"] })).unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn validation_errors_carry_issues() {
        let err = Error::Validation(vec![crate::error::Issue::new("email", "Email invalide")]);
        let resp = error_response(&err);
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
