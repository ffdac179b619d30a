//! Partner SOAP login
//!
//! Builds the `login` envelope and reads the session out of the response.
//! The response is small and flat, so fields are pulled out by tag.

use forcecov_core::{Credentials, PlatformError};
use once_cell::sync::Lazy;
use regex::Regex;

static FAULT_CODE: Lazy<Regex> = Lazy::new(|| tag_pattern("faultcode"));
static FAULT_STRING: Lazy<Regex> = Lazy::new(|| tag_pattern("faultstring"));
static SESSION_ID: Lazy<Regex> = Lazy::new(|| tag_pattern("sessionId"));
static SERVER_URL: Lazy<Regex> = Lazy::new(|| tag_pattern("serverUrl"));
static USER_ID: Lazy<Regex> = Lazy::new(|| tag_pattern("userId"));
static ORGANIZATION_ID: Lazy<Regex> = Lazy::new(|| tag_pattern("organizationId"));

fn tag_pattern(tag: &str) -> Regex {
    // optional namespace prefix on either tag
    Regex::new(&format!(
        r"<(?:[A-Za-z0-9_]+:)?{tag}(?:\s[^>]*)?>([^<]*)</(?:[A-Za-z0-9_]+:)?{tag}>"
    ))
    .expect("tag pattern is valid")
}

/// Session returned by a successful login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginResult {
    /// Bearer token for later calls
    pub session_id: String,
    /// SOAP endpoint on the org's instance
    pub server_url: String,
    /// Logged-in user
    pub user_id: Option<String>,
    /// Org id
    pub organization_id: Option<String>,
}

/// Path of the partner SOAP endpoint for `api_version`
#[must_use]
pub fn login_path(api_version: &str) -> String {
    format!("/services/Soap/u/{api_version}")
}

/// Login request envelope
#[must_use]
pub fn login_envelope(credentials: &Credentials) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<env:Envelope xmlns:xsd="http://www.w3.org/2001/XMLSchema" "#,
            r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#,
            r#"xmlns:env="http://schemas.xmlsoap.org/soap/envelope/">"#,
            r#"<env:Body><n1:login xmlns:n1="urn:partner.soap.sforce.com">"#,
            "<n1:username>{}</n1:username>",
            "<n1:password>{}</n1:password>",
            "</n1:login></env:Body></env:Envelope>"
        ),
        escape_xml(&credentials.username),
        escape_xml(&credentials.password_with_token()),
    )
}

/// Escape text for an XML element body
#[must_use]
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn capture(pattern: &Regex, body: &str) -> Option<String> {
    pattern
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| unescape_xml(m.as_str().trim()))
}

/// Parse a login response body
///
/// # Errors
/// - `PlatformError::Fault` when the body is a SOAP fault
/// - `PlatformError::InvalidResponse` when the session fields are missing
pub fn parse_login_response(body: &str) -> Result<LoginResult, PlatformError> {
    if let Some(message) = capture(&FAULT_STRING, body) {
        let code = capture(&FAULT_CODE, body).unwrap_or_else(|| "UNKNOWN".to_string());
        // strip the namespace prefix, e.g. sf:INVALID_LOGIN
        let code = code.rsplit(':').next().unwrap_or_default().to_string();
        return Err(PlatformError::Fault { code, message });
    }

    let session_id = capture(&SESSION_ID, body)
        .ok_or_else(|| PlatformError::InvalidResponse("login response has no sessionId".to_string()))?;
    let server_url = capture(&SERVER_URL, body)
        .ok_or_else(|| PlatformError::InvalidResponse("login response has no serverUrl".to_string()))?;

    Ok(LoginResult {
        session_id,
        server_url,
        user_id: capture(&USER_ID, body),
        organization_id: capture(&ORGANIZATION_ID, body),
    })
}
