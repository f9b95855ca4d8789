//! HTTP/1.1 `Upgrade: h2c` request (RFC 7540 Section 3.2)

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use super::error::{Error, Result};
use super::settings::{encode_entries, Settings};
use crate::http::{HttpRequest, HttpResponse, Method, Status, Version};

/// `HTTP2-Settings` header value for `settings`
pub fn settings_header_value(settings: &Settings) -> String {
    URL_SAFE_NO_PAD.encode(encode_entries(&settings.entries()))
}

/// Build the upgrade request for `path` on `authority`
///
/// ```text
/// GET <path> HTTP/1.1
/// Host: <authority>
/// Connection: Upgrade, HTTP2-Settings
/// Upgrade: h2c
/// HTTP2-Settings: <base64url SETTINGS payload>
/// ```
pub fn build_upgrade_request(authority: &str, path: &str, settings: &Settings) -> Result<HttpRequest> {
    let request = HttpRequest::builder()
        .method(Method::Get)
        .uri(path)
        .version(Version::Http11)
        .header("Host", authority)
        .header("Connection", "Upgrade, HTTP2-Settings")
        .header("Upgrade", "h2c")
        .header("HTTP2-Settings", settings_header_value(settings))
        .build()?;

    Ok(request)
}

/// Accept only `HTTP/1.1 101`
pub fn check_upgrade_response(response: &HttpResponse) -> Result<()> {
    if response.version() != Version::Http11 || response.status() != Status::SWITCHING_PROTOCOLS {
        return Err(Error::Negotiation(format!(
            "expected HTTP/1.1 101, got {} {} {}",
            response.version().as_str(),
            response.status(),
            response.reason()
        )));
    }

    Ok(())
}
