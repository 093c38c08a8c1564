use crate::error::ApiError;
use hyper::Uri;

pub const MAX_NAME_LEN: usize = 255;

/// Accepts absolute `http`/`https` URLs with a plausible host.
pub fn validate_address(address: &str) -> Result<(), ApiError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(ApiError::Validation("URL is required".into()));
    }

    let uri: Uri = address
        .parse()
        .map_err(|e| ApiError::Validation(format!("Invalid URL: {e}")))?;

    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        _ => {
            return Err(ApiError::Validation(
                "URL must use the http or https scheme".into(),
            ));
        }
    }

    let host = uri
        .host()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ApiError::Validation("URL must include a host".into()))?;

    // IPv6 literals arrive bracketed.
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if bare.parse::<std::net::IpAddr>().is_ok() {
        return Ok(());
    }

    if !host.is_ascii() || host.len() > 253 || host.contains("..") {
        return Err(ApiError::Validation(format!(
            "Invalid URL: {host} is not a valid DNS name"
        )));
    }
    if let Some(c) = host
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '-' && *c != '.')
    {
        return Err(ApiError::Validation(format!(
            "Invalid URL: invalid character '{c}' in host"
        )));
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<(), ApiError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ApiError::Validation("Name is required".into()));
    }
    if trimmed.len() > MAX_NAME_LEN {
        return Err(ApiError::Validation(format!(
            "Name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_interval(interval_secs: i32, floor_secs: u64) -> Result<(), ApiError> {
    if interval_secs < 0 || (interval_secs as u64) < floor_secs {
        return Err(ApiError::Validation(format!(
            "Interval must be an integer and at least {floor_secs} seconds"
        )));
    }
    Ok(())
}

pub fn validate_email(address: &str) -> Result<(), ApiError> {
    address
        .parse::<lettre::Address>()
        .map(|_| ())
        .map_err(|e| ApiError::Validation(format!("Invalid email recipient: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_addresses() {
        for ok in [
            "https://example.com",
            "http://example.com:8080/health?x=1",
            "https://sub-domain.example.co.uk/path",
            "http://127.0.0.1:3000",
            "http://[::1]:8080/",
        ] {
            assert!(validate_address(ok).is_ok(), "{ok}");
        }
    }

    #[test]
    fn rejects_bad_addresses() {
        for bad in [
            "",
            "example.com",
            "ftp://example.com",
            "https://",
            "https://exa_mple.com",
            "https://a..b.com",
            "not a url",
        ] {
            assert!(validate_address(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn names_and_intervals() {
        assert!(validate_name("  ").is_err());
        assert!(validate_name("API").is_ok());
        assert!(validate_name(&"x".repeat(256)).is_err());

        assert!(validate_interval(10, 10).is_ok());
        assert!(validate_interval(9, 10).is_err());
        assert!(validate_interval(-5, 10).is_err());
    }

    #[test]
    fn email_recipients() {
        assert!(validate_email("ops@example.com").is_ok());
        assert!(validate_email("ops").is_err());
    }
}
