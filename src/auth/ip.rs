//! Client IP extraction utilities.

use std::net::SocketAddr;

use axum::{extract::ConnectInfo, http::Request};

use crate::cli::IpExtractor;

/// Extract client IP address based on configuration.
///
/// If `ip_extractor` is set, extracts IP from the configured header and returns an error
/// if the header is missing or invalid (does NOT fall back to SocketAddr).
///
/// If `ip_extractor` is None, uses the SocketAddr from ConnectInfo.
pub fn extract_client_ip<B>(
    request: &Request<B>,
    ip_extractor: Option<&IpExtractor>,
) -> Result<String, &'static str> {
    match ip_extractor {
        Some(extractor) => {
            let header_value = request
                .headers()
                .get(extractor.header_name)
                .ok_or("IP header not present")?
                .to_str()
                .map_err(|_| "IP header contains invalid characters")?;
            extractor.extract(header_value)
        }
        None => request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string())
            .ok_or("No client IP available"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ClientIpHeader;
    use axum::body::Body;

    fn with_header(name: &str, value: &str) -> Request<Body> {
        Request::builder()
            .header(name, value)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_connect_info() {
        let mut request = Request::new(Body::empty());
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 4242))));

        assert_eq!(extract_client_ip(&request, None).unwrap(), "10.0.0.7");
    }

    #[test]
    fn test_no_connect_info() {
        let request = Request::new(Body::empty());
        assert!(extract_client_ip(&request, None).is_err());
    }

    #[test]
    fn test_forwarded_for_uses_entry_appended_by_proxy() {
        let extractor = IpExtractor::from(ClientIpHeader::XForwardFor);

        // The client controls everything left of the last entry
        let request = with_header("x-forwarded-for", "10.9.9.1, 203.0.113.9");
        assert_eq!(
            extract_client_ip(&request, Some(&extractor)).unwrap(),
            "203.0.113.9"
        );

        let request = with_header("x-forwarded-for", "10.9.9.2, 203.0.113.9");
        assert_eq!(
            extract_client_ip(&request, Some(&extractor)).unwrap(),
            "203.0.113.9"
        );
    }

    #[test]
    fn test_real_ip_header() {
        let extractor = IpExtractor::from(ClientIpHeader::XRealIp);

        let request = with_header("x-real-ip", " 2001:db8::1 ");
        assert_eq!(
            extract_client_ip(&request, Some(&extractor)).unwrap(),
            "2001:db8::1"
        );

        let request = with_header("x-real-ip", "10.0.0.1, 10.0.0.2");
        assert!(extract_client_ip(&request, Some(&extractor)).is_err());
    }

    #[test]
    fn test_header_required_when_configured() {
        let extractor = IpExtractor::from(ClientIpHeader::XForwardFor);

        let mut request = Request::new(Body::empty());
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 4242))));
        assert!(extract_client_ip(&request, Some(&extractor)).is_err());

        let garbage = with_header("x-forwarded-for", "not-an-ip");
        assert!(extract_client_ip(&garbage, Some(&extractor)).is_err());

        let trailing_comma = with_header("x-forwarded-for", "203.0.113.9,");
        assert!(extract_client_ip(&trailing_comma, Some(&extractor)).is_err());
    }
}
