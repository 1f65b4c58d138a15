//! Checks a directory URL before anything touches the network.

use reqwest::Url;

use crate::error::{Result, SmolderError};

/// Parses `url` and checks it names a directory on the expected domain.
///
/// Rejects empty input, relative or malformed URLs, schemes other than
/// http/https, hosts outside `domain` and URLs without a trailing `/`.
pub fn validate_url(url: &str, domain: &str) -> Result<Url> {
    if url.trim().is_empty() {
        return Err(SmolderError::invalid_url(url, "the URL must not be empty"));
    }
    if url.chars().any(char::is_whitespace) {
        return Err(SmolderError::invalid_url(
            url,
            "the URL must be a valid URI string",
        ));
    }

    let parsed = Url::parse(url)
        .map_err(|_| SmolderError::invalid_url(url, "the URL must be a valid URI string"))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(SmolderError::invalid_url(url, "the URL must be HTTP or HTTPS"));
    }

    let host = parsed.host_str().unwrap_or_default();
    if !host_in_domain(host, domain) {
        return Err(SmolderError::invalid_url(
            url,
            "the URL must be in a valid CommunityDragon path",
        ));
    }

    if !url.ends_with('/') {
        return Err(SmolderError::invalid_url(url, "the URL must end with '/'"));
    }

    Ok(parsed)
}

fn host_in_domain(host: &str, domain: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let domain = domain.to_ascii_lowercase();
    host == domain
        || host
            .strip_suffix(domain.as_str())
            .is_some_and(|prefix| prefix.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOMAIN: &str = "communitydragon.org";

    fn assert_invalid(url: &str) {
        match validate_url(url, DOMAIN) {
            Err(SmolderError::InvalidUrl { .. }) => {}
            other => panic!("expected InvalidUrl for {url:?}, got {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_inputs() {
        for url in [
            "",
            "   ",
            "ftp://x/",
            "https://other.org/a/",
            "https://communitydragon.org/a",
            "not a url/",
            "/latest/game/",
            "https://evilcommunitydragon.org/a/",
        ] {
            assert_invalid(url);
        }
    }

    #[test]
    fn accepts_directories_on_any_subdomain() {
        for url in [
            "https://communitydragon.org/a/",
            "https://raw.communitydragon.org/latest/game/data/images/",
            "http://universe.communitydragon.org/events/2024/",
        ] {
            assert!(validate_url(url, DOMAIN).is_ok(), "{url} should be valid");
        }
    }

    #[test]
    fn accepts_local_host_when_configured() {
        let parsed = validate_url("http://127.0.0.1:4321/json/latest/", "127.0.0.1").unwrap();
        assert_eq!(parsed.port(), Some(4321));
    }
}
