//! Request classification: which fetch strategy applies to a request.

use reqwest::Url;

use crate::config::SiteConfig;
use crate::net::{Destination, Request};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "avif"];

/// How the controller treats a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Form relay endpoint: network only, never cached.
    FormEndpoint,
    /// Not a `GET`: left to the network.
    NonGet,
    /// Cross-origin and not a font provider: not intercepted.
    CrossOrigin,
    /// Font provider request: cache first, stored in the precache.
    Font,
    /// Same-origin page load: network first.
    Navigation,
    /// Same-origin sub-resource: cache first, stored in the runtime cache.
    Asset,
}

impl RequestClass {
    /// Whether the controller answers this request itself.
    #[must_use]
    pub const fn is_intercepted(self) -> bool {
        matches!(self, Self::Font | Self::Navigation | Self::Asset)
    }
}

/// Classifies `request` relative to the site.
///
/// The endpoint check runs first so a relay hosted on the site origin is
/// still never cached. Unparseable URLs are treated as cross-origin.
#[must_use]
pub fn classify(request: &Request, site: &SiteConfig) -> RequestClass {
    if is_form_endpoint(&request.url, &site.form_endpoint) {
        return RequestClass::FormEndpoint;
    }
    if request.method != "GET" {
        return RequestClass::NonGet;
    }

    let (Ok(url), Ok(origin)) = (Url::parse(&request.url), Url::parse(&site.origin)) else {
        return RequestClass::CrossOrigin;
    };

    if url.origin() != origin.origin() {
        let is_font_host = url
            .host_str()
            .is_some_and(|host| site.font_hosts.iter().any(|h| h == host));
        return if is_font_host {
            RequestClass::Font
        } else {
            RequestClass::CrossOrigin
        };
    }

    if request.navigate {
        RequestClass::Navigation
    } else {
        RequestClass::Asset
    }
}

/// Whether `url` addresses the form relay: same origin, and a path equal to
/// the endpoint path or below it. Query strings are ignored.
fn is_form_endpoint(url: &str, endpoint: &str) -> bool {
    let (Ok(url), Ok(endpoint)) = (Url::parse(url), Url::parse(endpoint)) else {
        return false;
    };
    if url.origin() != endpoint.origin() {
        return false;
    }
    let base = endpoint.path().trim_end_matches('/');
    url.path()
        .strip_prefix(base)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Whether the request is for an image, by destination or by URL extension.
#[must_use]
pub fn is_image(request: &Request) -> bool {
    if request.destination == Destination::Image {
        return true;
    }
    Url::parse(&request.url).ok().is_some_and(|url| {
        url.path()
            .rsplit_once('.')
            .is_some_and(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> SiteConfig {
        SiteConfig::default()
            .with_origin("https://vuanh.example")
            .with_form_endpoint("https://formspree.io/f/abc123")
    }

    #[test]
    fn endpoint_is_network_only() {
        let req = Request::get("https://formspree.io/f/abc123").with_method("POST");
        assert_eq!(classify(&req, &site()), RequestClass::FormEndpoint);
        assert!(!RequestClass::FormEndpoint.is_intercepted());
    }

    #[test]
    fn endpoint_on_same_origin_still_network_only() {
        let site = site().with_form_endpoint("https://vuanh.example/api/contact");
        let req = Request::get("https://vuanh.example/api/contact");
        assert_eq!(classify(&req, &site), RequestClass::FormEndpoint);
    }

    #[test]
    fn endpoint_match_respects_path_boundaries() {
        let site = site();
        for url in [
            "https://formspree.io/f/abc123?lang=vi",
            "https://formspree.io/f/abc123/",
            "https://formspree.io/f/abc123/confirm",
        ] {
            assert_eq!(classify(&Request::get(url), &site), RequestClass::FormEndpoint, "{url}");
        }
        for url in [
            "https://formspree.io/f/abc123XYZ",
            "https://formspree.io/f/abc",
            "http://formspree.io/f/abc123",
        ] {
            assert_eq!(classify(&Request::get(url), &site), RequestClass::CrossOrigin, "{url}");
        }
    }

    #[test]
    fn non_get_same_origin_is_not_intercepted() {
        let req = Request::get("https://vuanh.example/js/main.js").with_method("PUT");
        assert_eq!(classify(&req, &site()), RequestClass::NonGet);
    }

    #[test]
    fn font_hosts_are_cached_cross_origin() {
        for url in [
            "https://fonts.googleapis.com/css2?family=Inter",
            "https://fonts.gstatic.com/s/inter/v12/font.woff2",
        ] {
            assert_eq!(classify(&Request::get(url), &site()), RequestClass::Font);
        }
    }

    #[test]
    fn other_cross_origin_falls_through() {
        let req = Request::get("https://www.google-analytics.com/collect");
        assert_eq!(classify(&req, &site()), RequestClass::CrossOrigin);
        // Different scheme is a different origin.
        let req = Request::get("http://vuanh.example/index.html");
        assert_eq!(classify(&req, &site()), RequestClass::CrossOrigin);
    }

    #[test]
    fn same_origin_navigation_and_assets() {
        assert_eq!(
            classify(&Request::navigate("https://vuanh.example/about"), &site()),
            RequestClass::Navigation
        );
        assert_eq!(
            classify(&Request::get("https://vuanh.example/css/style.css"), &site()),
            RequestClass::Asset
        );
    }

    #[test]
    fn unparseable_url_is_cross_origin() {
        assert_eq!(
            classify(&Request::get("not a url"), &site()),
            RequestClass::CrossOrigin
        );
    }

    #[test]
    fn image_detection() {
        assert!(is_image(&Request::get("https://vuanh.example/img/hero.JPG")));
        assert!(is_image(&Request::get("https://vuanh.example/icons/icon.svg?v=2")));
        assert!(is_image(
            &Request::get("https://vuanh.example/avatar").with_destination(Destination::Image)
        ));
        assert!(!is_image(&Request::get("https://vuanh.example/js/main.js")));
        assert!(!is_image(&Request::get("https://vuanh.example/")));
    }
}
