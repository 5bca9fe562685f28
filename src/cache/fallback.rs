//! Synthetic responses served when neither cache nor network can answer.

use crate::net::Response;

/// Status text of synthetic 503 responses.
pub const OFFLINE_STATUS_TEXT: &str = "Service Unavailable - offline and not cached";

/// A 1×1 transparent GIF.
pub const TRANSPARENT_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

const OFFLINE_PAGE: &str = r#"<!DOCTYPE html>
<html lang="vi">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Offline - Vũ Anh</title>
<style>
  body { font-family: system-ui, -apple-system, sans-serif; margin: 0; min-height: 100vh;
         display: flex; align-items: center; justify-content: center;
         background: #f5f7fa; color: #1f2937; text-align: center; }
  main { max-width: 420px; padding: 32px; }
  h1 { font-size: 1.5rem; margin-bottom: 12px; }
  p { line-height: 1.6; color: #4b5563; }
  button { margin-top: 20px; padding: 12px 28px; border: 0; border-radius: 8px;
           background: #0f766e; color: #fff; font-size: 1rem; cursor: pointer; }
  button:hover { background: #115e59; }
</style>
</head>
<body>
<main>
<h1>Bạn đang ngoại tuyến</h1>
<p>Không thể tải trang này khi không có kết nối mạng. Vui lòng kiểm tra kết nối và thử lại.</p>
<p>You are offline. This page is not available without a connection.</p>
<button type="button" onclick="window.location.reload()">Thử lại / Retry</button>
</main>
</body>
</html>
"#;

/// The self-contained offline page served to navigations of last resort.
#[must_use]
pub fn offline_page() -> Response {
    Response::new(200, "OK", OFFLINE_PAGE)
        .with_header("content-type", "text/html; charset=utf-8")
        .with_header("cache-control", "no-store")
}

/// Transparent placeholder for images that cannot be loaded.
#[must_use]
pub fn placeholder_image() -> Response {
    Response::new(200, "OK", TRANSPARENT_GIF).with_header("content-type", "image/gif")
}

/// Synthetic 503 for any other resource.
#[must_use]
pub fn unavailable() -> Response {
    Response::new(503, OFFLINE_STATUS_TEXT, "").with_header("content-type", "text/plain")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_page_is_html_with_retry() {
        let page = offline_page();
        assert_eq!(page.status, 200);
        assert!(page.header("content-type").unwrap().starts_with("text/html"));
        let body = std::str::from_utf8(&page.body).unwrap();
        assert!(body.contains("<button"));
        assert!(body.contains("location.reload()"));
        // Self-contained: no external references.
        assert!(!body.contains("src="));
        assert!(!body.contains("href="));
    }

    #[test]
    fn placeholder_is_gif() {
        let img = placeholder_image();
        assert_eq!(img.status, 200);
        assert_eq!(img.header("content-type"), Some("image/gif"));
        assert!(img.body.starts_with(b"GIF89a"));
        assert_eq!(img.body.last(), Some(&0x3b));
    }

    #[test]
    fn unavailable_is_503_with_reason() {
        let resp = unavailable();
        assert_eq!(resp.status, 503);
        assert!(!resp.ok());
        assert_eq!(resp.status_text, OFFLINE_STATUS_TEXT);
    }
}
