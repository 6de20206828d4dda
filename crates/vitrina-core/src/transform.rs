//! Transformation URL building for the remote media store.
//!
//! The store rewrites URLs by inserting a `tr:` segment
//! (e.g. `https://cdn.example.com/tr:w-300,h-200,q-70/catalog/x.jpg`) or,
//! for URLs outside the configured endpoint, by appending a `tr` query
//! parameter. Only the width/height/quality trio the admin layer requests
//! is supported.

/// Requested output transformation. All fields optional; an empty set of
/// options means "return the stored URL unchanged".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Quality percentage, 1..=100.
    pub quality: Option<u8>,
}

impl TransformOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn height(mut self, height: u32) -> Self {
        self.height = Some(height);
        self
    }

    pub fn quality(mut self, quality: u8) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.width.is_none() && self.height.is_none() && self.quality.is_none()
    }

    /// Render the comma-separated transformation parameters
    /// (`w-300,h-200,q-70`). Empty options render an empty string.
    pub fn to_params(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        if let Some(w) = self.width {
            parts.push(format!("w-{}", w));
        }
        if let Some(h) = self.height {
            parts.push(format!("h-{}", h));
        }
        if let Some(q) = self.quality {
            parts.push(format!("q-{}", q));
        }
        parts.join(",")
    }
}

/// Build a transformed URL for `src` against the store endpoint.
///
/// URLs under `url_endpoint` get the path-based `tr:` segment inserted
/// directly after the endpoint; anything else falls back to the `tr` query
/// parameter, which the store also accepts.
pub fn build_transformed_url(url_endpoint: &str, src: &str, options: &TransformOptions) -> String {
    if options.is_empty() {
        return src.to_string();
    }

    let params = options.to_params();
    let endpoint = url_endpoint.trim_end_matches('/');

    if let Some(path) = src.strip_prefix(endpoint) {
        let path = path.trim_start_matches('/');
        format!("{}/tr:{}/{}", endpoint, params, path)
    } else {
        let separator = if src.contains('?') { '&' } else { '?' };
        format!("{}{}tr={}", src, separator, params)
    }
}
