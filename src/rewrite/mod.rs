//! Content rewriting subsystem.
//!
//! # Data Flow
//! ```text
//! upstream body
//!     → primary pass: origin base URL → replacement identity
//!     → origin pass:  third-party origin → /{prefix}/{origin}
//!     → cached / served body
//!
//! upstream headers
//!     → excluded names dropped (case-insensitive)
//!     → location: origin base URL → replacement identity
//! ```
//!
//! # Design Decisions
//! - Pure: a `Rewriter` is built once from config and never mutated
//! - Bodies are treated as bytes; no charset detection
//! - Both passes copy already-rewritten text through, so rewriting is idempotent
//! - Trailing slashes are trimmed from the base URL and replacement so path
//!   separators survive substitution

pub mod body;
pub mod headers;

use std::collections::BTreeSet;

use crate::config::{MirrorConfig, RewriteConfig};

pub use body::SubstitutionPass;

/// Body and header transformation derived from configuration.
#[derive(Debug, Clone)]
pub struct Rewriter {
    enabled: bool,
    primary: SubstitutionPass,
    origins: SubstitutionPass,
    location: SubstitutionPass,
    excluded: BTreeSet<String>,
}

impl Rewriter {
    pub fn from_config(config: &MirrorConfig) -> Self {
        Self::new(&config.origin.base_url, &config.rewrite)
    }

    pub fn new(base_url: &str, rewrite: &RewriteConfig) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        let replacement = rewrite.replace.trim_end_matches('/').to_string();

        let markers: Vec<(String, String)> = rewrite
            .proxy_sites
            .iter()
            .chain(rewrite.bypass_sites.iter())
            .map(|origin| (origin.clone(), proxy_marker(&rewrite.proxy_prefix, origin)))
            .collect();
        let marker_texts: Vec<String> = markers.iter().map(|(_, marker)| marker.clone()).collect();

        let primary = SubstitutionPass::new(
            [(base.clone(), replacement.clone())],
            std::iter::once(replacement.clone()).chain(marker_texts.iter().cloned()),
        );
        let origins = SubstitutionPass::new(markers, marker_texts);
        let location = SubstitutionPass::new([(base, replacement.clone())], [replacement]);

        Self {
            enabled: !rewrite.replace.is_empty(),
            primary,
            origins,
            location,
            excluded: rewrite.effective_excluded_headers(),
        }
    }

    /// Substitute the origin's identity inside a body.
    ///
    /// Returns the body unchanged when no replacement identity is configured.
    pub fn rewrite_body(&self, body: &[u8]) -> Vec<u8> {
        if !self.enabled {
            return body.to_vec();
        }
        let body = self.primary.apply(body);
        self.origins.apply(&body)
    }

    /// Drop excluded headers and rewrite redirect targets.
    pub fn rewrite_headers(&self, headers: Vec<(String, String)>) -> Vec<(String, String)> {
        headers::filter_headers(headers, &self.excluded, &self.location)
    }

    /// Lowercased names that never reach the client.
    pub fn excluded_headers(&self) -> &BTreeSet<String> {
        &self.excluded
    }
}

/// Path under which a third-party origin is served by this mirror.
pub fn proxy_marker(prefix: &str, origin: &str) -> String {
    format!("/{prefix}/{origin}")
}
