use crate::error::ResolveError;
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").expect("scheme pattern is valid")
});

/// Rules for turning a raw detail link into a URL to visit
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlResolver {
    /// Resolve non-rooted relative links (`item/5`, `../x`) against the page URL
    pub allow_relative: bool,
}

impl UrlResolver {
    pub fn new(allow_relative: bool) -> Self {
        Self { allow_relative }
    }

    /// Resolves `raw` against the listing page URL `base`.
    ///
    /// - `http(s)://…` is returned verbatim; any other scheme is rejected.
    /// - `/path` (and `//host/path`) resolve against `base`.
    /// - Anything else is rejected unless relative resolution is enabled.
    pub fn resolve(&self, raw: Option<&str>, base: &Url) -> Result<String, ResolveError> {
        let raw = raw.map(str::trim).unwrap_or_default();
        if raw.is_empty() {
            return Err(ResolveError::Absent);
        }

        if SCHEME.is_match(raw) {
            return match Url::parse(raw) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(raw.to_string()),
                Ok(_) => Err(ResolveError::UnsupportedScheme(raw.to_string())),
                Err(e) => Err(ResolveError::Malformed {
                    raw: raw.to_string(),
                    message: e.to_string(),
                }),
            };
        }

        if !raw.starts_with('/') && !self.allow_relative {
            return Err(ResolveError::Relative(raw.to_string()));
        }

        let resolved = base.join(raw).map_err(|e| ResolveError::Malformed {
            raw: raw.to_string(),
            message: e.to_string(),
        })?;
        Ok(resolved.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/list").unwrap()
    }

    #[test]
    fn test_rooted_path_resolves_against_listing() {
        let resolver = UrlResolver::default();
        assert_eq!(
            resolver.resolve(Some("/article/123"), &base()).unwrap(),
            "https://example.com/article/123"
        );
    }

    #[test]
    fn test_absolute_url_is_verbatim() {
        let resolver = UrlResolver::default();
        assert_eq!(
            resolver.resolve(Some("https://x.com/a"), &base()).unwrap(),
            "https://x.com/a"
        );
        assert_eq!(
            resolver.resolve(Some("HTTP://X.com"), &base()).unwrap(),
            "HTTP://X.com"
        );
    }

    #[test]
    fn test_non_http_schemes_are_rejected() {
        let resolver = UrlResolver::new(true);
        for raw in ["javascript:void(0)", "mailto:a@b.c", "ftp://host/file"] {
            assert!(
                matches!(
                    resolver.resolve(Some(raw), &base()),
                    Err(ResolveError::UnsupportedScheme(_))
                ),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_relative_needs_opt_in() {
        let page = Url::parse("https://example.com/list/page2").unwrap();

        let strict = UrlResolver::default();
        assert_eq!(
            strict.resolve(Some("item/5"), &page),
            Err(ResolveError::Relative("item/5".to_string()))
        );

        let lenient = UrlResolver::new(true);
        assert_eq!(
            lenient.resolve(Some("item/5"), &page).unwrap(),
            "https://example.com/list/item/5"
        );
    }

    #[test]
    fn test_absent_and_blank() {
        let resolver = UrlResolver::default();
        assert_eq!(resolver.resolve(None, &base()), Err(ResolveError::Absent));
        assert_eq!(resolver.resolve(Some("   "), &base()), Err(ResolveError::Absent));
    }

    #[test]
    fn test_self_link_is_not_special() {
        let resolver = UrlResolver::default();
        assert_eq!(
            resolver.resolve(Some("/list"), &base()).unwrap(),
            "https://example.com/list"
        );
    }

    #[test]
    fn test_fragment_kept_on_resolved_links() {
        let resolver = UrlResolver::default();
        assert_eq!(
            resolver.resolve(Some("/a#comments"), &base()).unwrap(),
            "https://example.com/a#comments"
        );
        // Hash-routed items differ only in their fragment
        assert_eq!(
            resolver.resolve(Some("/#/item/1"), &base()).unwrap(),
            "https://example.com/#/item/1"
        );
        assert_eq!(
            resolver.resolve(Some("/#/item/2"), &base()).unwrap(),
            "https://example.com/#/item/2"
        );
    }
}
