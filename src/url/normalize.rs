use url::Url;

/// Strips the fragment from a URL
///
/// Two saves of `https://x/y#a` and `https://x/y` refer to the same target,
/// so every stored URL passes through here. Strings that do not parse as an
/// absolute URL are cut at the first `#` and otherwise kept verbatim, since
/// the source occasionally records relative or malformed targets.
///
/// # Examples
///
/// ```
/// use pinweave::url::strip_fragment;
///
/// assert_eq!(strip_fragment("https://example.com/page#top"), "https://example.com/page");
/// assert_eq!(strip_fragment("https://example.com/page"), "https://example.com/page");
/// ```
pub fn strip_fragment(url_str: &str) -> String {
    match Url::parse(url_str) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => match url_str.split_once('#') {
            Some((head, _)) => head.to_string(),
            None => url_str.to_string(),
        },
    }
}

/// Resolves an `href` against the page it was found on
///
/// Returns None when the join fails or lands outside http(s).
pub fn resolve_href(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }

    let base = Url::parse(base).ok()?;
    let joined = base.join(href).ok()?;

    if joined.scheme() == "http" || joined.scheme() == "https" {
        Some(joined.to_string())
    } else {
        None
    }
}
