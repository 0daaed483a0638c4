use url::form_urlencoded;
use url::Url;

const TRACKING_PARAMS: &[&str] = &[
    "gclid", "fbclid", "msclkid", "mc_cid", "mc_eid", "igshid", "yclid", "_ga", "ref_src", "spm",
];

fn is_tracking(name: &str) -> bool {
    let lname = name.to_ascii_lowercase();
    lname.starts_with("utm_") || TRACKING_PARAMS.contains(&lname.as_str())
}

/// Identity used to recognise the same page reported by different engines.
///
/// Ignores scheme, fragment, userinfo, default port, a leading `www.`,
/// host case, a trailing slash, tracking parameters and query order.
///
/// ```
/// use veil_core::identity_key;
///
/// assert_eq!(
///     identity_key("http://WWW.Example.com/docs/?utm_source=x&b=2&a=1#top"),
///     identity_key("https://example.com/docs?a=1&b=2"),
/// );
/// ```
pub fn identity_key(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    let mut key = String::with_capacity(raw.len());
    key.push_str(host);
    if let Some(port) = url.port() {
        key.push(':');
        key.push_str(&port.to_string());
    }
    key.push_str(url.path().trim_end_matches('/'));

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !pairs.is_empty() {
        pairs.sort();
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        key.push('?');
        key.push_str(&query);
    }
    Some(key)
}
