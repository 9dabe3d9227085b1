use crate::UrlError;
use url::Url;

/// Derives the admission key for a URL's network location
///
/// The key is the lowercase host plus the port when the URL names one
/// explicitly, so `https://example.com:8443/` and `https://example.com/`
/// are budgeted separately while `https://example.com:443/` is not.
///
/// # Arguments
///
/// * `url` - The URL whose destination is being throttled
///
/// # Returns
///
/// * `Ok(String)` - The host key
/// * `Err(UrlError::MissingHost)` - The URL has no (or an empty) host
///
/// # Examples
///
/// ```
/// use url::Url;
/// use crawlgate::url::host_key;
///
/// let url = Url::parse("https://WEIBO.com/u/1811696373").unwrap();
/// assert_eq!(host_key(&url).unwrap(), "weibo.com");
///
/// let url = Url::parse("http://127.0.0.1:8080/api").unwrap();
/// assert_eq!(host_key(&url).unwrap(), "127.0.0.1:8080");
/// ```
pub fn host_key(url: &Url) -> Result<String, UrlError> {
    let host = match url.host_str() {
        Some(h) if !h.is_empty() => h.to_lowercase(),
        _ => return Err(UrlError::MissingHost(url.to_string())),
    };

    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}
