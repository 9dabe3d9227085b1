//! Download filename derivation

use std::path::{Path, PathBuf};
use url::Url;

/// Name used when the URL path has no usable segment
pub const DEFAULT_FILE_NAME: &str = "untitled";

/// Characters that are unsafe in filenames on at least one common filesystem
const UNSAFE_CHARS: &[char] = &['\\', '/', ':', '*', '?', '<', '>', '"', '|', '\t'];

/// Returns the last non-empty path segment of the URL, or `untitled`
///
/// ```
/// use url::Url;
/// use crawlgate::url::default_file_name;
///
/// let url = Url::parse("https://wx1.sinaimg.cn/large/abc.jpg").unwrap();
/// assert_eq!(default_file_name(&url), "abc.jpg");
///
/// let url = Url::parse("https://example.com/gallery/").unwrap();
/// assert_eq!(default_file_name(&url), "gallery");
/// ```
pub fn default_file_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|s| s.to_string())
        .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string())
}

/// Replaces filesystem-unsafe characters with an underscore
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if UNSAFE_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Returns false for names that would resolve to a directory instead of a file
///
/// Expects a name already passed through [`sanitize_file_name`], so path
/// separators are gone and only `.`, `..` and blank names remain to reject.
pub fn is_usable_file_name(name: &str) -> bool {
    !matches!(name.trim(), "" | "." | "..")
}

/// Returns the path with an underscore inserted before its extension
///
/// Applied repeatedly, this yields `a.jpg`, `a_.jpg`, `a__.jpg`, ... An
/// extension only counts if it is made of word characters; anything else
/// gets the underscore appended at the end.
pub fn disambiguate(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());

    let renamed = match name.rfind('.') {
        Some(dot) if dot + 1 < name.len() && is_word(&name[dot + 1..]) => {
            format!("{}_{}", &name[..dot], &name[dot..])
        }
        _ => format!("{}_", name),
    };

    path.with_file_name(renamed)
}

fn is_word(s: &str) -> bool {
    s.chars().all(|c| c.is_alphanumeric() || c == '_')
}
