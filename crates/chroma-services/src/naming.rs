//! File names derived from the client-supplied name.
//!
//! The wire name is untrusted raw bytes. Before it touches the filesystem it
//! is reduced to its last path component.

/// Suffix inserted before the extension of equalized copies.
pub const EQUALIZED_SUFFIX: &str = "_equalized";

/// Longest file name component most filesystems accept, in bytes.
pub const NAME_MAX: usize = 255;

/// Extension given to equalized copies of names that have none.
const DEFAULT_EXTENSION: &str = ".png";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("name {0:?} has no usable file name component")]
    NoBaseName(String),

    #[error("name contains a NUL byte")]
    Nul,
}

/// Confine `raw` to a single path component.
///
/// Directory parts (either separator) are stripped, invalid UTF-8 is
/// replaced, surrounding whitespace is trimmed, and names that would still
/// address something other than a plain file in the target directory are
/// rejected. Long names are shortened so that the equalized name still fits
/// in `NAME_MAX` bytes.
pub fn safe_file_name(raw: &[u8]) -> Result<String, NameError> {
    if raw.contains(&0) {
        return Err(NameError::Nul);
    }
    let text = String::from_utf8_lossy(raw);
    let base = text
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base == "." || base == ".." {
        return Err(NameError::NoBaseName(text.into_owned()));
    }
    Ok(fit_name_max(base))
}

/// Shorten the stem of `base`, keeping its extension, until
/// `equalized_file_name(base)` is at most `NAME_MAX` bytes.
fn fit_name_max(base: &str) -> String {
    if equalized_file_name(base).len() <= NAME_MAX {
        return base.to_string();
    }
    match base.rfind('.') {
        Some(dot) if dot > 0 && base.len() - dot + EQUALIZED_SUFFIX.len() < NAME_MAX => {
            let ext = &base[dot..];
            let budget = NAME_MAX - EQUALIZED_SUFFIX.len() - ext.len();
            format!("{}{ext}", truncate_on_char(&base[..dot], budget))
        }
        // No usable extension: the equalized copy gets the default one.
        _ => {
            let budget = NAME_MAX - EQUALIZED_SUFFIX.len() - DEFAULT_EXTENSION.len();
            truncate_on_char(base, budget).to_string()
        }
    }
}

fn truncate_on_char(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// `photo.png` → `photo_equalized.png`; `photo` → `photo_equalized.png`.
pub fn equalized_file_name(name: &str) -> String {
    match name.rfind('.') {
        Some(dot) => format!("{}{EQUALIZED_SUFFIX}{}", &name[..dot], &name[dot..]),
        None => format!("{name}{EQUALIZED_SUFFIX}{DEFAULT_EXTENSION}"),
    }
}

/// Loggable form of a raw name: the text when it is UTF-8, hex otherwise.
pub fn display_name(raw: &[u8]) -> String {
    match std::str::from_utf8(raw) {
        Ok(s) => s.to_string(),
        Err(_) => format!("hex:{}", hex::encode(raw)),
    }
}
