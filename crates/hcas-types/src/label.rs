//! Label name validation.
//!
//! A label becomes a file name under the store root and the first DNS label
//! of the generated server name, so valid labels:
//! - Must be non-empty and at most 128 characters
//! - Use only ASCII letters, digits, `-`, `_` and `.`
//! - Must not start with `.` or contain `..`

use crate::error::TypeError;

pub const MAX_LABEL_LEN: usize = 128;

/// Validate a label name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use hcas_types::validate_label;
///
/// assert!(validate_label("prod").is_ok());
/// assert!(validate_label("distro--master").is_ok());
/// assert!(validate_label("").is_err());
/// assert!(validate_label("../etc").is_err());
/// ```
pub fn validate_label(name: &str) -> Result<(), TypeError> {
    let invalid = |reason: &str| TypeError::InvalidLabel {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("label must not be empty"));
    }
    if name.len() > MAX_LABEL_LEN {
        return Err(invalid("label is too long"));
    }
    if let Some(ch) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(invalid(&format!("contains forbidden character: {ch:?}")));
    }
    if name.starts_with('.') {
        return Err(invalid("must not start with '.'"));
    }
    if name.contains("..") {
        return Err(invalid("must not contain '..'"));
    }
    Ok(())
}
