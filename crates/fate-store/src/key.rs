use crate::{Result, StoreError};

/// Checks that `key` is an absolute path made of non-empty, non-dot segments.
///
/// # Errors
///
/// Returns [`StoreError::InvalidKey`] describing the first violation.
pub fn validate_key(key: &str) -> Result<()> {
    let invalid = |reason| StoreError::InvalidKey {
        key: key.to_string(),
        reason,
    };

    let Some(rest) = key.strip_prefix('/') else {
        return Err(invalid("must start with '/'"));
    };
    if rest.is_empty() {
        return Err(invalid("must name an entry"));
    }
    for segment in rest.split('/') {
        match segment {
            "" => return Err(invalid("contains an empty segment")),
            "." | ".." => return Err(invalid("contains a relative segment")),
            s if s.starts_with('.') => return Err(invalid("segment starts with '.'")),
            _ => {}
        }
    }
    Ok(())
}
