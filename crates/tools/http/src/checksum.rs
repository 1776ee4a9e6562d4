//! sha256 attribute validation.

use repofetch_core::rule::ATTR_SHA256;
use repofetch_core::{Failure, RuleAttributes};

/// Length of a hex-encoded sha256 digest.
pub const SHA256_HEX_LEN: usize = 64;

/// Read and validate the optional `sha256` attribute, lower-cased.
///
/// # Errors
///
/// Persistent failure if the attribute is not a string or is not 64 hex
/// characters.
pub fn expected_sha256(attributes: &dyn RuleAttributes) -> Result<Option<String>, Failure> {
    let Some(value) = attributes.get_opt_string(ATTR_SHA256)? else {
        return Ok(None);
    };
    if value.is_empty() {
        return Ok(None);
    }
    if value.len() != SHA256_HEX_LEN || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Failure::invalid_attribute(
            ATTR_SHA256,
            "64 hexadecimal characters",
            format!("'{value}'"),
        ));
    }
    Ok(Some(value.to_ascii_lowercase()))
}
