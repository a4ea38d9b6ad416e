//! Base64 encoding of path elements at the store boundary.
//!
//! The snapshot store names files and directories with characters under its
//! own control. Raw element names (folder display names, item IDs) may contain
//! `/` or other reserved characters, so every element is base64-encoded before
//! it becomes a store name and decoded when read back.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;

use crate::error::{PathError, PathResult};

/// Encodes a single raw element for use as a store name.
#[must_use]
pub fn encode_element(elem: &str) -> String {
    URL_SAFE.encode(elem.as_bytes())
}

/// Decodes a store name back into the raw element.
pub fn decode_element(encoded: &str) -> PathResult<String> {
    let bytes = URL_SAFE
        .decode(encoded)
        .map_err(|_| PathError::bad_encoding(encoded))?;

    String::from_utf8(bytes).map_err(|_| PathError::bad_encoding(encoded))
}

/// Encodes every element and joins them with `/` into a store-relative path.
#[must_use]
pub fn encode_as_path<'a, I>(elements: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    elements
        .into_iter()
        .map(encode_element)
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_roundtrip() {
        for raw in ["Inbox", "a/b", "weird\\name", "", "日本語"] {
            let enc = encode_element(raw);
            assert!(!enc.contains('/'), "encoded element must not contain /");
            assert_eq!(decode_element(&enc).unwrap(), raw);
        }
    }

    #[test]
    fn encode_as_path_joins_with_slash() {
        let joined = encode_as_path(["a", "b"]);
        let parts: Vec<_> = joined.split('/').collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(decode_element(parts[0]).unwrap(), "a");
        assert_eq!(decode_element(parts[1]).unwrap(), "b");
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_element("not base64 !!!").is_err());
    }
}
