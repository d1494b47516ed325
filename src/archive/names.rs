// src/archive/names.rs

//! Entry name decoding and lexical normalization
//!
//! ZIP entry names without the UTF-8 flag are stored in whatever code page
//! the packing tool used. Asset bundles in the wild are mostly UTF-8 (tools
//! that forget the flag) or GBK, with CP437 as the format's nominal default.

use encoding_rs::GBK;

/// Decode a raw entry name
///
/// Tries, in order: UTF-8, GBK, and finally `legacy`, which is the name as
/// decoded by the ZIP reader under the CP437 default. Never substitutes
/// replacement characters.
pub fn decode_entry_name(raw: &[u8], legacy: &str) -> String {
    if let Ok(name) = std::str::from_utf8(raw) {
        return name.to_string();
    }

    if let Some(name) = GBK.decode_without_bom_handling_and_without_replacement(raw) {
        return name.into_owned();
    }

    legacy.to_string()
}

/// Split an entry name into normal path components
///
/// Both `/` and `\` are treated as separators. `.` segments are dropped and
/// `..` pops the previous segment. Returns `None` for absolute names, drive
/// prefixes, and names whose `..` segments climb above the archive root.
pub fn normalize_entry_name(name: &str) -> Option<Vec<String>> {
    let unified = name.replace('\\', "/");

    if unified.starts_with('/') {
        return None;
    }

    let mut components: Vec<String> = Vec::new();
    for (i, segment) in unified.split('/').enumerate() {
        if i == 0 && is_drive_prefix(segment) {
            return None;
        }
        match segment {
            "" | "." => {}
            ".." => {
                components.pop()?;
            }
            normal => components.push(normal.to_string()),
        }
    }

    Some(components)
}

fn is_drive_prefix(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_name_passes_through() {
        let name = "涂装/texture.dds";
        assert_eq!(decode_entry_name(name.as_bytes(), "ignored"), name);
    }

    #[test]
    fn test_gbk_name_is_decoded() {
        // "涂装.dds" encoded as GBK
        let (bytes, _, had_errors) = GBK.encode("涂装.dds");
        assert!(!had_errors);
        assert!(std::str::from_utf8(&bytes).is_err());
        assert_eq!(decode_entry_name(&bytes, "ignored"), "涂装.dds");
    }

    #[test]
    fn test_undecodable_name_falls_back_to_legacy() {
        // 0xFF is not a valid lead byte in UTF-8 or GBK
        let raw = [b'a', 0xFF, b'.', b'd', b'd', b's'];
        assert_eq!(decode_entry_name(&raw, "a\u{a0}.dds"), "a\u{a0}.dds");
    }

    #[test]
    fn test_normalize_plain_and_dotted() {
        assert_eq!(
            normalize_entry_name("bar/./texture.dds").unwrap(),
            vec!["bar", "texture.dds"]
        );
        assert_eq!(
            normalize_entry_name("bar\\sub\\..\\texture.dds").unwrap(),
            vec!["bar", "texture.dds"]
        );
        assert_eq!(normalize_entry_name("bar/").unwrap(), vec!["bar"]);
    }

    #[test]
    fn test_normalize_rejects_escapes() {
        assert!(normalize_entry_name("../../evil").is_none());
        assert!(normalize_entry_name("a/../../evil").is_none());
        assert!(normalize_entry_name("..\\evil.dds").is_none());
        assert!(normalize_entry_name("/etc/passwd").is_none());
        assert!(normalize_entry_name("C:/Windows/evil.dds").is_none());
    }
}
