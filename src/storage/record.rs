use std::fmt;

use serde::de::{IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// Token metadata as submitted by clients
///
/// Decoding only overwrites the fields actually present. Keys match
/// case-insensitively, `null` leaves a field empty, unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetadataRecord {
    pub name: String,
    pub description: String,
    pub image: String,
}

impl<'de> Deserialize<'de> for MetadataRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RecordVisitor)
    }
}

struct RecordVisitor;

impl<'de> Visitor<'de> for RecordVisitor {
    type Value = MetadataRecord;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a metadata object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut record = MetadataRecord::default();
        while let Some(key) = map.next_key::<String>()? {
            let field = if key.eq_ignore_ascii_case("name") {
                &mut record.name
            } else if key.eq_ignore_ascii_case("description") {
                &mut record.description
            } else if key.eq_ignore_ascii_case("image") {
                &mut record.image
            } else {
                map.next_value::<IgnoredAny>()?;
                continue;
            };
            // a later duplicate key overwrites an earlier one
            if let Some(value) = map.next_value::<Option<String>>()? {
                *field = value;
            }
        }
        Ok(record)
    }
}

impl MetadataRecord {
    /// Decode a request body. Anything but a JSON object is refused.
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Pretty-printed form stored on disk, two-space indent plus trailing newline
    pub fn to_pretty_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut out = serde_json::to_vec_pretty(self)?;
        out.push(b'\n');
        Ok(out)
    }

    /// Resolve a relative `image` reference against `base`
    ///
    /// Absolute references (anything with a scheme) are left alone.
    #[must_use]
    pub fn with_image_base(mut self, base: &str) -> Self {
        if !self.image.is_empty() && !self.image.contains("://") {
            self.image = join_url(base, &self.image);
        }
        self
    }
}

/// Join a base URL and a path segment with exactly one `/` between them
pub fn join_url(base: &str, tail: &str) -> String {
    match (base.ends_with('/'), tail.starts_with('/')) {
        (true, true) => format!("{base}{}", &tail[1..]),
        (false, false) if !base.is_empty() => format!("{base}/{tail}"),
        _ => format!("{base}{tail}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_default_empty() {
        let record = MetadataRecord::from_json(br#"{"name":"Card"}"#).unwrap();
        assert_eq!(record.name, "Card");
        assert_eq!(record.description, "");
        assert_eq!(record.image, "");

        let record = MetadataRecord::from_json(br#"{"name":"Card","rarity":3}"#).unwrap();
        assert_eq!(record.name, "Card");
    }

    #[test]
    fn test_null_fields_stay_empty() {
        let record =
            MetadataRecord::from_json(br#"{"name":"Card","description":null,"image":"x"}"#)
                .unwrap();
        assert_eq!(record.name, "Card");
        assert_eq!(record.description, "");
        assert_eq!(record.image, "x");
    }

    #[test]
    fn test_keys_match_case_insensitively() {
        let record =
            MetadataRecord::from_json(br#"{"Name":"Card","DESCRIPTION":"d","iMaGe":"i"}"#).unwrap();
        assert_eq!(record.name, "Card");
        assert_eq!(record.description, "d");
        assert_eq!(record.image, "i");

        let record = MetadataRecord::from_json(br#"{"name":"first","Name":"second"}"#).unwrap();
        assert_eq!(record.name, "second");
    }

    #[test]
    fn test_rejects_non_objects() {
        assert!(MetadataRecord::from_json(br#""not json""#).is_err());
        assert!(MetadataRecord::from_json(b"[1,2,3]").is_err());
        assert!(MetadataRecord::from_json(br#"{"name":"Ca"#).is_err());
        assert!(MetadataRecord::from_json(b"not json").is_err());
        assert!(MetadataRecord::from_json(br#"{"name":5}"#).is_err());
        assert!(MetadataRecord::from_json(br#"{"Image":[]}"#).is_err());
        assert!(MetadataRecord::from_json(b"null").is_err());
    }

    #[test]
    fn test_pretty_output() {
        let record = MetadataRecord {
            name: "Card".to_string(),
            description: "d".to_string(),
            image: "http://x/i.png".to_string(),
        };
        let text = String::from_utf8(record.to_pretty_json().unwrap()).unwrap();
        assert_eq!(
            text,
            "{\n  \"name\": \"Card\",\n  \"description\": \"d\",\n  \"image\": \"http://x/i.png\"\n}\n"
        );
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("https://h/metadata/", "42.json"), "https://h/metadata/42.json");
        assert_eq!(join_url("https://h/metadata", "42.json"), "https://h/metadata/42.json");
        assert_eq!(join_url("https://h/", "/42.json"), "https://h/42.json");
        assert_eq!(join_url("", "42.json"), "42.json");
    }

    #[test]
    fn test_image_base_only_for_relative() {
        let record = MetadataRecord {
            image: "1.png".to_string(),
            ..MetadataRecord::default()
        };
        assert_eq!(
            record.with_image_base("https://cdn/images").image,
            "https://cdn/images/1.png"
        );

        let record = MetadataRecord {
            image: "ipfs://abc".to_string(),
            ..MetadataRecord::default()
        };
        assert_eq!(record.with_image_base("https://cdn/").image, "ipfs://abc");
        assert_eq!(
            MetadataRecord::default().with_image_base("https://cdn/").image,
            ""
        );
    }
}
