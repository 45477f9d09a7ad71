//! Raw and canonical record types
//!
//! A [`RawRecord`] is the untyped object exactly as it appears in the export.
//! After classification it becomes a [`PlatformRecord`], and the field mapper
//! turns that into a [`CandidateRecord`]: an unkeyed post plus its comments,
//! ready for the batch loader.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// One source record, as received. Only presence checks are made on it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    fields: Map<String, Value>,
}

impl RawRecord {
    /// Wrap a JSON value; only objects are records.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Walk a nested path of object keys. Null values count as absent.
    pub fn lookup(&self, path: &[&str]) -> Option<&Value> {
        lookup_in(&self.fields, path)
    }

    pub fn has(&self, path: &[&str]) -> bool {
        self.lookup(path).is_some()
    }

    /// Verbatim serialization kept for audit.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.fields).unwrap_or_else(|_| "{}".to_string())
    }
}

pub(crate) fn lookup_in<'a>(fields: &'a Map<String, Value>, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = fields.get(*first)?;
    for key in rest {
        current = current.as_object()?.get(*key)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Amazon,
    Reddit,
    YouTube,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Amazon, Platform::Reddit, Platform::YouTube];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Amazon => "amazon",
            Platform::Reddit => "reddit",
            Platform::YouTube => "youtube",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "amazon" => Ok(Platform::Amazon),
            "reddit" => Ok(Platform::Reddit),
            "youtube" => Ok(Platform::YouTube),
            other => Err(format!("unknown platform '{}'", other)),
        }
    }
}

/// A raw record tagged with the platform it was classified as.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformRecord {
    Amazon(RawRecord),
    Reddit(RawRecord),
    YouTube(RawRecord),
}

impl PlatformRecord {
    pub fn tag(platform: Platform, raw: RawRecord) -> Self {
        match platform {
            Platform::Amazon => PlatformRecord::Amazon(raw),
            Platform::Reddit => PlatformRecord::Reddit(raw),
            Platform::YouTube => PlatformRecord::YouTube(raw),
        }
    }

    pub fn platform(&self) -> Platform {
        match self {
            PlatformRecord::Amazon(_) => Platform::Amazon,
            PlatformRecord::Reddit(_) => Platform::Reddit,
            PlatformRecord::YouTube(_) => Platform::YouTube,
        }
    }

    pub fn raw(&self) -> &RawRecord {
        match self {
            PlatformRecord::Amazon(raw) | PlatformRecord::Reddit(raw) | PlatformRecord::YouTube(raw) => raw,
        }
    }
}

/// Canonical post before the store assigns its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPost {
    pub source: Platform,
    /// Idempotency key, `<platform>:<original identifier>`.
    pub source_key: String,
    pub title: Option<String>,
    pub created_at: Option<String>,
    pub asin: Option<String>,
    pub subreddit: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub channel_name: Option<String>,
    pub country_of_origin: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub star_ratings: Option<String>,
    pub total_rating: Option<i64>,
    pub raw_json: String,
}

impl NewPost {
    pub fn empty(source: Platform, source_key: String, raw_json: String) -> Self {
        Self {
            source,
            source_key,
            title: None,
            created_at: None,
            asin: None,
            subreddit: None,
            url: None,
            description: None,
            channel_name: None,
            country_of_origin: None,
            price: None,
            currency: None,
            star_ratings: None,
            total_rating: None,
            raw_json,
        }
    }
}

/// Canonical comment; `post_id` is bound by the loader inside the chunk transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewComment {
    pub author_name: Option<String>,
    pub content: Option<String>,
    pub rating: Option<f64>,
    pub helpful_votes: Option<i64>,
    pub karma: Option<i64>,
    pub created_at: Option<String>,
    pub age_group: Option<String>,
    pub gender: Option<String>,
    pub income_band: Option<String>,
}

/// One post with the comments that must be written after it.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRecord {
    pub post: NewPost,
    pub comments: Vec<NewComment>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_nested_and_null() {
        let raw = RawRecord::from_value(json!({
            "product_details": {"Country of Origin": "India", "price": null},
            "asin": "B001"
        }))
        .unwrap();
        assert_eq!(
            raw.lookup(&["product_details", "Country of Origin"]),
            Some(&json!("India"))
        );
        assert!(raw.lookup(&["product_details", "price"]).is_none());
        assert!(raw.lookup(&["asin", "deeper"]).is_none());
        assert!(raw.has(&["asin"]));
    }

    #[test]
    fn test_non_object_is_not_a_record() {
        assert!(RawRecord::from_value(json!([1, 2])).is_none());
        assert!(RawRecord::from_value(json!("text")).is_none());
    }

    #[test]
    fn test_raw_json_keeps_key_order() {
        let raw = RawRecord::from_value(json!({"z": 1, "a": 2})).unwrap();
        assert_eq!(raw.to_json(), r#"{"z":1,"a":2}"#);
    }

    #[test]
    fn test_platform_round_trip_through_str() {
        for platform in Platform::ALL {
            assert_eq!(platform.as_str().parse::<Platform>().unwrap(), platform);
        }
        assert!("myspace".parse::<Platform>().is_err());
    }
}
