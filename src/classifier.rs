//! Record Classifier
//!
//! Determines the source platform of one raw record from a small ordered set
//! of discriminator fields. Priority is amazon, then reddit, then youtube; the
//! first discriminator present wins.

use crate::error::{AgentError, Result};
use crate::record::{Platform, PlatformRecord, RawRecord};

/// Amazon product block: country of origin or price inside `product_details`.
const AMAZON_PRODUCT_BLOCK: &[&[&str]] = &[
    &["product_details", "Country of Origin"],
    &["product_details", "country_of_origin"],
    &["product_details", "price"],
];

const AMAZON_COUNTRY_FIELDS: &[&str] = &["country_of_origin", "country"];

fn is_amazon(raw: &RawRecord) -> bool {
    if raw.has(&["asin"]) {
        return true;
    }
    if AMAZON_PRODUCT_BLOCK.iter().any(|path| raw.has(path)) {
        return true;
    }
    raw.has(&["price"]) && AMAZON_COUNTRY_FIELDS.iter().any(|key| raw.has(&[*key]))
}

fn is_reddit(raw: &RawRecord) -> bool {
    raw.has(&["subreddit"])
}

fn is_youtube(raw: &RawRecord) -> bool {
    raw.has(&["channel_name"])
}

/// Return the platform of `raw`, or `UnclassifiableRecord` if no discriminator matches.
pub fn classify(raw: &RawRecord) -> Result<Platform> {
    let checks: [(Platform, fn(&RawRecord) -> bool); 3] = [
        (Platform::Amazon, is_amazon),
        (Platform::Reddit, is_reddit),
        (Platform::YouTube, is_youtube),
    ];

    checks
        .iter()
        .find(|(_, check)| check(raw))
        .map(|(platform, _)| *platform)
        .ok_or_else(|| {
            let mut keys: Vec<&str> = raw.fields().keys().map(String::as_str).collect();
            keys.truncate(8);
            AgentError::UnclassifiableRecord(format!(
                "no platform discriminator among fields [{}]",
                keys.join(", ")
            ))
        })
}

/// Classify and tag in one step.
pub fn tag(raw: RawRecord) -> Result<PlatformRecord> {
    let platform = classify(&raw)?;
    Ok(PlatformRecord::tag(platform, raw))
}
