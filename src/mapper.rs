//! Field Mapper
//!
//! Projects a classified record onto the canonical post/comment schema. Each
//! platform has a projection table listing, per canonical attribute, the
//! source paths to try in order. Attributes missing from a platform's table
//! stay null for that platform.

use crate::error::{AgentError, Result};
use crate::record::{CandidateRecord, NewComment, NewPost, Platform, PlatformRecord, RawRecord};
use crate::transform;
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

type Path = &'static [&'static str];

/// Source paths for each canonical post attribute.
#[derive(Debug)]
pub struct PostProjection {
    pub title: &'static [Path],
    pub created_at: &'static [Path],
    pub asin: &'static [Path],
    pub subreddit: &'static [Path],
    pub url: &'static [Path],
    pub description: &'static [Path],
    pub channel_name: &'static [Path],
    pub country_of_origin: &'static [Path],
    pub price: &'static [Path],
    pub currency: &'static [Path],
    pub star_ratings: &'static [Path],
    pub total_rating: &'static [Path],
    /// Original identifiers usable as an idempotency key, best first.
    pub identity: &'static [Path],
}

/// Source paths for each canonical comment attribute.
#[derive(Debug)]
pub struct CommentProjection {
    pub container: &'static [Path],
    pub author_name: &'static [Path],
    pub content: &'static [Path],
    pub rating: &'static [Path],
    pub helpful_votes: &'static [Path],
    pub karma: &'static [Path],
    pub created_at: &'static [Path],
}

const NONE: &[Path] = &[];

const USER_AGE_GROUP: &[Path] = &[&["user_info", "age_group"]];
const USER_GENDER: &[Path] = &[&["user_info", "gender"]];
const USER_INCOME_BAND: &[Path] = &[&["user_info", "income_band"]];

pub static AMAZON_POST: PostProjection = PostProjection {
    title: &[&["product_details", "title"], &["product_title"], &["title"]],
    created_at: &[&["created_at"], &["date"], &["product_details", "date_first_available"]],
    asin: &[&["asin"], &["product_details", "asin"]],
    subreddit: NONE,
    url: &[&["url"], &["product_url"], &["product_details", "url"]],
    description: &[&["product_details", "description"], &["description"]],
    channel_name: NONE,
    country_of_origin: &[
        &["product_details", "Country of Origin"],
        &["product_details", "country_of_origin"],
        &["country_of_origin"],
        &["country"],
    ],
    price: &[&["product_details", "price"], &["price"]],
    currency: &[&["product_details", "currency"], &["currency"]],
    star_ratings: &[&["product_details", "star_ratings"], &["star_ratings"], &["rating"]],
    total_rating: &[&["product_details", "total_rating"], &["total_rating"], &["total_ratings"]],
    identity: &[&["asin"], &["product_details", "asin"], &["url"]],
};

pub static REDDIT_POST: PostProjection = PostProjection {
    title: &[&["post_title"], &["title"], &["content"]],
    created_at: &[&["created_at"], &["created_utc"], &["date"]],
    asin: NONE,
    subreddit: &[&["subreddit"]],
    url: &[&["url"], &["permalink"]],
    description: &[&["selftext"], &["description"]],
    channel_name: NONE,
    country_of_origin: NONE,
    price: NONE,
    currency: NONE,
    star_ratings: NONE,
    total_rating: NONE,
    identity: &[&["id"], &["post_id"], &["permalink"], &["url"]],
};

pub static YOUTUBE_POST: PostProjection = PostProjection {
    title: &[&["title"], &["video_title"]],
    created_at: &[&["published_at"], &["created_at"], &["upload_date"]],
    asin: NONE,
    subreddit: NONE,
    url: &[&["url"], &["video_url"]],
    description: &[&["description"]],
    channel_name: &[&["channel_name"]],
    country_of_origin: NONE,
    price: NONE,
    currency: NONE,
    star_ratings: NONE,
    total_rating: NONE,
    identity: &[&["video_id"], &["id"], &["url"], &["video_url"]],
};

pub static AMAZON_COMMENT: CommentProjection = CommentProjection {
    container: &[&["reviews"], &["comments"]],
    author_name: &[&["review_author"], &["author"], &["author_name"]],
    content: &[&["content"], &["review_text"], &["body"]],
    rating: &[&["review_star_rating"], &["rating"]],
    helpful_votes: &[&["helpful_vote_statement"], &["helpful_votes"]],
    karma: NONE,
    created_at: &[&["review_date"], &["date"], &["created_at"]],
};

pub static REDDIT_COMMENT: CommentProjection = CommentProjection {
    container: &[&["comments"]],
    author_name: &[&["author"], &["author_name"]],
    content: &[&["body"], &["content"], &["text"]],
    rating: NONE,
    helpful_votes: NONE,
    karma: &[&["karma"], &["score"]],
    created_at: &[&["created_at"], &["created_utc"]],
};

pub static YOUTUBE_COMMENT: CommentProjection = CommentProjection {
    container: &[&["comments"]],
    author_name: &[&["author_name"], &["author"]],
    content: &[&["text"], &["content"], &["body"]],
    rating: NONE,
    helpful_votes: NONE,
    karma: NONE,
    created_at: &[&["time"], &["published_at"], &["created_at"]],
};

pub fn post_projection(platform: Platform) -> &'static PostProjection {
    match platform {
        Platform::Amazon => &AMAZON_POST,
        Platform::Reddit => &REDDIT_POST,
        Platform::YouTube => &YOUTUBE_POST,
    }
}

pub fn comment_projection(platform: Platform) -> &'static CommentProjection {
    match platform {
        Platform::Amazon => &AMAZON_COMMENT,
        Platform::Reddit => &REDDIT_COMMENT,
        Platform::YouTube => &YOUTUBE_COMMENT,
    }
}

/// Map a classified record into a candidate post and its comments.
pub fn map_record(record: &PlatformRecord) -> Result<CandidateRecord> {
    let platform = record.platform();
    let raw = record.raw();
    let projection = post_projection(platform);

    let title = first(raw.fields(), projection.title, transform::text_value);
    if title.is_none() && source_label(raw).is_none() {
        return Err(AgentError::Mapping(format!(
            "{} record has neither a usable title nor a source label",
            platform
        )));
    }

    let raw_json = raw.to_json();
    let source_key = source_key(platform, raw, &raw_json);
    let mut post = NewPost::empty(platform, source_key, raw_json);
    post.title = title;
    post.created_at = first(raw.fields(), projection.created_at, transform::normalize_date);
    post.asin = first(raw.fields(), projection.asin, transform::text_value);
    post.subreddit = first(raw.fields(), projection.subreddit, transform::text_value);
    post.url = first(raw.fields(), projection.url, transform::text_value);
    post.description = first(raw.fields(), projection.description, transform::text_value);
    post.channel_name = first(raw.fields(), projection.channel_name, transform::text_value);
    post.country_of_origin = first(raw.fields(), projection.country_of_origin, transform::text_value);
    post.star_ratings = first(raw.fields(), projection.star_ratings, transform::star_rating_text);
    post.total_rating = first(raw.fields(), projection.total_rating, transform::parse_integer);

    let (price, embedded_currency) = projection
        .price
        .iter()
        .find_map(|path| raw.lookup(path))
        .map(transform::parse_price)
        .unwrap_or((None, None));
    post.price = price;
    post.currency = first(raw.fields(), projection.currency, transform::normalize_currency)
        .or(embedded_currency);

    let comments = map_comments(platform, raw);
    Ok(CandidateRecord { post, comments })
}

fn map_comments(platform: Platform, raw: &RawRecord) -> Vec<NewComment> {
    let projection = comment_projection(platform);
    let Some(entries) = projection
        .container
        .iter()
        .find_map(|path| raw.lookup(path))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    let mut comments = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        match entry.as_object() {
            Some(fields) => comments.push(map_comment(projection, fields)),
            None => warn!(platform = %platform, index, "skipping non-object comment entry"),
        }
    }
    comments
}

fn map_comment(projection: &CommentProjection, fields: &Map<String, Value>) -> NewComment {
    NewComment {
        author_name: first(fields, projection.author_name, transform::text_value),
        content: first(fields, projection.content, transform::text_value),
        rating: first(fields, projection.rating, transform::parse_decimal),
        helpful_votes: first(fields, projection.helpful_votes, transform::parse_integer),
        karma: first(fields, projection.karma, transform::parse_integer),
        created_at: first(fields, projection.created_at, transform::normalize_date),
        age_group: first(fields, USER_AGE_GROUP, transform::text_value),
        gender: first(fields, USER_GENDER, transform::text_value),
        income_band: first(fields, USER_INCOME_BAND, transform::text_value),
    }
}

/// First path that is present, transformed. A present but unparseable value
/// is null; later paths are only consulted when earlier ones are absent.
fn first<T>(fields: &Map<String, Value>, paths: &[Path], convert: fn(&Value) -> Option<T>) -> Option<T> {
    paths
        .iter()
        .find_map(|path| crate::record::lookup_in(fields, path))
        .and_then(convert)
}

fn source_label(raw: &RawRecord) -> Option<String> {
    raw.get("source").and_then(transform::text_value)
}

fn source_key(platform: Platform, raw: &RawRecord, raw_json: &str) -> String {
    let identity = post_projection(platform)
        .identity
        .iter()
        .find_map(|path| raw.lookup(path))
        .and_then(transform::text_value)
        .unwrap_or_else(|| Uuid::new_v5(&Uuid::NAMESPACE_OID, raw_json.as_bytes()).to_string());
    format!("{}:{}", platform, identity)
}
