//! Generate a synthetic social media export
//!
//! Run with: cargo run --bin generate_sample_data -- --count 10000 --output sample_data.json

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use clap::Parser;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "generate_sample_data")]
#[command(about = "Write a synthetic Amazon/Reddit/YouTube export as a JSON array")]
struct Args {
    /// Number of records to generate
    #[arg(short, long, default_value_t = 10_000)]
    count: usize,

    /// RNG seed, for reproducible files
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Output path
    #[arg(short, long, default_value = "sample_data.json")]
    output: PathBuf,
}

const WORDS: &[&str] = &[
    "battery", "camera", "quality", "delivery", "price", "sound", "screen", "design", "comfort", "value", "update",
    "support", "kitchen", "garden", "travel", "coffee", "guitar", "laptop", "review", "season", "tutorial",
    "budget", "premium", "durable", "compact", "wireless", "classic", "simple", "honest", "amazing",
];
const FIRST_NAMES: &[&str] = &["Alex", "Sam", "Priya", "Chen", "Maria", "Jordan", "Aisha", "Lukas", "Emma", "Ravi"];
const LAST_NAMES: &[&str] = &["Smith", "Garcia", "Kumar", "Wang", "Müller", "Okafor", "Silva", "Novak", "Brown"];
const COUNTRIES: &[&str] = &["USA", "China", "India", "Germany", "Japan", "Vietnam", "Mexico", "Italy", "Brazil"];
const SUBREDDITS: &[&str] = &["technology", "cooking", "gadgets", "books", "fitness", "gaming", "travel", "rust"];
const CHANNELS: &[&str] = &["Tech Corner", "Daily Recipes", "Gear Lab", "Travel Diaries", "Code Academy"];
const AGE_GROUPS: &[&str] = &["18-24", "25-34", "35-44", "Unknown"];
const GENDERS: &[&str] = &["Male", "Female", "Unknown"];
const INCOME_BANDS: &[&str] = &["Lower", "Middle", "Upper"];

struct Generator {
    rng: StdRng,
    year_start: NaiveDate,
}

impl Generator {
    fn pick(&mut self, items: &[&'static str]) -> &'static str {
        items.choose(&mut self.rng).copied().unwrap_or_default()
    }

    fn sentence(&mut self, min: usize, max: usize) -> String {
        let len = self.rng.gen_range(min..=max);
        let words: Vec<&str> = (0..len).map(|_| self.pick(WORDS)).collect();
        let mut sentence = words.join(" ");
        if let Some(first) = sentence.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        sentence.push('.');
        sentence
    }

    fn paragraph(&mut self) -> String {
        let sentences = self.rng.gen_range(2..=4);
        (0..sentences).map(|_| self.sentence(5, 12)).collect::<Vec<_>>().join(" ")
    }

    fn name(&mut self) -> String {
        format!("{} {}", self.pick(FIRST_NAMES), self.pick(LAST_NAMES))
    }

    fn username(&mut self) -> String {
        format!("{}_{}", self.pick(WORDS), self.rng.gen_range(10..9999))
    }

    fn date(&mut self) -> NaiveDate {
        self.year_start + Duration::days(self.rng.gen_range(0..365))
    }

    fn datetime(&mut self) -> String {
        let date = self.date();
        let (h, m, s) = (self.rng.gen_range(0..24), self.rng.gen_range(0..60), self.rng.gen_range(0..60));
        match date.and_hms_opt(h, m, s) {
            Some(datetime) => datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => date.to_string(),
        }
    }

    fn token(&mut self, len: usize) -> String {
        const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
        (0..len)
            .map(|_| ALPHABET[self.rng.gen_range(0..ALPHABET.len())] as char)
            .collect()
    }

    fn user_info(&mut self) -> Value {
        json!({
            "age_group": self.pick(AGE_GROUPS),
            "gender": self.pick(GENDERS),
            "income_band": self.pick(INCOME_BANDS),
        })
    }

    fn amazon(&mut self) -> Value {
        let reviews: Vec<Value> = (0..self.rng.gen_range(1..=5))
            .map(|_| {
                json!({
                    "review_author": self.name(),
                    "content": self.paragraph(),
                    "review_star_rating": self.rng.gen_range(1..=5u8).to_string(),
                    "review_date": format!("Reviewed in the United States on {}", self.date().format("%-d %B %Y")),
                    "helpful_vote_statement": format!("{} people found this helpful", self.rng.gen_range(1..=50)),
                    "user_info": self.user_info(),
                })
            })
            .collect();
        json!({
            "source": "amazon_reviews_1",
            "asin": self.token(10),
            "product_details": {
                "title": self.sentence(3, 7),
                "Country of Origin": self.pick(COUNTRIES),
                "price": format!("${}.{:02}", self.rng.gen_range(5..2000), self.rng.gen_range(0..100)),
                "currency": "USD",
                "star_ratings": format!("{:.1} out of 5 stars", self.rng.gen_range(10..=50) as f64 / 10.0),
                "total_rating": self.rng.gen_range(1..=500),
            },
            "reviews": reviews,
        })
    }

    fn reddit(&mut self) -> Value {
        let comments: Vec<Value> = (0..self.rng.gen_range(1..=3))
            .map(|_| {
                json!({
                    "body": self.paragraph(),
                    "author": self.username(),
                    "karma": self.rng.gen_range(-5..=50),
                    "created_at": self.date().to_string(),
                    "user_info": self.user_info(),
                })
            })
            .collect();
        json!({
            "source": "reddit_1",
            "id": self.token(7).to_lowercase(),
            "subreddit": self.pick(SUBREDDITS),
            "created_at": self.date().to_string(),
            "content": self.sentence(4, 10),
            "comments": comments,
        })
    }

    fn youtube(&mut self) -> Value {
        let comments: Vec<Value> = (0..self.rng.gen_range(2..=6))
            .map(|_| {
                json!({
                    "text": self.paragraph(),
                    "author_name": self.username(),
                    "time": self.datetime(),
                    "user_info": self.user_info(),
                })
            })
            .collect();
        json!({
            "source": "youtube_1",
            "video_id": self.token(11),
            "title": self.sentence(3, 8),
            "published_at": self.datetime(),
            "description": self.paragraph(),
            "channel_name": self.pick(CHANNELS),
            "comments": comments,
        })
    }

    fn record(&mut self) -> Value {
        match self.rng.gen_range(0..3) {
            0 => self.amazon(),
            1 => self.reddit(),
            _ => self.youtube(),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut generator = Generator {
        rng: StdRng::seed_from_u64(args.seed),
        year_start: NaiveDate::from_ymd_opt(2024, 1, 1).context("invalid start date")?,
    };

    let records: Vec<Value> = (0..args.count).map(|_| generator.record()).collect();

    let file = File::create(&args.output).with_context(|| format!("cannot create {}", args.output.display()))?;
    serde_json::to_writer(BufWriter::new(file), &records)?;
    println!("Wrote {} records to {}", records.len(), args.output.display());
    Ok(())
}
