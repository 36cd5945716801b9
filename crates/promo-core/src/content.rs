use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentItem {
    pub slug: String,

    pub title: String,

    /// Raw value as authored. Parsed when the validity window is evaluated.
    #[serde(default, alias = "validFromDate")]
    pub valid_from: Option<String>,

    #[serde(default, alias = "expiresOnDate")]
    pub expires_on: Option<String>,

    /// Leaderboard position; lower is better.
    #[serde(default, alias = "leaderboardPosition")]
    pub rank: Option<u32>,

    #[serde(default)]
    pub categories: Vec<String>,

    #[serde(default)]
    pub subcategories: Vec<String>,

    #[serde(default)]
    pub date: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub logo: Option<String>,

    #[serde(default)]
    pub images: Vec<String>,

    #[serde(default)]
    pub website: Option<String>,

    #[serde(default)]
    pub summary: Option<String>,
}

impl ContentItem {
    pub fn new(slug: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            title: title.into(),
            valid_from: None,
            expires_on: None,
            rank: None,
            categories: vec![],
            subcategories: vec![],
            date: None,
            tags: vec![],
            logo: None,
            images: vec![],
            website: None,
            summary: None,
        }
    }

    /// Rank, treating a zero position as unranked.
    pub fn position(&self) -> Option<u32> {
        self.rank.filter(|rank| *rank > 0)
    }

    pub fn shares_category_with(&self, categories: &[String]) -> bool {
        self.categories.iter().any(|cat| categories.contains(cat))
    }

    pub fn hero_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    items: Vec<ContentItem>,
    pub source: Option<PathBuf>,
}

impl Catalog {
    pub fn from_items(items: Vec<ContentItem>) -> anyhow::Result<Self> {
        let mut seen = HashSet::with_capacity(items.len());
        for item in &items {
            if !seen.insert(item.slug.as_str()) {
                return Err(anyhow!("duplicate slug in catalog: {}", item.slug));
            }
        }

        Ok(Self {
            items,
            source: None,
        })
    }

    /// Reads a JSON array export, or one item per line for `.jsonl` files.
    #[tracing::instrument(skip(path), fields(path = %path.display()))]
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;

        let is_lines = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("jsonl"))
            .unwrap_or(false);

        let items = if is_lines {
            parse_lines(&text, path)?
        } else {
            serde_json::from_str::<Vec<ContentItem>>(&text)
                .with_context(|| format!("failed to parse catalog {}", path.display()))?
        };

        let mut catalog = Self::from_items(items)
            .with_context(|| format!("invalid catalog {}", path.display()))?;
        catalog.source = Some(path.to_path_buf());

        info!(items = catalog.len(), "opened catalog");
        Ok(catalog)
    }

    pub fn get(&self, slug: &str) -> Option<&ContentItem> {
        self.items.iter().find(|item| item.slug == slug)
    }

    pub fn items(&self) -> &[ContentItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn parse_lines(text: &str, path: &Path) -> anyhow::Result<Vec<ContentItem>> {
    let mut out = Vec::new();
    for (line_num, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let item: ContentItem = serde_json::from_str(trimmed).with_context(|| {
            format!("failed to parse {} line {}", path.display(), line_num + 1)
        })?;
        debug!(slug = %item.slug, line = line_num + 1, "loaded catalog line");
        out.push(item);
    }
    Ok(out)
}
