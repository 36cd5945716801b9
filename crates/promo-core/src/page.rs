use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, warn};

use crate::config::SiteSettings;
use crate::content::{Catalog, ContentItem};
use crate::datetime::{DateFormat, parse_content_date};
use crate::recommend::{RecommendationPolicy, select_recommendations};
use crate::validity::{DateWindow, classify_item};

/// Everything the product page shows, evaluated once per render.
#[derive(Debug, Clone)]
pub struct ProductPage<'a> {
    pub item: &'a ContentItem,
    pub window: DateWindow,
    pub published: Option<String>,
    pub recommendations: Vec<&'a ContentItem>,
    pub all_articles_path: String,
}

impl<'a> ProductPage<'a> {
    #[tracing::instrument(skip_all, fields(slug = %item.slug))]
    pub fn build<R>(
        item: &'a ContentItem,
        catalog: &'a Catalog,
        site: &SiteSettings,
        policy: &RecommendationPolicy,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Self
    where
        R: Rng + ?Sized,
    {
        let format = site.date_format();
        let window = classify_item(item, now, &format);
        let recommendations = select_recommendations(item, catalog, policy, rng);
        let published = item
            .date
            .as_deref()
            .and_then(|raw| format_published(raw, &format));

        debug!(
            status = %window.status(),
            recommendations = recommendations.len(),
            "built product page"
        );

        Self {
            item,
            window,
            published,
            recommendations,
            all_articles_path: site.all_articles_path.clone(),
        }
    }

    /// First category, used for the "more deals" link.
    pub fn lead_category(&self) -> Option<&str> {
        self.item.categories.first().map(String::as_str)
    }
}

fn format_published(raw: &str, format: &DateFormat) -> Option<String> {
    match parse_content_date(raw, &format.timezone) {
        Ok(dt) => Some(format.format_long(dt)),
        Err(err) => {
            warn!(date = %raw, error = %err, "unreadable publication date");
            None
        }
    }
}
