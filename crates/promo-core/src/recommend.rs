use std::collections::HashSet;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::config::Config;
use crate::content::{
  Catalog,
  ContentItem
};

/// Shape of the recommended products
/// rail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecommendationPolicy {
  /// Maximum number of items returned.
  pub total:           usize,
  /// Random picks drawn from the ranked
  /// pool before the fill.
  pub top_tier:        usize,
  /// Worst leaderboard position still
  /// considered for the top tier.
  pub top_rank_cutoff: u32,
  /// Category matches allowed into the
  /// fill pool.
  pub category_cap:    usize
}

impl Default for RecommendationPolicy {
  fn default() -> Self {
    Self {
      total:           15,
      top_tier:        3,
      top_rank_cutoff: 20,
      category_cap:    10
    }
  }
}

impl RecommendationPolicy {
  pub fn from_config(
    cfg: &Config
  ) -> anyhow::Result<Self> {
    let mut policy = Self::default();
    if let Some(value) = cfg
      .get_parsed::<usize>(
        "recommend.total"
      )?
    {
      policy.total = value;
    }
    if let Some(value) = cfg
      .get_parsed::<usize>(
        "recommend.top_tier"
      )?
    {
      policy.top_tier = value;
    }
    if let Some(value) = cfg
      .get_parsed::<u32>(
        "recommend.rank_cutoff"
      )?
    {
      policy.top_rank_cutoff = value;
    }
    if let Some(value) = cfg
      .get_parsed::<usize>(
        "recommend.category_cap"
      )?
    {
      policy.category_cap = value;
    }
    Ok(policy)
  }
}

/// Picks the recommended products shown
/// under `current`.
///
/// The result starts with up to
/// `top_tier` random picks from the best
/// ranked items, followed by a shuffled
/// mix of category matches and
/// everything else. `current` never
/// appears in the output.
#[tracing::instrument(skip(current, catalog, policy, rng), fields(slug = %current.slug))]
pub fn select_recommendations<'a, R>(
  current: &ContentItem,
  catalog: &'a Catalog,
  policy: &RecommendationPolicy,
  rng: &mut R
) -> Vec<&'a ContentItem>
where
  R: Rng + ?Sized
{
  let slug = current.slug.as_str();

  let mut ranked: Vec<&ContentItem> =
    catalog
      .items()
      .iter()
      .filter(|item| item.slug != slug)
      .filter(|item| {
        item
          .position()
          .map(|rank| {
            rank <= policy.top_rank_cutoff
          })
          .unwrap_or(false)
      })
      .collect();
  ranked.sort_by_key(|item| {
    item.position()
  });

  ranked.shuffle(rng);
  ranked.truncate(policy.top_tier);
  let top: HashSet<&str> = ranked
    .iter()
    .map(|item| item.slug.as_str())
    .collect();

  let (category_matches, others): (
    Vec<&ContentItem>,
    Vec<&ContentItem>
  ) = catalog
    .items()
    .iter()
    .filter(|item| {
      item.slug != slug
        && !top
          .contains(item.slug.as_str())
    })
    .partition(|item| {
      item.shares_category_with(
        &current.categories
      )
    });

  debug!(
    top_tier = ranked.len(),
    category_matches = category_matches.len(),
    others = others.len(),
    "recommendation pools"
  );

  let mut fill: Vec<&ContentItem> =
    category_matches
      .into_iter()
      .take(policy.category_cap)
      .chain(others)
      .collect();
  fill.shuffle(rng);
  fill.truncate(
    policy
      .total
      .saturating_sub(ranked.len())
  );

  let mut out = ranked;
  out.extend(fill);
  out.truncate(policy.total);
  out
}
