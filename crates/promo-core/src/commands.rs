use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, instrument};

use crate::cli::Invocation;
use crate::config::SiteSettings;
use crate::content::{Catalog, ContentItem};
use crate::page::ProductPage;
use crate::recommend::{RecommendationPolicy, select_recommendations};
use crate::render::Renderer;
use crate::validity::classify_item;

pub fn known_command_names() -> Vec<&'static str> {
    vec!["show", "status", "recommend", "list", "help", "version"]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

/// Per-run inputs that would otherwise come from the environment.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub now: DateTime<Utc>,
    pub seed: Option<u64>,
    pub site: SiteSettings,
    pub policy: RecommendationPolicy,
}

impl RunContext {
    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

#[instrument(skip(catalog, ctx, renderer, inv), fields(command = %inv.command))]
pub fn dispatch(
    catalog: &Catalog,
    ctx: &RunContext,
    renderer: &Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    debug!(args = ?inv.command_args, now = %ctx.now, "dispatching command");

    match inv.command.as_str() {
        "list" => {
            renderer.print_catalog(catalog.items(), ctx.now, &ctx.site.date_format())?;
        }
        "show" => {
            let item = lookup(catalog, &inv.command_args)?;
            let page = ProductPage::build(
                item,
                catalog,
                &ctx.site,
                &ctx.policy,
                ctx.now,
                &mut ctx.rng(),
            );
            info!(slug = %item.slug, status = %page.window.status(), "rendering product page");
            renderer.print_page(&page)?;
        }
        "status" => {
            let item = lookup(catalog, &inv.command_args)?;
            let window = classify_item(item, ctx.now, &ctx.site.date_format());
            renderer.print_window(item, &window)?;
        }
        "recommend" => {
            let item = lookup(catalog, &inv.command_args)?;
            let picks = select_recommendations(item, catalog, &ctx.policy, &mut ctx.rng());
            info!(slug = %item.slug, count = picks.len(), "selected recommendations");
            renderer.print_recommendations(&picks)?;
        }
        "help" => print_help(),
        "version" => println!("promo {}", env!("CARGO_PKG_VERSION")),
        other => return Err(anyhow!("unknown command: {other}")),
    }

    Ok(())
}

fn lookup<'a>(catalog: &'a Catalog, args: &[String]) -> anyhow::Result<&'a ContentItem> {
    let slug = args
        .first()
        .ok_or_else(|| anyhow!("a product slug is required"))?;
    if args.len() > 1 {
        return Err(anyhow!("expected a single slug, got {}", args.len()));
    }
    catalog
        .get(slug)
        .ok_or_else(|| anyhow!("no product with slug {slug}"))
        .with_context(|| match &catalog.source {
            Some(path) => format!("catalog {}", path.display()),
            None => "in-memory catalog".to_string(),
        })
}

fn print_help() {
    println!("usage: promo [options] <command> [args]");
    println!();
    println!("commands:");
    println!("  list               every product with rank and deal status");
    println!("  show <slug>        product page with deal banner and recommendations");
    println!("  status <slug>      validity window details");
    println!("  recommend <slug>   recommended products only");
    println!("  help | version");
    println!();
    println!("options: --catalog PATH --site PATH --promorc PATH --now DATE --seed N");
    println!("         --rc KEY=VALUE (repeatable), rc.KEY=VALUE positional overrides");
}

#[cfg(test)]
mod tests {
    use super::{expand_command_abbrev, known_command_names, lookup};
    use crate::content::{Catalog, ContentItem};

    #[test]
    fn unique_prefix_expands() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("l", &known), Some("list"));
        assert_eq!(expand_command_abbrev("st", &known), Some("status"));
        assert_eq!(expand_command_abbrev("s", &known), None);
    }

    #[test]
    fn lookup_reports_missing_slug() {
        let catalog = Catalog::from_items(vec![ContentItem::new("acme", "Acme")]).expect("catalog");
        assert!(lookup(&catalog, &["acme".to_string()]).is_ok());
        let err = lookup(&catalog, &["nope".to_string()]).expect_err("missing");
        assert!(format!("{err:#}").contains("no product with slug nope"));
        assert!(lookup(&catalog, &[]).is_err());
    }
}
