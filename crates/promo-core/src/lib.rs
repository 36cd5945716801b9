pub mod cli;
pub mod commands;
pub mod config;
pub mod content;
pub mod datetime;
pub mod page;
pub mod recommend;
pub mod render;
pub mod validity;

use std::ffi::OsString;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting promo CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.promorc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let inv = cli::Invocation::parse(
    &cfg, cli.rest
  )?;
  let renderer =
    render::Renderer::new(&cfg)?;

  if matches!(
    inv.command.as_str(),
    "help" | "version"
  ) {
    return commands::dispatch(
      &content::Catalog::default(),
      &commands::RunContext {
        now:    Utc::now(),
        seed:   cli.seed,
        site:   config::SiteSettings::default(),
        policy: recommend::RecommendationPolicy::default()
      },
      &renderer,
      inv
    );
  }

  let site =
    config::SiteSettings::resolve(
      &cfg,
      cli.site.as_deref()
    )
    .context(
      "failed to resolve site \
       settings"
    )?;

  let now = match cli.now.as_deref() {
    | Some(raw) => {
      datetime::parse_date_expr(
        raw,
        Utc::now(),
        &site.timezone
      )
      .context("invalid --now value")?
    }
    | None => Utc::now()
  };

  let policy = recommend::RecommendationPolicy::from_config(&cfg)?;

  let catalog_path =
    config::resolve_catalog_path(
      &cfg,
      cli.catalog.as_deref()
    )
    .context(
      "failed to resolve catalog \
       location"
    )?;

  let catalog =
    content::Catalog::open(
      &catalog_path
    )
    .with_context(|| {
      format!(
        "failed to open catalog at {}",
        catalog_path.display()
      )
    })?;

  let ctx = commands::RunContext {
    now,
    seed: cli.seed,
    site,
    policy
  };

  commands::dispatch(
    &catalog, &ctx, &renderer, inv
  )?;

  info!("done");
  Ok(())
}
