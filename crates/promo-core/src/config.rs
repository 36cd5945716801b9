use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::str::FromStr;

use anyhow::{
  Context,
  anyhow
};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::datetime::{
  DEFAULT_LOCALE,
  DateFormat,
  parse_timezone
};

const SITE_CONFIG_FILE: &str =
  "promo-site.toml";
const SITE_CONFIG_ENV_VAR: &str =
  "PROMO_SITE_CONFIG";
const TIMEZONE_ENV_VAR: &str =
  "PROMO_TIMEZONE";
const PROMORC_ENV_VAR: &str =
  "PROMORC";
const DEFAULT_ALL_ARTICLES_PATH:
  &str = "/products";

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Config {
  /// Built-in defaults only, no rc
  /// file.
  pub fn defaults() -> Self {
    let mut cfg = Config {
      map:          HashMap::new(),
      loaded_files: vec![]
    };

    cfg.map.insert(
      "catalog.location".to_string(),
      "./catalog.json".to_string()
    );
    cfg.map.insert(
      "default.command".to_string(),
      "list".to_string()
    );
    cfg.map.insert(
      "color".to_string(),
      "on".to_string()
    );
    cfg
  }

  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Self::defaults();

    let promorc =
      resolve_promorc_path(rc_override)?;
    if let Some(path) = promorc {
      info!(promorc = %path.display(), "loading promorc");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no promorc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_parsed<T>(
    &self,
    key: &str
  ) -> anyhow::Result<Option<T>>
  where
    T: FromStr,
    T::Err: std::fmt::Display
  {
    let Some(raw) = self.map.get(key)
    else {
      return Ok(None);
    };

    raw
      .trim()
      .parse::<T>()
      .map(Some)
      .map_err(|err| {
        anyhow!(
          "invalid value for {key}: \
           {raw} ({err})"
        )
      })
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if line.is_empty()
        || line.starts_with('#')
      {
        continue;
      }

      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }

      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

/// Site-wide presentation settings.
#[derive(Debug, Clone)]
pub struct SiteSettings {
  pub locale:            String,
  pub timezone:          Tz,
  pub all_articles_path: String,
  pub source:            Option<PathBuf>
}

impl Default for SiteSettings {
  fn default() -> Self {
    Self {
      locale:            DEFAULT_LOCALE
        .to_string(),
      timezone:          chrono_tz::UTC,
      all_articles_path:
        DEFAULT_ALL_ARTICLES_PATH
          .to_string(),
      source:            None
    }
  }
}

#[derive(Debug, Default, Deserialize)]
struct SiteFile {
  locale:            Option<String>,
  timezone:          Option<String>,
  all_articles_path: Option<String>,
  site:              Option<SiteSection>
}

#[derive(Debug, Default, Deserialize)]
struct SiteSection {
  locale:            Option<String>,
  timezone:          Option<String>,
  all_articles_path: Option<String>
}

impl SiteSettings {
  #[tracing::instrument(skip(
    cfg,
    site_override
  ))]
  pub fn resolve(
    cfg: &Config,
    site_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut settings = Self::default();

    if let Some(path) =
      site_config_path(site_override)
    {
      settings.merge_file(&path)?;
    }

    if let Some(locale) =
      cfg.get("site.locale")
    {
      settings.locale = locale;
    }
    if let Some(raw) =
      cfg.get("site.timezone")
      && let Some(tz) =
        parse_timezone(&raw, "rc")
    {
      settings.timezone = tz;
    }
    if let Some(path) =
      cfg.get("site.all_articles_path")
    {
      settings.all_articles_path = path;
    }

    if let Ok(raw) =
      std::env::var(TIMEZONE_ENV_VAR)
      && let Some(tz) = parse_timezone(
        &raw,
        TIMEZONE_ENV_VAR
      )
    {
      settings.timezone = tz;
    }

    info!(
      locale = %settings.locale,
      timezone = %settings.timezone,
      "resolved site settings"
    );
    Ok(settings)
  }

  pub fn date_format(
    &self
  ) -> DateFormat {
    DateFormat::new(
      self.timezone,
      &self.locale
    )
  }

  fn merge_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let raw =
      fs::read_to_string(path)
        .with_context(|| {
          format!(
            "failed reading site config \
             {}",
            path.display()
          )
        })?;

    let parsed = toml::from_str::<
      SiteFile
    >(&raw)
    .with_context(|| {
      format!(
        "failed parsing site config {}",
        path.display()
      )
    })?;

    let section =
      parsed.site.unwrap_or_default();

    if let Some(locale) = parsed
      .locale
      .or(section.locale)
    {
      self.locale = locale;
    }

    if let Some(raw_tz) = parsed
      .timezone
      .or(section.timezone)
    {
      let source = format!(
        "file:{}",
        path.display()
      );
      self.timezone =
        parse_timezone(&raw_tz, &source)
          .ok_or_else(|| {
            anyhow!(
              "invalid timezone \
               {raw_tz} in {}",
              path.display()
            )
          })?;
    }

    if let Some(all) = parsed
      .all_articles_path
      .or(section.all_articles_path)
    {
      self.all_articles_path = all;
    }

    self.source =
      Some(path.to_path_buf());
    Ok(())
  }
}

fn site_config_path(
  override_path: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(expand_tilde(path));
  }

  if let Ok(raw) =
    std::env::var(SITE_CONFIG_ENV_VAR)
  {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(expand_tilde(
        Path::new(trimmed)
      ));
    }
  }

  let candidate = std::env::current_dir()
    .ok()?
    .join(SITE_CONFIG_FILE);
  if candidate.exists() {
    Some(candidate)
  } else {
    trace!(
      file = %candidate.display(),
      "site config file not found"
    );
    None
  }
}

#[tracing::instrument(skip(
  cfg,
  override_path
))]
pub fn resolve_catalog_path(
  cfg: &Config,
  override_path: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let path = if let Some(path) =
    override_path
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("catalog.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    return Err(anyhow!(
      "no catalog location \
       configured"
    ));
  };

  if !path.exists() {
    return Err(anyhow!(
      "catalog not found at {}",
      path.display()
    ));
  }

  Ok(path)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_promorc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(promorc_env) =
    std::env::var(PROMORC_ENV_VAR)
  {
    if promorc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      promorc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping ~/.promorc"
    );
    return Ok(None);
  };
  let candidate = home.join(".promorc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::{
    Config,
    SiteSettings
  };

  #[test]
  fn rc_file_with_include_and_overrides()
  {
    let dir = tempfile::tempdir()
      .expect("tempdir");
    let extra = dir.path().join("extra.rc");
    fs::write(
      &extra,
      "recommend.total = 9\n"
    )
    .expect("write include");
    let rc = dir.path().join("promorc");
    fs::write(
      &rc,
      "# site\nsite.locale = fr-FR # inline\ninclude extra.rc\n"
    )
    .expect("write rc");

    let mut cfg =
      Config::load(Some(&rc))
        .expect("load rc");
    assert_eq!(
      cfg.get("site.locale").as_deref(),
      Some("fr-FR")
    );
    assert_eq!(
      cfg
        .get_parsed::<usize>(
          "recommend.total"
        )
        .expect("parse"),
      Some(9)
    );

    cfg.apply_overrides(vec![(
      "rc.color".to_string(),
      "off".to_string()
    )]);
    assert_eq!(
      cfg.get("color").as_deref(),
      Some("off")
    );
    assert_eq!(cfg.loaded_files.len(), 2);
  }

  #[test]
  fn rejects_lines_without_equals() {
    let dir = tempfile::tempdir()
      .expect("tempdir");
    let rc = dir.path().join("promorc");
    fs::write(&rc, "nonsense\n")
      .expect("write rc");
    assert!(
      Config::load(Some(&rc)).is_err()
    );
  }

  #[test]
  fn bad_numeric_value_is_an_error() {
    let mut cfg = Config::defaults();
    cfg.apply_overrides(vec![(
      "recommend.total".to_string(),
      "many".to_string()
    )]);
    assert!(
      cfg
        .get_parsed::<usize>(
          "recommend.total"
        )
        .is_err()
    );
  }

  #[test]
  fn site_file_sets_locale_and_path() {
    let dir = tempfile::tempdir()
      .expect("tempdir");
    let site =
      dir.path().join("site.toml");
    fs::write(
      &site,
      "[site]\nlocale = \"de-DE\"\nall_articles_path = \"/deals\"\n"
    )
    .expect("write site");

    let settings = SiteSettings::resolve(
      &Config::defaults(),
      Some(&site)
    )
    .expect("resolve site");
    assert_eq!(settings.locale, "de-DE");
    assert_eq!(
      settings.all_articles_path,
      "/deals"
    );
    assert_eq!(
      settings.date_format().locale_tag,
      "de-DE"
    );
  }

  #[test]
  fn rc_locale_wins_over_site_file() {
    let dir = tempfile::tempdir()
      .expect("tempdir");
    let site =
      dir.path().join("site.toml");
    fs::write(
      &site,
      "locale = \"de-DE\"\n"
    )
    .expect("write site");

    let mut cfg = Config::defaults();
    cfg.apply_overrides(vec![(
      "site.locale".to_string(),
      "en-GB".to_string()
    )]);
    let settings = SiteSettings::resolve(
      &cfg,
      Some(&site)
    )
    .expect("resolve site");
    assert_eq!(settings.locale, "en-GB");
  }
}
