use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Duration,
  Locale,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  TimeZone,
  Utc
};
use chrono_tz::Tz;
use regex::Regex;

pub const DEFAULT_LOCALE: &str =
  "en-US";

const MILLIS_PER_DAY: f64 =
  86_400_000.0;

const DAY_START_STEP: Duration =
  Duration::minutes(15);

/// Locale and timezone used to print
/// boundary dates. Passed explicitly
/// to every formatting call.
#[derive(Debug, Clone)]
pub struct DateFormat {
  pub timezone:   Tz,
  pub locale_tag: String,
  locale:         Locale
}

impl Default for DateFormat {
  fn default() -> Self {
    Self::new(
      chrono_tz::UTC,
      DEFAULT_LOCALE
    )
  }
}

impl DateFormat {
  pub fn new(
    timezone: Tz,
    locale_tag: &str
  ) -> Self {
    let (locale, locale_tag) =
      match resolve_locale(locale_tag)
      {
        | Some(locale) => {
          (
            locale,
            locale_tag
              .trim()
              .to_string()
          )
        }
        | None => {
          tracing::warn!(
            locale = %locale_tag,
            fallback = DEFAULT_LOCALE,
            "unsupported locale; using fallback"
          );
          (
            Locale::en_US,
            DEFAULT_LOCALE.to_string()
          )
        }
      };

    Self {
      timezone,
      locale_tag,
      locale
    }
  }

  /// Long date in the site locale,
  /// e.g. `October 19, 2026`.
  #[must_use]
  pub fn format_long(
    &self,
    dt: DateTime<Utc>
  ) -> String {
    dt.with_timezone(&self.timezone)
      .format_localized(
        long_pattern(self.locale),
        self.locale
      )
      .to_string()
  }
}

fn resolve_locale(
  tag: &str
) -> Option<Locale> {
  let normalized = tag
    .trim()
    .replace('_', "-")
    .to_ascii_lowercase();

  match normalized.as_str() {
    | "en" | "en-us" => {
      Some(Locale::en_US)
    }
    | "en-gb" => Some(Locale::en_GB),
    | "en-au" => Some(Locale::en_AU),
    | "en-ca" => Some(Locale::en_CA),
    | "fr" | "fr-fr" => {
      Some(Locale::fr_FR)
    }
    | "de" | "de-de" => {
      Some(Locale::de_DE)
    }
    | "es" | "es-es" => {
      Some(Locale::es_ES)
    }
    | "es-mx" => Some(Locale::es_MX),
    | "it" | "it-it" => {
      Some(Locale::it_IT)
    }
    | "nl" | "nl-nl" => {
      Some(Locale::nl_NL)
    }
    | "pt" | "pt-pt" => {
      Some(Locale::pt_PT)
    }
    | "pt-br" => Some(Locale::pt_BR),
    | _ => None
  }
}

fn long_pattern(
  locale: Locale
) -> &'static str {
  match locale {
    | Locale::en_US | Locale::en_CA => {
      "%B %-d, %Y"
    }
    | Locale::de_DE => "%-d. %B %Y",
    | Locale::es_ES
    | Locale::es_MX
    | Locale::pt_PT
    | Locale::pt_BR => "%-d de %B de %Y",
    | _ => "%-d %B %Y"
  }
}

pub fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::debug!(
        source,
        timezone = %trimmed,
        "resolved site timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Signed distance from `now` to
/// `target` in fractional days.
#[must_use]
pub fn days_until(
  target: DateTime<Utc>,
  now: DateTime<Utc>
) -> f64 {
  (target - now).num_milliseconds()
    as f64
    / MILLIS_PER_DAY
}

fn to_utc_from_local(
  local_naive: NaiveDateTime,
  tz: &Tz,
  context: &str
) -> anyhow::Result<DateTime<Utc>> {
  match tz
    .from_local_datetime(&local_naive)
  {
    | LocalResult::Single(local_dt) => {
      Ok(local_dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::warn!(
        context,
        first = %first,
        second = %second,
        "ambiguous local datetime; using earliest"
      );
      let chosen = if first <= second {
        first
      } else {
        second
      };
      Ok(chosen.with_timezone(&Utc))
    }
    | LocalResult::None => {
      Err(anyhow!(
        "local datetime does not \
         exist in timezone {tz}: \
         {context}"
      ))
    }
  }
}

/// First instant of `date` in `tz`.
/// Where a DST jump skips midnight the
/// day starts at the first local time
/// that exists.
fn start_of_local_day(
  date: NaiveDate,
  tz: &Tz
) -> anyhow::Result<DateTime<Utc>> {
  let midnight = date
    .and_hms_opt(0, 0, 0)
    .ok_or_else(|| {
      anyhow!(
        "failed to construct \
         midnight for {date}"
      )
    })?;

  let mut candidate = midnight;
  while candidate.date() == date {
    if let Some(local_dt) = tz
      .from_local_datetime(&candidate)
      .earliest()
    {
      if candidate != midnight {
        tracing::debug!(
          %date,
          start = %local_dt,
          "midnight skipped by DST; using first local time"
        );
      }
      return Ok(
        local_dt.with_timezone(&Utc)
      );
    }
    candidate += DAY_START_STEP;
  }

  Err(anyhow!(
    "no local time exists on {date} \
     in timezone {tz}"
  ))
}

/// Parses an absolute date as found in
/// content: RFC 3339, `YYYY-MM-DD`
/// (local midnight), `YYYY-MM-DDTHH:MM`
/// or `YYYYMMDDTHHMMSSZ`.
pub fn parse_content_date(
  input: &str,
  tz: &Tz
) -> anyhow::Result<DateTime<Utc>> {
  let token = input.trim();
  if token.is_empty() {
    return Err(anyhow!(
      "empty date value"
    ));
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.with_timezone(&Utc));
  }

  if let Ok(ndt) =
    NaiveDateTime::parse_from_str(
      token,
      "%Y%m%dT%H%M%SZ"
    )
  {
    return Ok(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc));
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return start_of_local_day(
      date, tz
    );
  }

  for fmt in [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M"
  ] {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return to_utc_from_local(
        ndt, tz, fmt
      );
    }
  }

  Err(anyhow!(
    "unrecognized date value: {input}"
  ))
  .with_context(|| {
    "supported formats: RFC3339, \
     YYYY-MM-DD, YYYY-MM-DDTHH:MM[:SS], \
     YYYY-MM-DD HH:MM, YYYYMMDDTHHMMSSZ"
  })
}

/// Content dates plus the relative
/// forms accepted on the command line:
/// `now`, `today`, `tomorrow`,
/// `yesterday` and `+Nd`/`-Nh`/`+Nm`.
#[tracing::instrument(skip(now, tz), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  now: DateTime<Utc>,
  tz: &Tz
) -> anyhow::Result<DateTime<Utc>> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "now" => return Ok(now),
    | "today" => {
      return start_of_local_day(
        now
          .with_timezone(tz)
          .date_naive(),
        tz
      );
    }
    | "tomorrow" => {
      let today = parse_date_expr(
        "today", now, tz
      )?;
      return Ok(
        today + Duration::days(1)
      );
    }
    | "yesterday" => {
      let today = parse_date_expr(
        "today", now, tz
      )?;
      return Ok(
        today - Duration::days(1)
      );
    }
    | _ => {}
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dhm])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(token)
  {
    let sign = caps
      .name("sign")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative sign")
      })?;
    let num: i64 = caps
      .name("num")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!(
          "missing relative amount"
        )
      })?
      .parse()
      .context(
        "invalid relative number"
      )?;
    let unit = caps
      .name("unit")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative unit")
      })?;

    let duration = match unit {
      | "d" => Duration::try_days(num),
      | "h" => {
        Duration::try_hours(num)
      }
      | "m" => {
        Duration::try_minutes(num)
      }
      | _ => {
        return Err(anyhow!(
          "unknown relative unit: \
           {unit}"
        ))
      }
    }
    .ok_or_else(|| {
      anyhow!(
        "relative offset out of \
         range: {token}"
      )
    })?;

    let shifted = if sign == "-" {
      now.checked_sub_signed(duration)
    } else {
      now.checked_add_signed(duration)
    };
    return shifted.ok_or_else(|| {
      anyhow!(
        "relative offset out of \
         range: {token}"
      )
    });
  }

  parse_content_date(token, tz)
    .context(
      "also accepted: now, today, \
       tomorrow, yesterday, \
       +Nd/+Nh/+Nm"
    )
}

#[cfg(test)]
mod tests {
  use chrono::{
    TimeZone,
    Utc
  };

  use super::{
    DateFormat,
    days_until,
    parse_content_date,
    parse_date_expr
  };

  #[test]
  fn formats_long_us_date() {
    let fmt = DateFormat::default();
    let dt = Utc
      .with_ymd_and_hms(
        2026, 10, 9, 15, 0, 0
      )
      .single()
      .expect("valid dt");
    assert_eq!(
      fmt.format_long(dt),
      "October 9, 2026"
    );
  }

  #[test]
  fn formats_localized_month_names() {
    let fmt = DateFormat::new(
      chrono_tz::UTC,
      "fr-FR"
    );
    let dt = Utc
      .with_ymd_and_hms(
        2026, 10, 9, 15, 0, 0
      )
      .single()
      .expect("valid dt");
    assert_eq!(
      fmt.format_long(dt),
      "9 octobre 2026"
    );
  }

  #[test]
  fn unknown_locale_falls_back() {
    let fmt = DateFormat::new(
      chrono_tz::UTC,
      "xx-YY"
    );
    assert_eq!(fmt.locale_tag, "en-US");
  }

  #[test]
  fn date_only_means_local_midnight() {
    let tz: chrono_tz::Tz =
      "America/Mexico_City"
        .parse()
        .expect("tz");
    let parsed = parse_content_date(
      "2026-03-01",
      &tz
    )
    .expect("parse date");
    assert_eq!(
      parsed.to_rfc3339(),
      "2026-03-01T06:00:00+00:00"
    );
  }

  #[test]
  fn rejects_garbage() {
    assert!(
      parse_content_date(
        "next-ish week",
        &chrono_tz::UTC
      )
      .is_err()
    );
  }

  #[test]
  fn parses_relative_offsets() {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 17, 12, 0, 0
      )
      .single()
      .expect("valid now");
    let parsed = parse_date_expr(
      "+2d",
      now,
      &chrono_tz::UTC
    )
    .expect("parse relative");
    assert!(
      (days_until(parsed, now) - 2.0)
        .abs()
        < f64::EPSILON
    );
  }

  #[test]
  fn parses_tomorrow_in_timezone() {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 17, 3, 0, 0
      )
      .single()
      .expect("valid now");
    let tz: chrono_tz::Tz =
      "America/Mexico_City"
        .parse()
        .expect("tz");
    let parsed = parse_date_expr(
      "tomorrow", now, &tz
    )
    .expect("parse tomorrow");
    assert_eq!(
      parsed
        .with_timezone(&tz)
        .format("%Y-%m-%d")
        .to_string(),
      "2026-02-17"
    );
  }

  #[test]
  fn oversized_relative_offsets_are_errors()
  {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 17, 12, 0, 0
      )
      .single()
      .expect("valid now");
    for input in [
      "+999999999999999d",
      "-999999999999999h",
      "+9223372036854775807m",
      "+99999999999d"
    ] {
      let err = parse_date_expr(
        input,
        now,
        &chrono_tz::UTC
      )
      .expect_err("out of range");
      assert!(
        err
          .to_string()
          .contains("out of range"),
        "unexpected error for {input}: {err}"
      );
    }
  }

  #[test]
  fn date_with_skipped_midnight_starts_at_first_local_time()
  {
    let tz: chrono_tz::Tz =
      "America/Santiago"
        .parse()
        .expect("tz");
    let parsed = parse_content_date(
      "2026-09-06",
      &tz
    )
    .expect("parse date");
    assert_eq!(
      parsed.to_rfc3339(),
      "2026-09-06T04:00:00+00:00"
    );
    assert_eq!(
      DateFormat::new(tz, "en-US")
        .format_long(parsed),
      "September 6, 2026"
    );
  }
}
