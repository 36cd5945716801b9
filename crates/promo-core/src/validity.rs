use std::fmt;

use chrono::{
  DateTime,
  Duration,
  Utc
};
use serde::Serialize;
use tracing::{
  trace,
  warn
};

use crate::content::ContentItem;
use crate::datetime::{
  DateFormat,
  days_until,
  parse_content_date
};

#[derive(
  Debug, Clone, Copy, Serialize, PartialEq, Eq,
)]
#[serde(rename_all = "kebab-case")]
pub enum DateStatus {
  NotYetValid,
  Active,
  ExpiringSoon,
  Expired
}

impl fmt::Display for DateStatus {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | DateStatus::NotYetValid => {
        write!(f, "not-yet-valid")
      }
      | DateStatus::Active => {
        write!(f, "active")
      }
      | DateStatus::ExpiringSoon => {
        write!(f, "expiring-soon")
      }
      | DateStatus::Expired => {
        write!(f, "expired")
      }
    }
  }
}

/// Validity window of a deal evaluated
/// at a single instant.
///
/// The expiry day is inclusive: a deal
/// only counts as expired once a full
/// day has passed after `expires_on`.
/// The start boundary gets no such
/// adjustment.
#[derive(
  Debug, Clone, Serialize, PartialEq,
)]
pub struct DateWindow {
  pub is_expired:                       bool,
  pub is_valid:                         bool,
  pub valid_from_formatted:             Option<String>,
  pub expires_on_formatted:             Option<String>,
  pub valid_starting_within_one_day:    bool,
  pub valid_starting_within_three_days: bool,
  pub expiring_within_one_day:          bool,
  pub expiring_within_three_days:       bool,
  #[serde(skip)]
  starts_in_future:                     bool
}

impl Default for DateWindow {
  fn default() -> Self {
    Self {
      is_expired: false,
      is_valid: true,
      valid_from_formatted: None,
      expires_on_formatted: None,
      valid_starting_within_one_day:
        false,
      valid_starting_within_three_days:
        false,
      expiring_within_one_day: false,
      expiring_within_three_days: false,
      starts_in_future: false
    }
  }
}

impl DateWindow {
  pub fn status(&self) -> DateStatus {
    if self.is_expired {
      DateStatus::Expired
    } else if self.starts_in_future {
      DateStatus::NotYetValid
    } else if self
      .expiring_within_one_day
      || self.expiring_within_three_days
    {
      DateStatus::ExpiringSoon
    } else {
      DateStatus::Active
    }
  }

  /// Whether either boundary date is
  /// known, i.e. whether the page shows
  /// a banner area at all.
  pub fn has_labels(&self) -> bool {
    self.valid_from_formatted.is_some()
      || self
        .expires_on_formatted
        .is_some()
  }

  /// Human-readable banner shown above
  /// the deal.
  pub fn banner_lines(
    &self
  ) -> Vec<String> {
    let mut lines = Vec::new();

    if self.starts_in_future
      && !self.is_expired
      && let Some(start) =
        &self.valid_from_formatted
    {
      if self
        .valid_starting_within_one_day
      {
        lines.push(format!(
          "Deal starts in about 1 day, \
           on {start}"
        ));
      } else {
        lines.push(format!(
          "Deal starts on {start}"
        ));
      }
    }

    if !self.is_expired {
      if self.expiring_within_one_day {
        lines.push(
          "Deal ends in less than 1 day"
            .to_string()
        );
      } else if self
        .expiring_within_three_days
      {
        lines.push(
          "Deal ends in less than 3 \
           days"
            .to_string()
        );
      }
    }

    if self.is_expired {
      match &self.expires_on_formatted {
        | Some(end) => {
          lines.push(format!(
            "Deal expired on {end}"
          ))
        }
        | None => {
          lines.push(
            "Deal expired".to_string()
          )
        }
      }
    }

    lines
  }
}

/// Proximity flags for a boundary
/// `days` away: (within one day, within
/// three days). At most one is set, and
/// neither once the boundary has passed.
fn proximity(days: f64) -> (bool, bool) {
  let within_one =
    days > 0.0 && days <= 1.0;
  let within_three = !within_one
    && days > 0.0
    && days <= 3.0;
  (within_one, within_three)
}

/// Classifies a deal's validity window
/// at `now`.
///
/// Never fails: if either bound cannot
/// be parsed the problem is logged and
/// the neutral default (valid, not
/// expired, no labels) is returned.
#[tracing::instrument(skip(
  now, format
))]
pub fn classify_window(
  valid_from: Option<&str>,
  expires_on: Option<&str>,
  now: DateTime<Utc>,
  format: &DateFormat
) -> DateWindow {
  match try_classify(
    valid_from, expires_on, now, format
  ) {
    | Ok(window) => {
      trace!(status = %window.status(), "classified validity window");
      window
    }
    | Err(err) => {
      warn!(error = %format!("{err:#}"), "unreadable validity dates; treating deal as unconstrained");
      DateWindow::default()
    }
  }
}

pub fn classify_item(
  item: &ContentItem,
  now: DateTime<Utc>,
  format: &DateFormat
) -> DateWindow {
  classify_window(
    item.valid_from.as_deref(),
    item.expires_on.as_deref(),
    now,
    format
  )
}

fn try_classify(
  valid_from: Option<&str>,
  expires_on: Option<&str>,
  now: DateTime<Utc>,
  format: &DateFormat
) -> anyhow::Result<DateWindow> {
  let start = valid_from
    .map(|raw| {
      parse_content_date(
        raw,
        &format.timezone
      )
    })
    .transpose()?;
  let expiry = expires_on
    .map(|raw| {
      parse_content_date(
        raw,
        &format.timezone
      )
    })
    .transpose()?;

  let mut window = DateWindow::default();

  if let Some(start) = start {
    let (one, three) =
      proximity(days_until(start, now));
    window
      .valid_starting_within_one_day =
      one;
    window
      .valid_starting_within_three_days =
      three;
    window.valid_from_formatted =
      Some(format.format_long(start));
    window.starts_in_future = now < start;
  }

  if let Some(expiry) = expiry {
    let (one, three) = proximity(
      days_until(expiry, now)
    );
    window.expiring_within_one_day = one;
    window.expiring_within_three_days =
      three;
    window.expires_on_formatted =
      Some(format.format_long(expiry));
    window.is_expired =
      now > expiry + Duration::days(1);
  }

  window.is_valid = start
    .map(|start| now >= start)
    .unwrap_or(true)
    && expiry
      .map(|expiry| now <= expiry)
      .unwrap_or(true);

  Ok(window)
}

#[cfg(test)]
mod tests {
  use chrono::{
    DateTime,
    Duration,
    TimeZone,
    Utc
  };

  use super::{
    DateStatus,
    DateWindow,
    classify_window
  };
  use crate::datetime::DateFormat;

  fn now() -> DateTime<Utc> {
    Utc
      .with_ymd_and_hms(
        2026, 10, 19, 12, 0, 0
      )
      .single()
      .expect("valid now")
  }

  fn rfc(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
  }

  #[test]
  fn no_bounds_is_valid_and_unlabelled()
  {
    let window = classify_window(
      None,
      None,
      now(),
      &DateFormat::default()
    );
    assert_eq!(
      window,
      DateWindow::default()
    );
    assert!(window.is_valid);
    assert!(!window.is_expired);
    assert!(!window.has_labels());
    assert!(
      window.banner_lines().is_empty()
    );
    assert_eq!(
      window.status(),
      DateStatus::Active
    );
  }

  #[test]
  fn start_twelve_hours_out_is_within_one_day()
  {
    let start =
      rfc(now() + Duration::hours(12));
    let window = classify_window(
      Some(&start),
      None,
      now(),
      &DateFormat::default()
    );
    assert!(
      window
        .valid_starting_within_one_day
    );
    assert!(
      !window
        .valid_starting_within_three_days
    );
    assert!(!window.is_valid);
    assert_eq!(
      window.status(),
      DateStatus::NotYetValid
    );
    assert_eq!(
      window.banner_lines(),
      vec![
        "Deal starts in about 1 day, on \
         October 20, 2026"
          .to_string()
      ]
    );
  }

  #[test]
  fn start_two_days_out_is_within_three_days()
  {
    let start =
      rfc(now() + Duration::days(2));
    let window = classify_window(
      Some(&start),
      None,
      now(),
      &DateFormat::default()
    );
    assert!(
      !window
        .valid_starting_within_one_day
    );
    assert!(
      window
        .valid_starting_within_three_days
    );
    assert_eq!(
      window.banner_lines(),
      vec![
        "Deal starts on October 21, 2026"
          .to_string()
      ]
    );
  }

  #[test]
  fn passed_start_clears_proximity_flags()
  {
    let start =
      rfc(now() - Duration::hours(2));
    let window = classify_window(
      Some(&start),
      None,
      now(),
      &DateFormat::default()
    );
    assert!(window.is_valid);
    assert!(
      !window
        .valid_starting_within_one_day
    );
    assert!(
      !window
        .valid_starting_within_three_days
    );
    assert_eq!(
      window.status(),
      DateStatus::Active
    );
  }

  #[test]
  fn last_day_of_running_deal_has_no_start_line()
  {
    let window = classify_window(
      Some("2026-10-01"),
      Some("2026-10-19"),
      now(),
      &DateFormat::default()
    );
    assert!(!window.is_expired);
    assert!(window.has_labels());
    assert_eq!(
      window.status(),
      DateStatus::Active
    );
    assert!(
      window
        .banner_lines()
        .iter()
        .all(|line| {
          !line.starts_with("Deal starts")
        }),
      "unexpected banner: {:?}",
      window.banner_lines()
    );
  }

  #[test]
  fn expiry_yesterday_is_expired() {
    let window = classify_window(
      None,
      Some("2026-10-18"),
      now(),
      &DateFormat::default()
    );
    assert!(window.is_expired);
    assert!(!window.is_valid);
    assert_eq!(
      window.status(),
      DateStatus::Expired
    );
    assert_eq!(
      window.banner_lines(),
      vec![
        "Deal expired on October 18, 2026"
          .to_string()
      ]
    );
  }

  #[test]
  fn expiry_today_is_not_expired() {
    let window = classify_window(
      None,
      Some("2026-10-19"),
      now(),
      &DateFormat::default()
    );
    assert!(!window.is_expired);
    assert_eq!(
      window
        .expires_on_formatted
        .as_deref(),
      Some("October 19, 2026")
    );
  }

  #[test]
  fn expiry_in_two_days_is_expiring_soon()
  {
    let expiry =
      rfc(now() + Duration::days(2));
    let window = classify_window(
      None,
      Some(&expiry),
      now(),
      &DateFormat::default()
    );
    assert!(window.is_valid);
    assert!(
      window.expiring_within_three_days
    );
    assert!(
      !window.expiring_within_one_day
    );
    assert_eq!(
      window.status(),
      DateStatus::ExpiringSoon
    );
    assert_eq!(
      window.banner_lines(),
      vec![
        "Deal ends in less than 3 days"
          .to_string()
      ]
    );
  }

  #[test]
  fn window_between_bounds_is_valid() {
    let window = classify_window(
      Some("2026-10-01"),
      Some("2026-12-31"),
      now(),
      &DateFormat::default()
    );
    assert!(window.is_valid);
    assert!(!window.is_expired);
    assert_eq!(
      window
        .valid_from_formatted
        .as_deref(),
      Some("October 1, 2026")
    );
    assert_eq!(
      window.status(),
      DateStatus::Active
    );
    assert!(
      window.banner_lines().is_empty()
    );
  }

  #[test]
  fn expiry_on_skipped_midnight_still_expires()
  {
    let tz: chrono_tz::Tz =
      "America/Santiago"
        .parse()
        .expect("tz");
    let now = Utc
      .with_ymd_and_hms(
        2026, 10, 1, 12, 0, 0
      )
      .single()
      .expect("valid now");
    let window = classify_window(
      None,
      Some("2026-09-06"),
      now,
      &DateFormat::new(tz, "en-US")
    );
    assert!(window.is_expired);
    assert_eq!(
      window
        .expires_on_formatted
        .as_deref(),
      Some("September 6, 2026")
    );
  }

  #[test]
  fn malformed_dates_fall_back_to_defaults()
  {
    let window = classify_window(
      Some("not a date"),
      Some("2026-10-18"),
      now(),
      &DateFormat::default()
    );
    assert_eq!(
      window,
      DateWindow::default()
    );

    let window = classify_window(
      None,
      Some("31/31/2026"),
      now(),
      &DateFormat::default()
    );
    assert!(window.is_valid);
    assert!(!window.is_expired);
  }
}
