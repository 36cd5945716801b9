use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::content::ContentItem;
use crate::datetime::DateFormat;
use crate::page::ProductPage;
use crate::validity::{DateStatus, DateWindow, classify_item};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self {
            color: color && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip_all)]
    pub fn print_catalog(
        &self,
        items: &[ContentItem],
        now: DateTime<Utc>,
        format: &DateFormat,
    ) -> anyhow::Result<()> {
        self.write_catalog(io::stdout().lock(), items, now, format)
    }

    #[tracing::instrument(skip_all)]
    pub fn print_page(&self, page: &ProductPage<'_>) -> anyhow::Result<()> {
        self.write_page(io::stdout().lock(), page)
    }

    #[tracing::instrument(skip_all)]
    pub fn print_window(&self, item: &ContentItem, window: &DateWindow) -> anyhow::Result<()> {
        self.write_window(io::stdout().lock(), item, window)
    }

    #[tracing::instrument(skip_all)]
    pub fn print_recommendations(&self, items: &[&ContentItem]) -> anyhow::Result<()> {
        self.write_recommendations(io::stdout().lock(), items)
    }

    pub fn write_catalog<W: Write>(
        &self,
        out: W,
        items: &[ContentItem],
        now: DateTime<Utc>,
        format: &DateFormat,
    ) -> anyhow::Result<()> {
        let headers = vec![
            "Slug".to_string(),
            "Rank".to_string(),
            "Status".to_string(),
            "Title".to_string(),
            "Categories".to_string(),
        ];

        let rows = items
            .iter()
            .map(|item| {
                let status = classify_item(item, now, format).status();
                vec![
                    item.slug.clone(),
                    rank_cell(item),
                    self.paint_status(status),
                    item.title.clone(),
                    item.categories.join(", "),
                ]
            })
            .collect();

        write_table(out, headers, rows)
    }

    pub fn write_page<W: Write>(&self, mut out: W, page: &ProductPage<'_>) -> anyhow::Result<()> {
        let item = page.item;
        writeln!(out, "{}", item.title)?;
        writeln!(out, "{}", "=".repeat(UnicodeWidthStr::width(item.title.as_str())))?;

        if let Some(summary) = &item.summary {
            writeln!(out, "{summary}")?;
        }
        if let Some(website) = &item.website {
            writeln!(out, "website   {website}")?;
        }
        if let Some(image) = item.hero_image() {
            writeln!(out, "image     {image}")?;
        }

        let banner = page.window.banner_lines();
        if page.window.has_labels() && !banner.is_empty() {
            writeln!(out)?;
            let code = if page.window.is_expired
                || page.window.expiring_within_one_day
                || page.window.expiring_within_three_days
            {
                "31"
            } else {
                "32"
            };
            for line in banner {
                writeln!(out, "{}", self.paint(&line, code))?;
            }
        }

        writeln!(out)?;
        if !item.categories.is_empty() {
            writeln!(out, "categories     {}", item.categories.join(", "))?;
        }
        if !item.subcategories.is_empty() {
            writeln!(out, "subcategories  {}", item.subcategories.join(", "))?;
        }
        if !item.tags.is_empty() {
            writeln!(out, "tags           {}", item.tags.join(", "))?;
        }
        if let Some(published) = &page.published {
            writeln!(out, "published      {published}")?;
        }

        writeln!(out)?;
        writeln!(out, "Recommended products")?;
        self.write_recommendations(&mut out, &page.recommendations)?;

        writeln!(out)?;
        if let Some(category) = page.lead_category() {
            writeln!(out, "More deals in {category}")?;
        }
        writeln!(out, "All deals -> {}", page.all_articles_path)?;
        Ok(())
    }

    pub fn write_window<W: Write>(
        &self,
        mut out: W,
        item: &ContentItem,
        window: &DateWindow,
    ) -> anyhow::Result<()> {
        let opt = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());

        writeln!(out, "slug                 {}", item.slug)?;
        writeln!(out, "status               {}", self.paint_status(window.status()))?;
        writeln!(out, "valid                {}", window.is_valid)?;
        writeln!(out, "expired              {}", window.is_expired)?;
        writeln!(out, "valid from           {}", opt(&window.valid_from_formatted))?;
        writeln!(out, "expires on           {}", opt(&window.expires_on_formatted))?;
        writeln!(
            out,
            "starts within 1d     {}",
            window.valid_starting_within_one_day
        )?;
        writeln!(
            out,
            "starts within 3d     {}",
            window.valid_starting_within_three_days
        )?;
        writeln!(out, "expires within 1d    {}", window.expiring_within_one_day)?;
        writeln!(out, "expires within 3d    {}", window.expiring_within_three_days)?;
        Ok(())
    }

    pub fn write_recommendations<W: Write>(
        &self,
        out: W,
        items: &[&ContentItem],
    ) -> anyhow::Result<()> {
        let headers = vec![
            "#".to_string(),
            "Slug".to_string(),
            "Rank".to_string(),
            "Title".to_string(),
        ];
        let rows = items
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                vec![
                    self.paint(&(idx + 1).to_string(), "33"),
                    item.slug.clone(),
                    rank_cell(item),
                    item.title.clone(),
                ]
            })
            .collect();
        write_table(out, headers, rows)
    }

    fn paint_status(&self, status: DateStatus) -> String {
        let code = match status {
            DateStatus::Expired => "31",
            DateStatus::ExpiringSoon => "33",
            DateStatus::NotYetValid => "36",
            DateStatus::Active => "32",
        };
        self.paint(&status.to_string(), code)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn rank_cell(item: &ContentItem) -> String {
    item.position()
        .map(|rank| rank.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::{Renderer, strip_ansi};
    use crate::config::SiteSettings;
    use crate::content::{Catalog, ContentItem};
    use crate::page::ProductPage;
    use crate::recommend::RecommendationPolicy;
    use crate::validity::DateWindow;

    #[test]
    fn strips_color_codes_for_width() {
        assert_eq!(strip_ansi("\x1b[31mexpired\x1b[0m"), "expired");
    }

    #[test]
    fn recommendation_table_lists_rank_or_dash() {
        let mut ranked = ContentItem::new("acme", "Acme Deals");
        ranked.rank = Some(3);
        let unranked = ContentItem::new("globex", "Globex");

        let mut buf = Vec::new();
        Renderer::plain()
            .write_recommendations(&mut buf, &[&ranked, &unranked])
            .expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[2].starts_with("1 acme   3"));
        assert!(lines[3].contains("globex -"));
    }

    #[test]
    fn window_report_shows_dashes_for_missing_dates() {
        let item = ContentItem::new("acme", "Acme");
        let mut buf = Vec::new();
        Renderer::plain()
            .write_window(&mut buf, &item, &DateWindow::default())
            .expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("status               active"));
        assert!(text.contains("valid from           -"));
    }

    #[test]
    fn final_day_page_shows_ending_banner_only() {
        let mut item = ContentItem::new("acme", "Acme");
        item.valid_from = Some("2026-10-01".to_string());
        item.expires_on = Some("2026-10-20".to_string());
        let catalog = Catalog::from_items(vec![item]).expect("catalog");
        let now = Utc
            .with_ymd_and_hms(2026, 10, 19, 12, 0, 0)
            .single()
            .expect("valid now");

        let page = ProductPage::build(
            catalog.get("acme").expect("item"),
            &catalog,
            &SiteSettings::default(),
            &RecommendationPolicy::default(),
            now,
            &mut StdRng::seed_from_u64(1),
        );
        let mut buf = Vec::new();
        Renderer::plain().write_page(&mut buf, &page).expect("render");
        let text = String::from_utf8(buf).expect("utf8");

        assert!(text.contains("Deal ends in less than 1 day"));
        assert!(!text.contains("Deal starts"));
    }
}
