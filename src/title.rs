//! Page-title synthesis.
//! Pure function of (date, team1 heading, team2 heading); only the date is locale-sensitive.

use chrono::{Locale, NaiveDate, NaiveTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static pattern"));

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleStyle {
    DateOnly,
    #[default]
    WithTeams,
}

/// Locales the long date form is available in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateLocale {
    #[default]
    Fr,
    En,
    De,
}

impl DateLocale {
    /// Picks a locale from a POSIX locale string such as `fr_FR.UTF-8`.
    pub fn from_posix(value: &str) -> Option<Self> {
        let lang = value.split(['_', '.', '-']).next()?.to_ascii_lowercase();
        match lang.as_str() {
            "fr" => Some(DateLocale::Fr),
            "en" => Some(DateLocale::En),
            "de" => Some(DateLocale::De),
            _ => None,
        }
    }

    /// Viewer's locale from `LANG`, falling back to French.
    pub fn from_env() -> Self {
        std::env::var("LANG")
            .ok()
            .and_then(|lang| Self::from_posix(&lang))
            .unwrap_or_default()
    }

    fn chrono_locale(&self) -> Locale {
        match self {
            DateLocale::Fr => Locale::fr_FR,
            DateLocale::En => Locale::en_US,
            DateLocale::De => Locale::de_DE,
        }
    }

    fn long_date_pattern(&self) -> &'static str {
        match self {
            DateLocale::Fr => "%-d %B %Y",
            DateLocale::En => "%B %-d, %Y",
            DateLocale::De => "%-d. %B %Y",
        }
    }

    pub fn format_long(&self, date: NaiveDate) -> String {
        date.and_time(NaiveTime::MIN)
            .and_utc()
            .format_localized(self.long_date_pattern(), self.chrono_locale())
            .to_string()
    }
}

pub fn synthesize_title(
    date: NaiveDate,
    locale: DateLocale,
    style: TitleStyle,
    team1: &str,
    team2: &str,
) -> String {
    let date = locale.format_long(date);
    match style {
        TitleStyle::DateOnly => format!("Rencontre du {}", date),
        TitleStyle::WithTeams => format!("Rencontre du {} - {} vs. {}", date, team1, team2),
    }
}

/// Download name for an export: every whitespace run becomes `_`, edges included.
pub fn export_filename(title: &str) -> String {
    format!("{}.json", WHITESPACE_RUN.replace_all(title, "_"))
}
