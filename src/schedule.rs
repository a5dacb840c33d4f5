use std::fs;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;

use crate::models::term::{ClassTerm, ClassYearTerm, ExamTerm, ExamYearTerm};

/// Start and end dates of one teaching term. Week one begins on `begin`;
/// class events falling outside `[begin, end]` are not generated.
#[derive(Debug, Clone)]
pub struct TermConfig {
    /// Academic year the config belongs to.
    pub year: String,
    /// The teaching term.
    pub term: ClassTerm,
    /// First day of week one.
    pub begin: NaiveDate,
    /// Last teaching day, inclusive.
    pub end: NaiveDate,
}

/// A holiday adjustment: classes whose date falls inside `[from, to]` are
/// suppressed.
#[derive(Debug, Clone)]
pub struct Tweak {
    /// Human-readable reason, e.g. `国庆节放假`.
    pub description: String,
    /// First suppressed day.
    pub from: NaiveDate,
    /// Last suppressed day, inclusive.
    pub to: NaiveDate,
}

impl Tweak {
    /// Whether `date` falls inside the suppressed range.
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

#[derive(Debug, Deserialize)]
struct RawSchedule {
    #[serde(default)]
    class_terms: Vec<String>,
    #[serde(default)]
    exam_terms: Vec<String>,
    #[serde(default)]
    term_configs: Vec<RawTermConfig>,
    #[serde(default)]
    tweaks: Vec<RawTweak>,
}

#[derive(Debug, Deserialize)]
struct RawTermConfig {
    year: String,
    term: String,
    begin: String,
    end: String,
}

#[derive(Debug, Deserialize)]
struct RawTweak {
    description: String,
    from: String,
    to: String,
}

/// The term/schedule configuration, decoded from `schedule.json` once at
/// startup and immutable afterwards. Tells the feed builder which terms to
/// scrape and the calendar generator where the weeks fall.
#[derive(Debug)]
pub struct Schedule {
    class_terms: Vec<ClassYearTerm>,
    exam_terms: Vec<ExamYearTerm>,
    term_configs: Vec<TermConfig>,
    tweaks: Vec<Tweak>,
}

impl Schedule {
    /// Loads and validates the schedule configuration. Any malformed entry
    /// is a fatal startup error.
    pub fn load(path: &str) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read schedule config '{}'", path))?;
        let schedule = Self::from_json(&text)
            .with_context(|| format!("failed to parse schedule config '{}'", path))?;

        info!(
            "📅 Schedule config loaded: {} class terms, {} exam terms, {} term configs, {} tweaks",
            schedule.class_terms.len(),
            schedule.exam_terms.len(),
            schedule.term_configs.len(),
            schedule.tweaks.len()
        );
        for item in &schedule.class_terms {
            info!("  class term: {} {}", item.year, item.term.label());
        }
        for item in &schedule.exam_terms {
            info!("  exam term: {} {}", item.year, item.term.label());
        }

        Ok(schedule)
    }

    pub(crate) fn from_json(text: &str) -> Result<Self> {
        let raw: RawSchedule = sonic_rs::from_str(text).context("schedule config is not valid JSON")?;

        let mut class_terms = Vec::with_capacity(raw.class_terms.len());
        for entry in &raw.class_terms {
            let (year, code) = split_term_entry(entry)?;
            let term = ClassTerm::from_config_code(code)
                .with_context(|| format!("unknown class term code in '{}'", entry))?;
            class_terms.push(ClassYearTerm {
                year: year.to_string(),
                term,
            });
        }

        let mut exam_terms = Vec::with_capacity(raw.exam_terms.len());
        for entry in &raw.exam_terms {
            let (year, code) = split_term_entry(entry)?;
            let term = ExamTerm::from_config_code(code)
                .with_context(|| format!("unknown exam term code in '{}'", entry))?;
            exam_terms.push(ExamYearTerm {
                year: year.to_string(),
                term,
            });
        }

        let mut term_configs = Vec::with_capacity(raw.term_configs.len());
        for raw_cfg in &raw.term_configs {
            let term = ClassTerm::from_config_code(&raw_cfg.term).with_context(|| {
                format!("unknown term code '{}' in term config", raw_cfg.term)
            })?;
            let begin = parse_date(&raw_cfg.begin)?;
            let end = parse_date(&raw_cfg.end)?;
            if begin > end {
                bail!(
                    "term config {} {} begins after it ends ({} > {})",
                    raw_cfg.year,
                    term.label(),
                    begin,
                    end
                );
            }
            term_configs.push(TermConfig {
                year: raw_cfg.year.clone(),
                term,
                begin,
                end,
            });
        }

        let mut tweaks = Vec::with_capacity(raw.tweaks.len());
        for raw_tweak in &raw.tweaks {
            let from = parse_date(&raw_tweak.from)?;
            let to = parse_date(&raw_tweak.to)?;
            if from > to {
                bail!(
                    "tweak '{}' starts after it ends ({} > {})",
                    raw_tweak.description,
                    from,
                    to
                );
            }
            tweaks.push(Tweak {
                description: raw_tweak.description.clone(),
                from,
                to,
            });
        }

        Ok(Self {
            class_terms,
            exam_terms,
            term_configs,
            tweaks,
        })
    }

    /// The (year, term) pairs the class feed is built for, in config order.
    pub fn class_terms(&self) -> &[ClassYearTerm] {
        &self.class_terms
    }

    /// The (year, term) pairs the exam feed is built for, in config order.
    pub fn exam_terms(&self) -> &[ExamYearTerm] {
        &self.exam_terms
    }

    /// Looks up the date range configured for a (year, term) pair.
    pub fn term_config(&self, year: &str, term: ClassTerm) -> Option<&TermConfig> {
        self.term_configs
            .iter()
            .find(|cfg| cfg.year == year && cfg.term == term)
    }

    /// The configured holiday adjustments.
    pub fn tweaks(&self) -> &[Tweak] {
        &self.tweaks
    }
}

fn split_term_entry(entry: &str) -> Result<(&str, &str)> {
    let Some((year, code)) = entry.rsplit_once(':') else {
        bail!("malformed term entry '{}', expected '<year>:<code>'", entry);
    };
    if year.is_empty() {
        bail!("malformed term entry '{}', empty year", entry);
    }
    Ok((year, code))
}

fn parse_date(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{}', expected YYYY-MM-DD", text))
}
