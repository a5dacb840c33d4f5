use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// An exam-outline record as the portal emits it inside `data.list`.
///
/// Passthrough: field names match the wire and the record is cached and
/// re-serialized unmodified. Slot texts are only interpreted at calendar
/// generation time (see [`parse_exam_slot`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamOutlineEntry {
    /// Course name.
    #[serde(default)]
    pub kcmc: Option<String>,
    /// Final-exam slot, `YYYY年MM月DD日(HH:MM-HH:MM)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qmkssj: Option<String>,
    /// Final-exam location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qmksdd: Option<String>,
    /// Midterm slot, same format as the final.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qzkssj: Option<String>,
    /// Midterm location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qzksdd: Option<String>,
    /// Assigned seat number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zwxh: Option<String>,
}

/// Parses an exam slot of the form `YYYY年MM月DD日(HH:MM-HH:MM)` into its
/// start and end datetimes. Fullwidth parentheses are accepted too. Returns
/// `None` for anything else; callers skip such slots with a warning.
pub fn parse_exam_slot(text: &str) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let text = text.trim().replace('（', "(").replace('）', ")");

    let (date_part, rest) = text.split_once('(')?;
    let times = rest.strip_suffix(')')?;

    let (year, rest) = date_part.split_once('年')?;
    let (month, rest) = rest.split_once('月')?;
    let day = rest.strip_suffix('日')?;
    let date = NaiveDate::from_ymd_opt(
        year.trim().parse().ok()?,
        month.trim().parse().ok()?,
        day.trim().parse().ok()?,
    )?;

    let (start, end) = times.split_once('-')?;
    let start = NaiveTime::parse_from_str(start.trim(), "%H:%M").ok()?;
    let end = NaiveTime::parse_from_str(end.trim(), "%H:%M").ok()?;

    Some((date.and_time(start), date.and_time(end)))
}
