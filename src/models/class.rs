use serde::{Deserialize, Serialize};

/// Periods per teaching day. The timetable endpoint never emits a period
/// outside `1..=MAX_PERIOD`; rows that do are treated as malformed.
pub const MAX_PERIOD: u8 = 13;

/// A raw timetable row as the portal emits it inside `data.kbList`. Field
/// names match the wire; every field is optional because placeholder slots
/// come back with most of them missing or blank.
#[derive(Debug, Deserialize)]
pub struct RawClassItem {
    /// Course name.
    #[serde(default)]
    pub kcmc: Option<String>,
    /// Weekday, `1` (Monday) to `7`.
    #[serde(default)]
    pub xqj: Option<String>,
    /// Period range within the day, `"6-8"` or a single `"3"`.
    #[serde(default)]
    pub skjc: Option<String>,
    /// Week-number text, e.g. `1-16周`, `1-15单周`, `1-4周,9-12周`.
    #[serde(default)]
    pub skzc: Option<String>,
    /// Classroom / location.
    #[serde(default)]
    pub skdd: Option<String>,
    /// Teacher name.
    #[serde(default)]
    pub jsxm: Option<String>,
}

/// A normalized timetable entry, ready for calendar generation and caching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassEntry {
    /// Course name.
    pub course_name: String,
    /// Weekday, `1` (Monday) to `7`.
    pub weekday: u8,
    /// First period of the slot, `1`-based.
    pub period_start: u8,
    /// Last period of the slot, inclusive.
    pub period_end: u8,
    /// Classroom / location; may be empty.
    pub location: String,
    /// Expanded week numbers, ascending, deduplicated.
    pub weeks: Vec<u8>,
    /// The original week-number text, kept for the event description.
    pub weeks_text: String,
    /// Teacher name; may be empty.
    pub teacher: String,
}

impl RawClassItem {
    /// Normalizes a raw row into a [`ClassEntry`].
    ///
    /// Returns `None` for rows that do not describe a real class: blank
    /// placeholder slots the portal pads the grid with, and rows whose
    /// weekday, periods or weeks text do not parse. Dropping them silently
    /// is deliberate; the surviving rows keep their source order.
    pub fn normalize(self) -> Option<ClassEntry> {
        let course_name = self.kcmc.as_deref().map(str::trim).unwrap_or_default();
        if course_name.is_empty() {
            return None;
        }

        let weekday: u8 = self.xqj.as_deref()?.trim().parse().ok()?;
        if !(1..=7).contains(&weekday) {
            return None;
        }

        let (period_start, period_end) = parse_period_range(self.skjc.as_deref()?.trim())?;

        let weeks_text = self.skzc.as_deref()?.trim().to_string();
        let weeks = parse_weeks(&weeks_text)?;

        Some(ClassEntry {
            course_name: course_name.to_string(),
            weekday,
            period_start,
            period_end,
            location: self.skdd.map(|s| s.trim().to_string()).unwrap_or_default(),
            weeks,
            weeks_text,
            teacher: self.jsxm.map(|s| s.trim().to_string()).unwrap_or_default(),
        })
    }
}

/// Parses a period range, `"6-8"` or `"3"`, bounds-checked against
/// [`MAX_PERIOD`].
fn parse_period_range(text: &str) -> Option<(u8, u8)> {
    let (start, end) = match text.split_once('-') {
        Some((a, b)) => (a.trim().parse().ok()?, b.trim().parse().ok()?),
        None => {
            let single: u8 = text.parse().ok()?;
            (single, single)
        }
    };
    if start == 0 || start > end || end > MAX_PERIOD {
        return None;
    }
    Some((start, end))
}

/// Expands the portal's week-number text into concrete week numbers.
///
/// The text is a comma-separated list of segments; each segment is a range
/// `a-b` or a single week `a`, suffixed with `周`, with an optional parity
/// marker in front of it (`单` keeps odd weeks, `双` even weeks), e.g.
/// `1-16周`, `1-15单周`, `2-16双周`, `1-4周,9-12周`. Returns `None` when any
/// segment fails to parse or nothing survives.
pub fn parse_weeks(text: &str) -> Option<Vec<u8>> {
    let mut weeks = Vec::new();
    for segment in text.split([',', '，']) {
        let segment = segment.trim();
        if segment.is_empty() {
            return None;
        }

        let segment = segment.strip_suffix('周').unwrap_or(segment);
        let (segment, parity) = if let Some(rest) = segment.strip_suffix('单') {
            (rest, Some(1))
        } else if let Some(rest) = segment.strip_suffix('双') {
            (rest, Some(0))
        } else {
            (segment, None)
        };

        let (first, last): (u8, u8) = match segment.split_once('-') {
            Some((a, b)) => (a.trim().parse().ok()?, b.trim().parse().ok()?),
            None => {
                let single = segment.trim().parse().ok()?;
                (single, single)
            }
        };
        if first == 0 || first > last {
            return None;
        }

        for week in first..=last {
            if parity.is_none_or(|p| week % 2 == p) {
                weeks.push(week);
            }
        }
    }

    weeks.sort_unstable();
    weeks.dedup();
    if weeks.is_empty() {
        return None;
    }
    Some(weeks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(
        kcmc: &str,
        xqj: &str,
        skjc: &str,
        skzc: &str,
        skdd: &str,
        jsxm: &str,
    ) -> RawClassItem {
        let opt = |s: &str| (!s.is_empty()).then(|| s.to_string());
        RawClassItem {
            kcmc: opt(kcmc),
            xqj: opt(xqj),
            skjc: opt(skjc),
            skzc: opt(skzc),
            skdd: opt(skdd),
            jsxm: opt(jsxm),
        }
    }

    #[test]
    fn well_formed_row_is_preserved() {
        let entry = raw("操作系统", "3", "6-8", "1-16周", "曹西-201", "王老师")
            .normalize()
            .unwrap();
        assert_eq!(entry.course_name, "操作系统");
        assert_eq!(entry.weekday, 3);
        assert_eq!((entry.period_start, entry.period_end), (6, 8));
        assert_eq!(entry.location, "曹西-201");
        assert_eq!(entry.teacher, "王老师");
        assert_eq!(entry.weeks, (1..=16).collect::<Vec<u8>>());
        assert_eq!(entry.weeks_text, "1-16周");
    }

    #[test]
    fn placeholder_rows_are_dropped() {
        assert!(raw("", "3", "6-8", "1-16周", "", "").normalize().is_none());
        assert!(raw("  ", "3", "6-8", "1-16周", "", "").normalize().is_none());
        assert!(raw("高等数学", "", "", "", "", "").normalize().is_none());
    }

    #[test]
    fn malformed_fields_drop_the_row() {
        // weekday out of range
        assert!(raw("课", "8", "1-2", "1-4周", "", "").normalize().is_none());
        // inverted and out-of-range periods
        assert!(raw("课", "1", "5-3", "1-4周", "", "").normalize().is_none());
        assert!(raw("课", "1", "12-14", "1-4周", "", "").normalize().is_none());
        assert!(raw("课", "1", "0", "1-4周", "", "").normalize().is_none());
        // unparseable weeks
        assert!(raw("课", "1", "1-2", "周", "", "").normalize().is_none());
        assert!(raw("课", "1", "1-2", "8-5周", "", "").normalize().is_none());
    }

    #[test]
    fn single_period_and_single_week() {
        let entry = raw("体育", "5", "3", "5周", "", "").normalize().unwrap();
        assert_eq!((entry.period_start, entry.period_end), (3, 3));
        assert_eq!(entry.weeks, vec![5]);
    }

    #[test]
    fn missing_location_and_teacher_default_to_empty() {
        let entry = raw("研讨课", "2", "11-12", "2-4周", "", "")
            .normalize()
            .unwrap();
        assert_eq!(entry.location, "");
        assert_eq!(entry.teacher, "");
    }

    #[test]
    fn parity_markers_filter_weeks() {
        assert_eq!(parse_weeks("1-15单周").unwrap(), vec![1, 3, 5, 7, 9, 11, 13, 15]);
        assert_eq!(parse_weeks("2-16双周").unwrap(), vec![2, 4, 6, 8, 10, 12, 14, 16]);
        // parity that filters everything out is not a valid weeks text
        assert!(parse_weeks("2-2单周").is_none());
    }

    #[test]
    fn comma_lists_merge_sorted_and_deduplicated() {
        assert_eq!(
            parse_weeks("9-12周,1-4周").unwrap(),
            vec![1, 2, 3, 4, 9, 10, 11, 12]
        );
        assert_eq!(parse_weeks("1-3周，3-5周").unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn raw_rows_decode_from_wire_json() {
        let rows: Vec<RawClassItem> = sonic_rs::from_str(
            r#"[
                {"kcmc":"操作系统","xqj":"3","skjc":"6-8","skzc":"1-16周","skdd":"曹西-201","jsxm":"王老师"},
                {"xqj":"1"}
            ]"#,
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
        let mut it = rows.into_iter();
        assert!(it.next().unwrap().normalize().is_some());
        assert!(it.next().unwrap().normalize().is_none());
    }
}
