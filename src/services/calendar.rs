use chrono::{Days, NaiveDate, NaiveTime};
use icalendar::{Calendar, Component, Event, EventLike};
use tracing::{debug, warn};

use crate::models::class::ClassEntry;
use crate::models::exam::{parse_exam_slot, ExamOutlineEntry};
use crate::models::score::ClassScoreEntry;
use crate::models::term::{ClassYearTerm, ExamYearTerm};
use crate::schedule::Schedule;
use crate::services::feed::ClassExamRecords;

/// Hint for clients interpreting the floating datetimes below.
const CAMPUS_TIMEZONE: &str = "Asia/Shanghai";

/// Fallback course name for records the portal returns without one.
const UNKNOWN_COURSE: &str = "未知课程";

/// Wall-clock (start, end) of the campus teaching periods, period 1 first.
/// Each period runs 45 minutes; the gaps follow the campus bell schedule.
const PERIOD_CLOCK: [((u32, u32), (u32, u32)); 13] = [
    ((8, 0), (8, 45)),
    ((8, 50), (9, 35)),
    ((9, 50), (10, 35)),
    ((10, 40), (11, 25)),
    ((11, 30), (12, 15)),
    ((13, 25), (14, 10)),
    ((14, 15), (15, 0)),
    ((15, 5), (15, 50)),
    ((16, 15), (17, 0)),
    ((17, 5), (17, 50)),
    ((18, 50), (19, 35)),
    ((19, 40), (20, 25)),
    ((20, 30), (21, 15)),
];

/// Clock times spanned by an inclusive period range, `None` when a period
/// falls outside the bell schedule.
fn period_clock(start: u8, end: u8) -> Option<(NaiveTime, NaiveTime)> {
    let ((sh, sm), _) = PERIOD_CLOCK.get(usize::from(start).checked_sub(1)?)?;
    let (_, (eh, em)) = PERIOD_CLOCK.get(usize::from(end).checked_sub(1)?)?;
    Some((
        NaiveTime::from_hms_opt(*sh, *sm, 0)?,
        NaiveTime::from_hms_opt(*eh, *em, 0)?,
    ))
}

/// Deterministic VEVENT UID from the event's identifying fields, so a
/// refreshed subscription replaces events instead of duplicating them.
fn event_uid(parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"\x00");
    }
    format!("{}@zjucal", hasher.finalize().to_hex())
}

/// Builds the classes + exams calendar for one student.
///
/// Terms without a begin/end configuration are skipped with a warning so the
/// rest of the feed still renders.
pub fn class_exam_calendar(schedule: &Schedule, records: &ClassExamRecords) -> Calendar {
    let mut calendar = Calendar::new();
    calendar.name("ZJU 课程表").timezone(CAMPUS_TIMEZONE);
    for (item, entries) in &records.classes {
        for event in class_events(schedule, item, entries) {
            calendar.push(event);
        }
    }
    for (item, outlines) in &records.exams {
        for event in exam_events(item, outlines) {
            calendar.push(event);
        }
    }
    calendar.done()
}

/// Builds the score calendar: one all-day event per score record, dated the
/// day the feed is generated so fresh grades surface on refresh.
pub fn score_calendar(records: &[ClassScoreEntry], date: NaiveDate) -> Calendar {
    let mut calendar = Calendar::new();
    calendar.name("ZJU 成绩").timezone(CAMPUS_TIMEZONE);
    for record in records {
        let course = record.kcmc.as_deref().unwrap_or(UNKNOWN_COURSE);
        let mut summary = course.to_string();
        if let Some(cj) = record.cj.as_deref() {
            summary.push(' ');
            summary.push_str(cj);
        }
        if let Some(jd) = record.jd.as_deref() {
            summary.push_str(&format!(" (绩点 {})", jd));
        }
        let date_part = date.to_string();
        let uid = event_uid(&[
            course,
            record.cj.as_deref().unwrap_or_default(),
            record.jd.as_deref().unwrap_or_default(),
            &date_part,
        ]);
        let mut event = Event::new();
        event.uid(&uid).summary(&summary).all_day(date);
        calendar.push(event.done());
    }
    calendar.done()
}

/// Expands one term's class entries into dated events, one per taught week.
fn class_events(schedule: &Schedule, item: &ClassYearTerm, entries: &[ClassEntry]) -> Vec<Event> {
    let Some(config) = schedule.term_config(&item.year, item.term) else {
        warn!(
            "⚠️ No term config for {} {}, its classes are not generated",
            item.year,
            item.term.label()
        );
        return Vec::new();
    };

    let mut events = Vec::new();
    for entry in entries {
        let Some((starts, ends)) = period_clock(entry.period_start, entry.period_end) else {
            warn!(
                "⚠️ {} has periods {}-{} outside the bell schedule, skipped",
                entry.course_name, entry.period_start, entry.period_end
            );
            continue;
        };
        for &week in &entry.weeks {
            // Week 1 starts on the term's begin date; weekday 1 is that same
            // day of the week.
            let offset = u64::from(week - 1) * 7 + u64::from(entry.weekday - 1);
            let date = config.begin + Days::new(offset);
            if date > config.end {
                continue;
            }
            if let Some(tweak) = schedule.tweaks().iter().find(|t| t.covers(date)) {
                debug!(
                    "⏭️ {} on {} suppressed: {}",
                    entry.course_name, date, tweak.description
                );
                continue;
            }
            let slot = format!("{}:{}:{}", week, entry.weekday, entry.period_start);
            let uid = event_uid(&[
                &item.year,
                item.term.query_value(),
                &entry.course_name,
                &slot,
            ]);
            let mut event = Event::new();
            event
                .uid(&uid)
                .summary(&entry.course_name)
                .location(&entry.location)
                .description(&format!(
                    "教师: {}；周次: {}",
                    entry.teacher, entry.weeks_text
                ))
                .starts(date.and_time(starts))
                .ends(date.and_time(ends));
            events.push(event.done());
        }
    }
    events
}

/// Turns one term's exam outline into midterm and final events. Slots the
/// portal left blank are simply absent; slots it filled with something
/// unparseable are skipped with a warning rather than failing the feed.
fn exam_events(item: &ExamYearTerm, outlines: &[ExamOutlineEntry]) -> Vec<Event> {
    let mut events = Vec::new();
    for outline in outlines {
        let course = outline.kcmc.as_deref().unwrap_or(UNKNOWN_COURSE);
        let slots = [
            ("期中考试", &outline.qzkssj, &outline.qzksdd),
            ("期末考试", &outline.qmkssj, &outline.qmksdd),
        ];
        for (label, slot, location) in slots {
            let Some(text) = slot.as_deref() else {
                continue;
            };
            let Some((starts, ends)) = parse_exam_slot(text) else {
                warn!("⚠️ Unparseable exam slot '{}' for {}, skipped", text, course);
                continue;
            };
            let uid = event_uid(&[&item.year, item.term.query_value(), course, label]);
            let mut event = Event::new();
            event
                .uid(&uid)
                .summary(&format!("{} {}", course, label))
                .starts(starts)
                .ends(ends);
            if let Some(location) = location.as_deref() {
                event.location(location);
            }
            if let Some(seat) = outline.zwxh.as_deref() {
                event.description(&format!("座位号: {}", seat));
            }
            events.push(event.done());
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use crate::models::term::{ClassTerm, ExamTerm};

    use super::*;

    fn test_schedule() -> Schedule {
        // 2024-09-09 is a Monday.
        Schedule::from_json(
            r#"{
                "class_terms": ["2024-2025:0"],
                "exam_terms": ["2024-2025:0"],
                "term_configs": [
                    {"year": "2024-2025", "term": "0", "begin": "2024-09-09", "end": "2024-09-30"}
                ],
                "tweaks": [
                    {"description": "校运会停课", "from": "2024-09-25", "to": "2024-09-26"}
                ]
            }"#,
        )
        .unwrap()
    }

    fn os_class() -> ClassEntry {
        ClassEntry {
            course_name: "操作系统".to_string(),
            weekday: 3,
            period_start: 6,
            period_end: 8,
            location: "曹西-201".to_string(),
            weeks: vec![1, 2, 3, 4],
            weeks_text: "1-4周".to_string(),
            teacher: "王老师".to_string(),
        }
    }

    fn records(classes: Vec<ClassEntry>, exams: Vec<ExamOutlineEntry>) -> ClassExamRecords {
        ClassExamRecords {
            classes: vec![(
                ClassYearTerm {
                    year: "2024-2025".to_string(),
                    term: ClassTerm::Autumn,
                },
                classes,
            )],
            exams: vec![(
                ExamYearTerm {
                    year: "2024-2025".to_string(),
                    term: ExamTerm::AutumnWinter,
                },
                exams,
            )],
        }
    }

    #[test]
    fn class_events_land_on_the_right_dates_and_periods() {
        let schedule = test_schedule();
        let ics = class_exam_calendar(&schedule, &records(vec![os_class()], Vec::new())).to_string();

        // Week 2 Wednesday: 2024-09-09 + 7 + 2 days, periods 6-8.
        assert!(ics.contains("DTSTART:20240918T132500"));
        assert!(ics.contains("DTEND:20240918T155000"));
        assert!(ics.contains("SUMMARY:操作系统"));
        assert!(ics.contains("LOCATION:曹西-201"));
    }

    #[test]
    fn events_stop_at_the_term_end() {
        let schedule = test_schedule();
        let ics =
            class_exam_calendar(&schedule, &records(vec![os_class()], Vec::new())).to_string();

        // Term ends 2024-09-30: week 4 Wednesday (2024-10-02) is clipped and
        // week 3 (2024-09-25) is tweaked away, leaving weeks 1 and 2.
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 2);
        assert!(ics.contains("DTSTART:20240911T132500"));
        assert!(!ics.contains("20240925"));
        assert!(!ics.contains("20241002"));
    }

    #[test]
    fn terms_without_config_are_skipped_not_fatal() {
        let schedule = Schedule::from_json(
            r#"{"class_terms": ["2024-2025:0"], "exam_terms": [], "term_configs": [], "tweaks": []}"#,
        )
        .unwrap();
        let ics =
            class_exam_calendar(&schedule, &records(vec![os_class()], Vec::new())).to_string();
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 0);
    }

    #[test]
    fn exam_slots_become_midterm_and_final_events() {
        let outline = ExamOutlineEntry {
            kcmc: Some("操作系统".to_string()),
            qmkssj: Some("2025年01月15日(14:00-16:00)".to_string()),
            qmksdd: Some("紫金港西2-201".to_string()),
            qzkssj: Some("2024年11月06日(18:30-20:30)".to_string()),
            qzksdd: None,
            zwxh: Some("32".to_string()),
        };
        let schedule = test_schedule();
        let ics = class_exam_calendar(&schedule, &records(Vec::new(), vec![outline])).to_string();

        assert!(ics.contains("SUMMARY:操作系统 期末考试"));
        assert!(ics.contains("DTSTART:20250115T140000"));
        assert!(ics.contains("DTEND:20250115T160000"));
        assert!(ics.contains("LOCATION:紫金港西2-201"));
        assert!(ics.contains("SUMMARY:操作系统 期中考试"));
        assert!(ics.contains("DTSTART:20241106T183000"));
        assert!(ics.contains("DESCRIPTION:座位号: 32"));
    }

    #[test]
    fn unparseable_exam_slot_is_skipped() {
        let outline = ExamOutlineEntry {
            kcmc: Some("数据库".to_string()),
            qmkssj: Some("时间待定".to_string()),
            qmksdd: None,
            qzkssj: None,
            qzksdd: None,
            zwxh: None,
        };
        let schedule = test_schedule();
        let ics = class_exam_calendar(&schedule, &records(Vec::new(), vec![outline])).to_string();
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 0);
    }

    #[test]
    fn score_events_are_all_day_on_the_generation_date() {
        let records = vec![
            ClassScoreEntry {
                kcmc: Some("操作系统".to_string()),
                cj: Some("92".to_string()),
                jd: Some("4.5".to_string()),
                xf: Some("4".to_string()),
            },
            ClassScoreEntry {
                kcmc: Some("体育".to_string()),
                cj: Some("合格".to_string()),
                jd: None,
                xf: None,
            },
        ];
        let date = NaiveDate::from_ymd_opt(2026, 8, 25).unwrap();
        let ics = score_calendar(&records, date).to_string();

        assert!(ics.contains("SUMMARY:操作系统 92 (绩点 4.5)"));
        assert!(ics.contains("SUMMARY:体育 合格"));
        assert!(ics.contains("DTSTART;VALUE=DATE:20260825"));
    }

    #[test]
    fn event_uids_are_stable_across_rebuilds() {
        let schedule = test_schedule();
        let records = records(vec![os_class()], Vec::new());
        let first = class_exam_calendar(&schedule, &records).to_string();
        let second = class_exam_calendar(&schedule, &records).to_string();

        let uids = |ics: &str| -> Vec<String> {
            ics.lines()
                .filter(|l| l.starts_with("UID:"))
                .map(str::to_string)
                .collect()
        };
        assert_eq!(uids(&first), uids(&second));
        assert!(!uids(&first).is_empty());
    }
}
