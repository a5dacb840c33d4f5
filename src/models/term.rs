/// A teaching term of the academic year, as the timetable endpoint counts
/// them. Serialized to the wire as `<half-year digit>|<single-character
/// label>` (e.g. `1|秋`).
///
/// Distinct from [`ExamTerm`]: exams are scheduled per half-year, classes per
/// term, and the two wire encodings must never be cross-applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassTerm {
    Autumn,
    Winter,
    ShortA,
    SummerVacation,
    Spring,
    Summer,
    ShortB,
}

impl ClassTerm {
    /// Resolves a term code from `schedule.json` (`"0"`..`"6"`).
    pub fn from_config_code(code: &str) -> Option<Self> {
        match code {
            "0" => Some(ClassTerm::Autumn),
            "1" => Some(ClassTerm::Winter),
            "2" => Some(ClassTerm::ShortA),
            "3" => Some(ClassTerm::SummerVacation),
            "4" => Some(ClassTerm::Spring),
            "5" => Some(ClassTerm::Summer),
            "6" => Some(ClassTerm::ShortB),
            _ => None,
        }
    }

    /// The term code as it appears in `schedule.json`.
    pub fn config_code(&self) -> &'static str {
        match self {
            ClassTerm::Autumn => "0",
            ClassTerm::Winter => "1",
            ClassTerm::ShortA => "2",
            ClassTerm::SummerVacation => "3",
            ClassTerm::Spring => "4",
            ClassTerm::Summer => "5",
            ClassTerm::ShortB => "6",
        }
    }

    /// The `xq` form-field value the timetable endpoint expects.
    pub fn query_value(&self) -> &'static str {
        match self {
            ClassTerm::Autumn => "1|秋",
            ClassTerm::Winter => "1|冬",
            ClassTerm::ShortA => "1|短",
            ClassTerm::SummerVacation => "1|暑",
            ClassTerm::Spring => "2|春",
            ClassTerm::Summer => "2|夏",
            ClassTerm::ShortB => "2|短",
        }
    }

    /// The single-character term label.
    pub fn short_label(&self) -> &'static str {
        match self {
            ClassTerm::Autumn => "秋",
            ClassTerm::Winter => "冬",
            ClassTerm::ShortA => "短",
            ClassTerm::SummerVacation => "暑",
            ClassTerm::Spring => "春",
            ClassTerm::Summer => "夏",
            ClassTerm::ShortB => "短",
        }
    }

    /// The human-readable term name, e.g. `秋学期`.
    pub fn label(&self) -> String {
        format!("{}学期", self.short_label())
    }
}

/// An examination half-year. Serialized to the wire as `1|秋冬` / `2|春夏`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExamTerm {
    AutumnWinter,
    SpringSummer,
}

impl ExamTerm {
    /// Resolves a term code from `schedule.json` (`"0"` or `"1"`).
    pub fn from_config_code(code: &str) -> Option<Self> {
        match code {
            "0" => Some(ExamTerm::AutumnWinter),
            "1" => Some(ExamTerm::SpringSummer),
            _ => None,
        }
    }

    /// The `xq` form-field value the exam-outline endpoint expects.
    pub fn query_value(&self) -> &'static str {
        match self {
            ExamTerm::AutumnWinter => "1|秋冬",
            ExamTerm::SpringSummer => "2|春夏",
        }
    }

    /// The human-readable half-year name, e.g. `秋冬学期`.
    pub fn label(&self) -> String {
        match self {
            ExamTerm::AutumnWinter => "秋冬学期".to_string(),
            ExamTerm::SpringSummer => "春夏学期".to_string(),
        }
    }
}

/// A configured (academic year, class term) pair to build the feed for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassYearTerm {
    /// The academic year string, passed to the portal verbatim.
    pub year: String,
    /// The teaching term within that year.
    pub term: ClassTerm,
}

/// A configured (academic year, exam term) pair to build the feed for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExamYearTerm {
    /// The academic year string, passed to the portal verbatim.
    pub year: String,
    /// The examination half-year.
    pub term: ExamTerm,
}
