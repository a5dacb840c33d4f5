use serde::{Deserialize, Serialize};

/// A course-score record as the portal emits it inside `data.list`.
///
/// Passthrough: field names match the wire, values stay the portal's own
/// strings (scores can be numeric or graded text like `优秀`). Cached and
/// re-serialized unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassScoreEntry {
    /// Course name.
    #[serde(default)]
    pub kcmc: Option<String>,
    /// Score, numeric (`"92"`) or graded (`"优秀"`).
    #[serde(default)]
    pub cj: Option<String>,
    /// Grade point, e.g. `"4.5"`.
    #[serde(default)]
    pub jd: Option<String>,
    /// Course credits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xf: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_decode_and_round_trip() {
        let wire = r#"[
            {"kcmc":"操作系统","cj":"92","jd":"4.5","xf":"4.0"},
            {"kcmc":"形势与政策","cj":"优秀","jd":"5.0"}
        ]"#;
        let entries: Vec<ClassScoreEntry> = sonic_rs::from_str(wire).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].cj.as_deref(), Some("优秀"));
        assert!(entries[1].xf.is_none());

        let reencoded = sonic_rs::to_string(&entries).unwrap();
        let again: Vec<ClassScoreEntry> = sonic_rs::from_str(&reencoded).unwrap();
        assert_eq!(again, entries);
    }
}
