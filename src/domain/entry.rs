use serde::{Deserialize, Serialize};

/// One row of the substitution table.
///
/// Field names on disk follow the monitor's German column headings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstitutionEntry {
    #[serde(rename = "kurs", default)]
    pub course: String,
    #[serde(rename = "stunde", default)]
    pub period: String,
    #[serde(rename = "raum", default)]
    pub room: String,
    #[serde(rename = "lehrer", default)]
    pub teacher: String,
    #[serde(rename = "typ", default)]
    pub kind: String,
    #[serde(rename = "notizen", default)]
    pub note: String,
}

impl SubstitutionEntry {
    #[must_use]
    pub fn new(
        course: impl Into<String>,
        period: impl Into<String>,
        room: impl Into<String>,
        teacher: impl Into<String>,
        kind: impl Into<String>,
        note: impl Into<String>,
    ) -> Self {
        Self {
            course: course.into(),
            period: period.into(),
            room: room.into(),
            teacher: teacher.into(),
            kind: kind.into(),
            note: note.into(),
        }
    }

    /// Trims every field. Returns `None` when the course is blank.
    #[must_use]
    pub fn normalized(self) -> Option<Self> {
        let course = self.course.trim();
        if course.is_empty() {
            return None;
        }
        Some(Self {
            course: course.to_string(),
            period: self.period.trim().to_string(),
            room: self.room.trim().to_string(),
            teacher: self.teacher.trim().to_string(),
            kind: self.kind.trim().to_string(),
            note: self.note.trim().to_string(),
        })
    }

    #[must_use]
    pub fn has_course(&self) -> bool {
        !self.course.trim().is_empty()
    }
}
