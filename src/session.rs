//! Session state for one clinical encounter: the validated patient id and
//! the captures accumulated so far. This is an explicit value handed to
//! the capture/aggregate/save operations; there are no process-wide
//! globals behind it.

use crate::capture::CaptureError;
use crate::sample_table::{SampleTable, SessionAggregate, SessionTable, COLUMNS};
use crate::workbook::{session_names, StoreError, WorkbookStore};

use chrono::{DateTime, Local};
use std::fmt;
use std::path::{Path, PathBuf};

/// A validated patient identifier: 7 to 12 digits. Separator characters
/// (dots, dashes, spaces — anything that is not a digit) are stripped
/// before validation, so `"12.345-678"` and `"12345678"` are the same id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientId(String);

impl PatientId {
    /// Strips non-digits and validates the remaining length.
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if (7..=12).contains(&digits.len()) {
            Ok(Self(digits))
        } else {
            Err(SessionError::InvalidPatientId(raw.trim().to_string()))
        }
    }

    /// The digits of the id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An ordered list of exercises to run: device command plus destination
/// channel for each. Plans are data for an embedding UI; the command
/// bridge sequences exercises itself and never consults them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamPlan {
    name: &'static str,
    exercises: Vec<(String, String)>,
}

impl ExamPlan {
    fn new(name: &'static str, commands: &[&str]) -> Self {
        let exercises = commands
            .iter()
            .filter_map(|cmd| {
                let channel = match *cmd {
                    "1" => COLUMNS[1],
                    "2" => COLUMNS[3],
                    "3" => COLUMNS[5],
                    "4" => COLUMNS[7],
                    _ => return None,
                };
                Some((cmd.to_string(), channel.to_string()))
            })
            .collect();
        Self { name, exercises }
    }

    /// Wrist exam: flexion/extension, ulnar/radial deviation, grip force.
    pub fn wrist() -> Self {
        Self::new("wrist", &["1", "2", "4"])
    }

    /// Elbow exam: flexion/extension, pronation/supination, grip force.
    pub fn elbow() -> Self {
        Self::new("elbow", &["1", "3", "4"])
    }

    /// Full exam: all four exercises.
    pub fn full() -> Self {
        Self::new("full", &["1", "2", "3", "4"])
    }

    /// The same plan with one device command removed. Setups without the
    /// grip dynamometer run `plan.without_command("4")`.
    pub fn without_command(mut self, command: &str) -> Self {
        self.exercises.retain(|(cmd, _)| cmd != command);
        self
    }

    /// Human-readable exam name.
    pub fn name(&self) -> &str {
        self.name
    }

    /// The (device command, destination channel) pairs, in order.
    pub fn exercises(&self) -> &[(String, String)] {
        &self.exercises
    }
}

/// What a successful save produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedSession {
    /// The workbook file the session went into.
    pub path: PathBuf,
    /// The sheet name the session was written under.
    pub sheet: String,
}

/// Why a session operation failed.
#[derive(Debug)]
pub enum SessionError {
    /// The patient id did not survive validation.
    InvalidPatientId(String),
    /// A save was requested with no patient id set.
    NoPatient,
    /// A save was requested with zero accumulated captures.
    NoData,
    /// A capture failed.
    Capture(CaptureError),
    /// Persisting the workbook failed. The accumulated captures are kept
    /// so the operator can retry without re-capturing.
    Store(StoreError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SessionError::InvalidPatientId(raw) => {
                write!(f, "patient id must be 7-12 digits, got {raw:?}")
            }
            SessionError::NoPatient => write!(f, "no patient id set"),
            SessionError::NoData => write!(f, "no captures to save"),
            SessionError::Capture(e) => write!(f, "{e}"),
            SessionError::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<CaptureError> for SessionError {
    fn from(value: CaptureError) -> Self {
        Self::Capture(value)
    }
}

impl From<StoreError> for SessionError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// The state of one clinical session: who it is for and what has been
/// captured so far.
#[derive(Debug, Default)]
pub struct SessionState {
    patient: Option<PatientId>,
    aggregate: SessionAggregate,
}

impl SessionState {
    /// A session with no patient and no captures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and sets the patient id. On failure the previous id (if
    /// any) is kept.
    pub fn set_patient(&mut self, raw: &str) -> Result<&PatientId, SessionError> {
        let id = PatientId::parse(raw)?;
        Ok(self.patient.insert(id))
    }

    /// The current patient, if one is set.
    pub fn patient(&self) -> Option<&PatientId> {
        self.patient.as_ref()
    }

    /// Records one completed capture.
    pub fn record(&mut self, capture: SampleTable) {
        self.aggregate.push(capture);
    }

    /// Number of captures accumulated so far.
    pub fn captures(&self) -> usize {
        self.aggregate.captures()
    }

    /// True once at least one capture has been recorded.
    pub fn has_data(&self) -> bool {
        !self.aggregate.is_empty()
    }

    /// Discards the accumulated captures (the patient id stays).
    pub fn clear(&mut self) {
        self.aggregate.clear();
    }

    /// The merged session table as it stands now.
    pub fn merged(&self) -> SessionTable {
        self.aggregate.merge()
    }

    /// Persists the session into the patient's workbook under `data_dir`:
    /// ensures the summary sheet, appends the session sheet and its
    /// structured table, updates both summary blocks and writes the file.
    /// On success the accumulated captures are cleared; on any failure
    /// they are kept so the save can be retried.
    pub fn save(
        &mut self,
        data_dir: &Path,
        workbook_name: &str,
        when: DateTime<Local>,
    ) -> Result<SavedSession, SessionError> {
        let patient = self.patient.as_ref().ok_or(SessionError::NoPatient)?;
        if self.aggregate.is_empty() {
            return Err(SessionError::NoData);
        }

        let path = data_dir.join(patient.as_str()).join(workbook_name);
        let mut store = WorkbookStore::open_or_create(&path)?;
        store.ensure_summary_sheet();

        let (sheet_base, table_name) = session_names(&when);
        let table = self.aggregate.merge();
        let sheet = store.write_session(&sheet_base, &table, &table_name)?;
        store.append_summary(when.date_naive(), &table);
        store.save()?;

        self.aggregate.clear();
        Ok(SavedSession { path, sheet })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn patient_id_strips_separators() {
        assert_eq!(PatientId::parse("12.345-678").unwrap().as_str(), "12345678");
        assert_eq!(PatientId::parse(" 1234567 ").unwrap().as_str(), "1234567");
    }

    #[test]
    fn patient_id_length_is_bounded() {
        assert!(matches!(
            PatientId::parse("123456"),
            Err(SessionError::InvalidPatientId(_))
        ));
        assert!(matches!(
            PatientId::parse("1234567890123"),
            Err(SessionError::InvalidPatientId(_))
        ));
        assert!(PatientId::parse("123456789012").is_ok());
    }

    #[test]
    fn invalid_patient_keeps_the_previous_one() {
        let mut session = SessionState::new();
        session.set_patient("1234567").unwrap();
        assert!(session.set_patient("abc").is_err());
        assert_eq!(session.patient().unwrap().as_str(), "1234567");
    }

    #[test]
    fn exam_plans_map_commands_to_channels() {
        let wrist = ExamPlan::wrist();
        assert_eq!(wrist.exercises().len(), 3);
        assert_eq!(
            wrist.exercises()[1],
            ("2".to_string(), "ROM Ulnar/Radial Deviation_deg".to_string())
        );

        let trimmed = ExamPlan::wrist().without_command("4");
        assert_eq!(trimmed.exercises().len(), 2);
        assert!(trimmed.exercises().iter().all(|(cmd, _)| cmd != "4"));
    }

    #[test]
    fn save_requires_a_patient_and_data() {
        let dir = tempfile::tempdir().unwrap();
        let when = Local.with_ymd_and_hms(2026, 8, 6, 10, 0, 0).unwrap();

        let mut session = SessionState::new();
        assert!(matches!(
            session.save(dir.path(), "Lecturas.xlsx", when),
            Err(SessionError::NoPatient)
        ));

        session.set_patient("1234567").unwrap();
        assert!(matches!(
            session.save(dir.path(), "Lecturas.xlsx", when),
            Err(SessionError::NoData)
        ));
        // neither failure touched the disk
        assert!(!dir.path().join("1234567").exists());
    }

    #[test]
    fn save_writes_the_workbook_and_clears_captures() {
        let dir = tempfile::tempdir().unwrap();
        let when = Local.with_ymd_and_hms(2026, 8, 6, 10, 0, 0).unwrap();

        let mut session = SessionState::new();
        session.set_patient("1234567").unwrap();
        let mut capture = SampleTable::new("ROM Flexion/Extension_deg");
        capture.push(0.0, 10.0);
        capture.push(0.1, 20.0);
        session.record(capture);

        let saved = session.save(dir.path(), "Lecturas.xlsx", when).unwrap();
        assert_eq!(saved.path, dir.path().join("1234567").join("Lecturas.xlsx"));
        assert_eq!(saved.sheet, "sesion_2026-08-06_10-00-00");
        assert!(saved.path.exists());
        assert!(!session.has_data());
        // the patient stays set for the next session
        assert!(session.patient().is_some());
    }
}
