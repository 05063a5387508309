//! Note models and the persistence envelope

use crate::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-width RFC 3339 encoding of stored instants.
///
/// Always UTC with nanosecond precision and a `Z` suffix, so text order equals
/// chronological order and the value round-trips exactly.
pub mod timestamp {
    use super::*;

    /// Encode an instant
    pub fn encode(instant: &DateTime<Utc>) -> String {
        instant.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    /// Decode an instant written by [`encode`] (any RFC 3339 offset is accepted)
    pub fn decode(raw: &str) -> Result<DateTime<Utc>> {
        Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
    }

    pub(crate) fn encode_opt(instant: &Option<DateTime<Utc>>) -> Option<String> {
        instant.as_ref().map(encode)
    }

    pub(crate) fn decode_opt(raw: &Option<String>) -> Result<Option<DateTime<Utc>>> {
        raw.as_deref().map(decode).transpose()
    }
}

/// Note variant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NoteType {
    /// Sticky note
    Sticky,
    /// Lined paper
    Lined,
    /// Plain rich text
    Regular,
    /// Freehand drawing
    Sketch,
    /// Code snippet
    Code,
    /// Mind map
    Mindmap,
    /// Expense tracker
    Expense,
    /// Any variant this build does not know; kept verbatim.
    ///
    /// Must not hold one of the known names: stored types are read back
    /// through [`NoteType::parse`], so `Other("sticky")` would come back as
    /// [`NoteType::Sticky`]. Build values with `parse`.
    Other(String),
}

impl NoteType {
    /// Variant for a stored name; unknown names become [`NoteType::Other`]
    pub fn parse(name: impl Into<String>) -> Self {
        Self::from(name.into())
    }

    /// Stored name
    pub fn as_str(&self) -> &str {
        match self {
            NoteType::Sticky => "sticky",
            NoteType::Lined => "lined",
            NoteType::Regular => "regular",
            NoteType::Sketch => "sketch",
            NoteType::Code => "code",
            NoteType::Mindmap => "mindmap",
            NoteType::Expense => "expense",
            NoteType::Other(name) => name,
        }
    }
}

impl From<String> for NoteType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "sticky" => NoteType::Sticky,
            "lined" => NoteType::Lined,
            "regular" => NoteType::Regular,
            "sketch" => NoteType::Sketch,
            "code" => NoteType::Code,
            "mindmap" => NoteType::Mindmap,
            "expense" => NoteType::Expense,
            _ => NoteType::Other(name),
        }
    }
}

impl From<NoteType> for String {
    fn from(note_type: NoteType) -> Self {
        note_type.as_str().to_string()
    }
}

impl fmt::Display for NoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Voice recording attached to a note
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceRecording {
    /// Reference to the audio payload (data URL or file reference)
    pub audio_ref: String,
    /// When the recording was made
    pub timestamp: DateTime<Utc>,
}

/// Note record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    /// Immutable identifier
    pub id: String,
    /// Serialized rich content
    pub content: String,
    /// Optional title
    pub title: Option<String>,
    /// Optional variant
    pub note_type: Option<NoteType>,
    /// Optional color (CSS color text)
    pub color: Option<String>,
    /// Owning folder, if any
    pub folder_id: Option<String>,
    /// Creation instant
    pub created_at: DateTime<Utc>,
    /// Last mutation instant; never decreases for a given id
    pub updated_at: DateTime<Utc>,
    /// Soft-archive instant
    pub archived_at: Option<DateTime<Utc>>,
    /// Soft-delete instant
    pub deleted_at: Option<DateTime<Utc>>,
    /// Scheduled reminder
    pub reminder_time: Option<DateTime<Utc>>,
    /// Recordings in the order they were added
    pub voice_recordings: Vec<VoiceRecording>,
}

impl Note {
    /// Create new note with a fresh id
    pub fn new(content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            title: None,
            note_type: None,
            color: None,
            folder_id: None,
            created_at: now,
            updated_at: now,
            archived_at: None,
            deleted_at: None,
            reminder_time: None,
            voice_recordings: Vec::new(),
        }
    }

    /// Set title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set variant. An `Other` holding a known name is normalized.
    pub fn with_type(mut self, note_type: NoteType) -> Self {
        self.note_type = Some(match note_type {
            NoteType::Other(name) => NoteType::parse(name),
            known => known,
        });
        self
    }

    /// Set folder
    pub fn with_folder(mut self, folder_id: impl Into<String>) -> Self {
        self.folder_id = Some(folder_id.into());
        self
    }

    /// Mark as mutated now. `updated_at` never moves backwards, even if the
    /// wall clock does.
    pub fn touch(&mut self) {
        self.updated_at = self.updated_at.max(Utc::now());
    }

    /// Append a recording and touch the note
    pub fn add_voice_recording(&mut self, audio_ref: impl Into<String>) {
        self.voice_recordings.push(VoiceRecording {
            audio_ref: audio_ref.into(),
            timestamp: Utc::now(),
        });
        self.touch();
    }

    /// Soft-archived
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    /// Soft-deleted
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Stored voice recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredVoiceRecording {
    /// Audio reference
    #[serde(rename = "audio")]
    pub audio_ref: String,
    /// Encoded instant
    pub timestamp: String,
}

/// Persistence envelope: a [`Note`] with every instant encoded as text.
///
/// This is the only shape written to either backend, including the legacy
/// flat list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageRecord {
    /// Note id
    pub id: String,
    /// Content
    #[serde(default)]
    pub content: String,
    /// Title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Variant
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub note_type: Option<NoteType>,
    /// Color
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Folder relation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    /// Encoded creation instant
    pub created_at: String,
    /// Encoded update instant
    pub updated_at: String,
    /// Encoded archive instant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<String>,
    /// Encoded delete instant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<String>,
    /// Encoded reminder instant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_time: Option<String>,
    /// Recordings
    #[serde(default)]
    pub voice_recordings: Vec<StoredVoiceRecording>,
}

impl From<&Note> for StorageRecord {
    fn from(note: &Note) -> Self {
        Self {
            id: note.id.clone(),
            content: note.content.clone(),
            title: note.title.clone(),
            note_type: note.note_type.clone(),
            color: note.color.clone(),
            folder_id: note.folder_id.clone(),
            created_at: timestamp::encode(&note.created_at),
            updated_at: timestamp::encode(&note.updated_at),
            archived_at: timestamp::encode_opt(&note.archived_at),
            deleted_at: timestamp::encode_opt(&note.deleted_at),
            reminder_time: timestamp::encode_opt(&note.reminder_time),
            voice_recordings: note
                .voice_recordings
                .iter()
                .map(|r| StoredVoiceRecording {
                    audio_ref: r.audio_ref.clone(),
                    timestamp: timestamp::encode(&r.timestamp),
                })
                .collect(),
        }
    }
}

impl TryFrom<StorageRecord> for Note {
    type Error = crate::Error;

    fn try_from(record: StorageRecord) -> Result<Self> {
        let voice_recordings = record
            .voice_recordings
            .iter()
            .map(|r| {
                Ok(VoiceRecording {
                    audio_ref: r.audio_ref.clone(),
                    timestamp: timestamp::decode(&r.timestamp)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            created_at: timestamp::decode(&record.created_at)?,
            updated_at: timestamp::decode(&record.updated_at)?,
            archived_at: timestamp::decode_opt(&record.archived_at)?,
            deleted_at: timestamp::decode_opt(&record.deleted_at)?,
            reminder_time: timestamp::decode_opt(&record.reminder_time)?,
            id: record.id,
            content: record.content,
            title: record.title,
            note_type: record.note_type,
            color: record.color,
            folder_id: record.folder_id,
            voice_recordings,
        })
    }
}

/// Storage consumption estimate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageEstimate {
    /// Bytes in use
    pub used: u64,
    /// Bytes available in total; 0 when unknown
    pub quota: u64,
}

/// Terminal state of a legacy migration run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Flag was already set; nothing read or written
    AlreadyMigrated,
    /// No legacy list (or an empty one); flag set, nothing written
    NoLegacyData,
    /// Legacy records copied into the primary store and the legacy copy purged
    Migrated {
        /// Records written
        count: usize,
        /// Undecodable entries moved, verbatim, to the quarantine key
        quarantined: usize,
    },
}
