use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4 * 1024 * 1024;

/// Value of the optional `type` field on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Regular change event, merged onto the known record.
    #[default]
    Code,
    /// Full-snapshot reset: the stored diff and previous content are dropped.
    Snapshot,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Code => "code",
            MessageKind::Snapshot => "snapshot",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One per-file change notification as emitted by the event source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChangeEvent {
    pub filepath: String,
    pub filename: String,
    pub extension: String,
    pub current_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

impl FileChangeEvent {
    pub fn new(filepath: impl Into<String>, current_code: impl Into<String>) -> Self {
        let filepath = filepath.into();
        let (filename, extension) = split_display_name(&filepath);
        Self {
            filepath,
            filename,
            extension,
            current_code: current_code.into(),
            previous_code: None,
            diff: None,
            language: None,
            kind: MessageKind::Code,
        }
    }

    pub fn with_previous(mut self, previous_code: impl Into<String>) -> Self {
        self.previous_code = Some(previous_code.into());
        self
    }

    pub fn with_diff(mut self, diff: impl Into<String>) -> Self {
        self.diff = Some(diff.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn as_snapshot_reset(mut self) -> Self {
        self.kind = MessageKind::Snapshot;
        self
    }

    /// True when the event carries a delta (a non-empty diff or an old/new pair)
    /// rather than a bare snapshot of the current content.
    pub fn has_delta(&self) -> bool {
        self.kind != MessageKind::Snapshot
            && (self.previous_code.is_some()
                || self
                    .diff
                    .as_deref()
                    .is_some_and(|diff| !diff.trim().is_empty()))
    }
}

/// Derives the display `filename` and `extension` from a path.
///
/// Both `/` and `\` are treated as separators. Dotfiles such as `.gitignore`
/// have no extension.
pub fn split_display_name(filepath: &str) -> (String, String) {
    let filename = filepath
        .rsplit(&['/', '\\'][..])
        .next()
        .unwrap_or(filepath)
        .to_string();
    let extension = match filename.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < filename.len() => filename[idx + 1..].to_string(),
        _ => String::new(),
    };
    (filename, extension)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeErrorKind {
    #[error("payload exceeds max size: {size} > {max}")]
    Oversized { size: usize, max: usize },
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("unsupported message type `{0}`")]
    UnsupportedType(String),
}

/// A payload that could not be turned into a [`FileChangeEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}")]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    pub raw: String,
}

impl DecodeError {
    fn new(kind: DecodeErrorKind, raw: &str) -> Self {
        Self {
            kind,
            raw: raw.to_string(),
        }
    }

    /// First `max_chars` characters of the offending payload, for log lines.
    pub fn raw_preview(&self, max_chars: usize) -> String {
        let mut preview: String = self.raw.chars().take(max_chars).collect();
        if self.raw.chars().count() > max_chars {
            preview.push_str("...");
        }
        preview
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("event encode failed: {0}")]
    Serialize(String),
    #[error("event exceeds max size: {size} > {max}")]
    Oversized { size: usize, max: usize },
}

#[derive(Deserialize)]
struct WireEvent {
    #[serde(default)]
    filepath: Option<String>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    extension: Option<String>,
    #[serde(default, alias = "content")]
    current_code: Option<String>,
    #[serde(default, alias = "previous_content")]
    previous_code: Option<String>,
    #[serde(default)]
    diff: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn parse_kind(value: Option<&str>) -> Result<MessageKind, DecodeErrorKind> {
    match value.map(|value| value.trim().to_ascii_lowercase()) {
        None => Ok(MessageKind::Code),
        Some(value) => match value.as_str() {
            "" | "code" => Ok(MessageKind::Code),
            "snapshot" => Ok(MessageKind::Snapshot),
            other => Err(DecodeErrorKind::UnsupportedType(other.to_string())),
        },
    }
}

impl TryFrom<WireEvent> for FileChangeEvent {
    type Error = DecodeErrorKind;

    fn try_from(wire: WireEvent) -> Result<Self, Self::Error> {
        let kind = parse_kind(wire.kind.as_deref())?;
        let filename = non_empty(wire.filename);
        let filepath = non_empty(wire.filepath)
            .or_else(|| filename.clone())
            .ok_or(DecodeErrorKind::MissingField("filepath"))?;
        let current_code = wire
            .current_code
            .ok_or(DecodeErrorKind::MissingField("current_code"))?;
        let (derived_name, derived_ext) = split_display_name(&filepath);
        Ok(FileChangeEvent {
            filename: filename.unwrap_or(derived_name),
            extension: non_empty(wire.extension)
                .map(|ext| ext.trim_start_matches('.').to_string())
                .unwrap_or(derived_ext),
            filepath,
            current_code,
            previous_code: wire.previous_code,
            diff: wire.diff,
            language: non_empty(wire.language),
            kind,
        })
    }
}

/// Parses raw inbound frames into [`FileChangeEvent`]s.
///
/// Decoding never panics; every failure comes back as a [`DecodeError`] that
/// keeps the offending payload so the caller can report it and move on.
#[derive(Debug, Clone)]
pub struct EventDecoder {
    max_payload_bytes: usize,
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD_BYTES)
    }
}

impl EventDecoder {
    pub fn new(max_payload_bytes: usize) -> Self {
        Self { max_payload_bytes }
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }

    pub fn decode(&self, raw: &str) -> Result<FileChangeEvent, DecodeError> {
        if raw.len() > self.max_payload_bytes {
            return Err(DecodeError::new(
                DecodeErrorKind::Oversized {
                    size: raw.len(),
                    max: self.max_payload_bytes,
                },
                raw,
            ));
        }
        let wire: WireEvent = serde_json::from_str(raw)
            .map_err(|err| DecodeError::new(DecodeErrorKind::Malformed(err.to_string()), raw))?;
        FileChangeEvent::try_from(wire).map_err(|kind| DecodeError::new(kind, raw))
    }

    /// Binary frames are accepted when they hold UTF-8 text.
    pub fn decode_bytes(&self, raw: &[u8]) -> Result<FileChangeEvent, DecodeError> {
        match std::str::from_utf8(raw) {
            Ok(text) => self.decode(text),
            Err(err) => Err(DecodeError::new(
                DecodeErrorKind::Malformed(format!("payload is not utf-8: {err}")),
                &String::from_utf8_lossy(raw),
            )),
        }
    }
}

pub fn encode_event(event: &FileChangeEvent, max_payload_bytes: usize) -> Result<String, EncodeError> {
    let encoded =
        serde_json::to_string(event).map_err(|err| EncodeError::Serialize(err.to_string()))?;
    if encoded.len() > max_payload_bytes {
        return Err(EncodeError::Oversized {
            size: encoded.len(),
            max: max_payload_bytes,
        });
    }
    Ok(encoded)
}
