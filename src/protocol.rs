//! Wire envelope codec for the terminal transport.
//!
//! Every WebSocket text frame carries exactly one JSON envelope. Terminal
//! bytes are arbitrary binary (not guaranteed UTF-8), so input and output
//! payloads travel as standard base64.
//!
//! # Wire Format
//!
//! | kind     | fields                  | direction        |
//! |----------|-------------------------|------------------|
//! | `input`  | `data`: base64          | client → server  |
//! | `resize` | `cols`, `rows`: integer | client → server  |
//! | `output` | `data`: base64          | server → client  |
//! | `closed` | none                    | server → client  |
//!
//! The discriminator field is `kind`. Deployed servers name it `type`, so
//! [`decode`] accepts both and [`Envelope::to_wire`] can emit either.

// Rust guideline compliant 2026-02

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TerminalSize {
    /// Number of columns.
    pub cols: u16,
    /// Number of rows.
    pub rows: u16,
}

impl TerminalSize {
    /// Create a size from columns and rows.
    #[must_use]
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    /// Returns `true` if both dimensions are non-zero.
    ///
    /// Zero-area sizes come from terminals that are not yet laid out and are
    /// never forwarded to the remote side.
    #[must_use]
    pub fn is_measured(self) -> bool {
        self.cols > 0 && self.rows > 0
    }
}

impl std::fmt::Display for TerminalSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// One protocol message exchanged over the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Keystrokes or pasted bytes for the remote terminal.
    Input(Vec<u8>),
    /// New local terminal size.
    Resize(TerminalSize),
    /// Bytes produced by the remote terminal.
    Output(Vec<u8>),
    /// The remote process ended.
    Closed,
}

impl Envelope {
    /// Build an input envelope from UTF-8 text (paste).
    #[must_use]
    pub fn input_text(text: &str) -> Self {
        Self::Input(text.as_bytes().to_vec())
    }

    /// Wire name of this envelope's kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Input(_) => "input",
            Self::Resize(_) => "resize",
            Self::Output(_) => "output",
            Self::Closed => "closed",
        }
    }

    /// Serialize to a JSON text frame using the given discriminator name.
    #[must_use]
    pub fn to_wire(&self, tag: WireTag) -> String {
        let mut frame = serde_json::Map::new();
        frame.insert(tag.field().to_string(), self.kind().into());
        match self {
            Self::Input(bytes) | Self::Output(bytes) => {
                frame.insert("data".to_string(), encode_bytes(bytes).into());
            }
            Self::Resize(size) => {
                frame.insert("cols".to_string(), size.cols.into());
                frame.insert("rows".to_string(), size.rows.into());
            }
            Self::Closed => {}
        }
        serde_json::Value::Object(frame).to_string()
    }
}

/// Name of the discriminator field written on outgoing frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireTag {
    /// `{"kind": ...}`
    #[default]
    Kind,
    /// `{"type": ...}`
    Type,
}

impl WireTag {
    /// JSON field name for this tag.
    #[must_use]
    pub fn field(self) -> &'static str {
        match self {
            Self::Kind => "kind",
            Self::Type => "type",
        }
    }
}

impl std::str::FromStr for WireTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kind" => Ok(Self::Kind),
            "type" => Ok(Self::Type),
            other => Err(format!("unknown wire tag '{other}' (expected 'kind' or 'type')")),
        }
    }
}

/// Errors produced when an inbound frame cannot be decoded.
///
/// A frame that fails to decode is dropped whole; nothing from it reaches
/// the terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Not valid JSON, or not a JSON object of the expected shape.
    InvalidJson(String),
    /// The discriminator field is absent.
    MissingKind,
    /// The discriminator names a kind this client does not know.
    UnknownKind(String),
    /// A field required by the kind is absent.
    MissingField {
        /// Kind being decoded.
        kind: &'static str,
        /// Name of the missing field.
        field: &'static str,
    },
    /// The `data` payload is not valid base64.
    InvalidPayload(String),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidJson(msg) => write!(f, "Invalid JSON frame: {msg}"),
            Self::MissingKind => write!(f, "Frame has no kind"),
            Self::UnknownKind(kind) => write!(f, "Unknown frame kind: {kind}"),
            Self::MissingField { kind, field } => {
                write!(f, "Frame of kind {kind} is missing field {field}")
            }
            Self::InvalidPayload(msg) => write!(f, "Invalid payload encoding: {msg}"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Inbound frame before validation.
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(alias = "type")]
    kind: Option<String>,
    data: Option<String>,
    cols: Option<u16>,
    rows: Option<u16>,
}

/// Encode an envelope as a JSON text frame with the `kind` discriminator.
#[must_use]
pub fn encode(envelope: &Envelope) -> String {
    envelope.to_wire(WireTag::Kind)
}

/// Decode a JSON text frame into an envelope.
///
/// Accepts either `kind` or `type` as the discriminator. Unknown fields are
/// ignored.
pub fn decode(text: &str) -> Result<Envelope, DecodeError> {
    let raw: RawFrame =
        serde_json::from_str(text).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

    let kind = raw.kind.ok_or(DecodeError::MissingKind)?;
    match kind.as_str() {
        "input" => Ok(Envelope::Input(decode_data("input", raw.data)?)),
        "output" => Ok(Envelope::Output(decode_data("output", raw.data)?)),
        "resize" => {
            let cols = raw.cols.ok_or(DecodeError::MissingField {
                kind: "resize",
                field: "cols",
            })?;
            let rows = raw.rows.ok_or(DecodeError::MissingField {
                kind: "resize",
                field: "rows",
            })?;
            Ok(Envelope::Resize(TerminalSize::new(cols, rows)))
        }
        "closed" => Ok(Envelope::Closed),
        _ => Err(DecodeError::UnknownKind(kind)),
    }
}

fn decode_data(kind: &'static str, data: Option<String>) -> Result<Vec<u8>, DecodeError> {
    let data = data.ok_or(DecodeError::MissingField {
        kind,
        field: "data",
    })?;
    decode_bytes(&data)
}

/// Encode raw terminal bytes as text-safe base64.
#[must_use]
pub fn encode_bytes(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode base64 text back into raw terminal bytes.
pub fn decode_bytes(text: &str) -> Result<Vec<u8>, DecodeError> {
    STANDARD
        .decode(text)
        .map_err(|e| DecodeError::InvalidPayload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_byte_values_round_trip() {
        let bytes: Vec<u8> = (0..=255u8).collect();
        let frame = encode(&Envelope::Output(bytes.clone()));
        assert_eq!(decode(&frame).unwrap(), Envelope::Output(bytes));
    }

    #[test]
    fn test_nul_and_invalid_utf8_round_trip() {
        // NUL, a lone continuation byte and a truncated 3-byte sequence
        let bytes = vec![0x00, b'a', 0x80, 0xE2, 0x82, 0x00, 0xFF];
        let frame = encode(&Envelope::Input(bytes.clone()));
        assert_eq!(decode(&frame).unwrap(), Envelope::Input(bytes));
    }

    #[test]
    fn test_encode_input_shape() {
        let frame = encode(&Envelope::input_text("ls\r"));
        let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json["kind"], "input");
        assert_eq!(json["data"], "bHMN");
        assert!(json.get("cols").is_none());
    }

    #[test]
    fn test_encode_resize_shape() {
        let frame = encode(&Envelope::Resize(TerminalSize::new(120, 40)));
        let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json["kind"], "resize");
        assert_eq!(json["cols"], 120);
        assert_eq!(json["rows"], 40);
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_to_wire_with_type_tag() {
        let frame = Envelope::Resize(TerminalSize::new(80, 24)).to_wire(WireTag::Type);
        let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json["type"], "resize");
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn test_decode_accepts_type_discriminator() {
        assert_eq!(
            decode(r#"{"type":"output","data":"aGk="}"#).unwrap(),
            Envelope::Output(b"hi".to_vec())
        );
        assert_eq!(decode(r#"{"type":"closed"}"#).unwrap(), Envelope::Closed);
    }

    #[test]
    fn test_decode_closed_ignores_extra_fields() {
        assert_eq!(
            decode(r#"{"kind":"closed","reason":"exit"}"#).unwrap(),
            Envelope::Closed
        );
    }

    #[test]
    fn test_decode_empty_output() {
        assert_eq!(
            decode(r#"{"kind":"output","data":""}"#).unwrap(),
            Envelope::Output(Vec::new())
        );
    }

    #[test]
    fn test_decode_invalid_json() {
        assert!(matches!(
            decode("{not json"),
            Err(DecodeError::InvalidJson(_))
        ));
        assert!(matches!(decode("42"), Err(DecodeError::InvalidJson(_))));
    }

    #[test]
    fn test_decode_missing_kind() {
        assert_eq!(
            decode(r#"{"data":"aGk="}"#),
            Err(DecodeError::MissingKind)
        );
    }

    #[test]
    fn test_decode_unknown_kind() {
        assert_eq!(
            decode(r#"{"kind":"bell"}"#),
            Err(DecodeError::UnknownKind("bell".to_string()))
        );
    }

    #[test]
    fn test_decode_output_without_data() {
        assert_eq!(
            decode(r#"{"kind":"output"}"#),
            Err(DecodeError::MissingField {
                kind: "output",
                field: "data"
            })
        );
    }

    #[test]
    fn test_decode_resize_without_rows() {
        assert_eq!(
            decode(r#"{"kind":"resize","cols":80}"#),
            Err(DecodeError::MissingField {
                kind: "resize",
                field: "rows"
            })
        );
    }

    #[test]
    fn test_decode_bad_base64_is_dropped_whole() {
        assert!(matches!(
            decode(r#"{"kind":"output","data":"not base64!"}"#),
            Err(DecodeError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_terminal_size_is_measured() {
        assert!(TerminalSize::new(80, 24).is_measured());
        assert!(!TerminalSize::new(0, 24).is_measured());
        assert!(!TerminalSize::new(80, 0).is_measured());
        assert_eq!(TerminalSize::new(120, 40).to_string(), "120x40");
    }

    #[test]
    fn test_wire_tag_from_str() {
        assert_eq!("kind".parse::<WireTag>().unwrap(), WireTag::Kind);
        assert_eq!("type".parse::<WireTag>().unwrap(), WireTag::Type);
        assert!("tag".parse::<WireTag>().is_err());
    }

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::MissingField {
            kind: "resize",
            field: "cols",
        };
        assert_eq!(err.to_string(), "Frame of kind resize is missing field cols");
    }
}
