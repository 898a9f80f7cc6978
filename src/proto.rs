//! Wire-level records and the JSON frames exchanged with relays.
//!
//! A [`Record`] is an immutable, signed, timestamped unit of data. Records of
//! kind [`RecordKind::CatalogListing`] carry a catalog listing encoded in
//! their tag list; records of kind [`RecordKind::Retraction`] instruct
//! consumers to treat a previously published identity as deleted.
//!
//! The frame shapes are heterogeneous JSON arrays, so they are encoded and
//! decoded by hand against [`serde_json::Value`] rather than derived.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Numeric kind of a catalog listing record.
pub const CATALOG_LISTING_KIND: u16 = 30402;

/// Numeric kind of a retraction record.
pub const RETRACTION_KIND: u16 = 5;

/// Logical kind of a record.
///
/// Unknown kinds are carried through unmodified so that a pool shared with
/// other subscribers never drops frames it does not understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", from = "u16")]
pub enum RecordKind {
    /// A replaceable catalog listing.
    CatalogListing,
    /// A retraction of a previously published record.
    Retraction,
    /// Any other kind, preserved bit-exact.
    Other(u16),
}

impl From<u16> for RecordKind {
    fn from(value: u16) -> Self {
        match value {
            CATALOG_LISTING_KIND => RecordKind::CatalogListing,
            RETRACTION_KIND => RecordKind::Retraction,
            other => RecordKind::Other(other),
        }
    }
}

impl From<RecordKind> for u16 {
    fn from(value: RecordKind) -> Self {
        match value {
            RecordKind::CatalogListing => CATALOG_LISTING_KIND,
            RecordKind::Retraction => RETRACTION_KIND,
            RecordKind::Other(other) => other,
        }
    }
}

/// A signed, immutable record as it travels over the wire.
///
/// The field set and tag encoding are interoperable with other catalog
/// clients: `kind` is the numeric identifier, `content` is free text and
/// `tags` is an ordered list of string arrays whose first element is the tag
/// name. Duplicate tag names are legal and their relative order is
/// significant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Content address of the record, lowercase hex.
    pub id: String,
    /// Author identity, lowercase hex.
    pub pubkey: String,
    /// Creation timestamp, seconds since the unix epoch.
    pub created_at: u64,
    /// Logical kind.
    pub kind: RecordKind,
    /// Ordered tag list.
    pub tags: Vec<Vec<String>>,
    /// Free-text payload.
    pub content: String,
    /// Signature over the record id, lowercase hex.
    pub sig: String,
}

impl Record {
    /// Returns the first value of the first tag with the given name.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.first().map(String::as_str) == Some(name))
            .and_then(|tag| tag.get(1))
            .map(String::as_str)
    }

    /// Iterates over all tags with the given name, yielding the elements
    /// after the tag name.
    pub fn tags_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a [String]> + 'a {
        self.tags
            .iter()
            .filter(move |tag| tag.first().map(String::as_str) == Some(name))
            .map(|tag| &tag[1..])
    }

    /// The unsigned view of this record, as passed to validators.
    pub fn as_draft(&self) -> DraftRecord {
        DraftRecord {
            kind: self.kind,
            created_at: self.created_at,
            tags: self.tags.clone(),
            content: self.content.clone(),
        }
    }
}

/// An unsigned record, the input to the signing capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftRecord {
    /// Logical kind.
    pub kind: RecordKind,
    /// Creation timestamp, seconds since the unix epoch.
    pub created_at: u64,
    /// Ordered tag list.
    pub tags: Vec<Vec<String>>,
    /// Free-text payload.
    pub content: String,
}

/// Subscription filter sent to relays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Record kinds to match. An empty list matches nothing.
    pub kinds: Vec<RecordKind>,
}

impl Filter {
    /// Filter matching the given kinds.
    pub fn kinds(kinds: impl IntoIterator<Item = RecordKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }

    /// Whether the record passes this filter.
    pub fn matches(&self, record: &Record) -> bool {
        self.kinds.contains(&record.kind)
    }
}

/// Errors decoding a wire frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload was not valid JSON.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    /// The payload was JSON but not a known frame.
    #[error("malformed frame: {0}")]
    Malformed(&'static str),
}

/// Frames sent from the client to a relay.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    /// Open or replace a subscription.
    Req {
        /// Client-chosen subscription id.
        sub_id: String,
        /// Filter for the subscription.
        filter: Filter,
    },
    /// Close a subscription.
    Close {
        /// Subscription id to close.
        sub_id: String,
    },
    /// Publish a signed record.
    Publish {
        /// The record to publish.
        record: Record,
    },
}

impl ClientFrame {
    /// Encodes the frame as a JSON array.
    pub fn to_json(&self) -> String {
        let value = match self {
            ClientFrame::Req { sub_id, filter } => json!(["REQ", sub_id, filter]),
            ClientFrame::Close { sub_id } => json!(["CLOSE", sub_id]),
            ClientFrame::Publish { record } => json!(["EVENT", record]),
        };
        value.to_string()
    }

    /// Decodes a frame from its JSON text form.
    pub fn from_json(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text)?;
        let items = value
            .as_array()
            .ok_or(FrameError::Malformed("expected array"))?;
        let label = items
            .first()
            .and_then(Value::as_str)
            .ok_or(FrameError::Malformed("missing frame label"))?;
        match label {
            "REQ" => {
                let sub_id = frame_str(items, 1)?;
                let filter = items
                    .get(2)
                    .cloned()
                    .ok_or(FrameError::Malformed("REQ without filter"))?;
                let filter: Filter = serde_json::from_value(filter)?;
                Ok(ClientFrame::Req { sub_id, filter })
            }
            "CLOSE" => Ok(ClientFrame::Close {
                sub_id: frame_str(items, 1)?,
            }),
            "EVENT" => {
                let record = items
                    .get(1)
                    .cloned()
                    .ok_or(FrameError::Malformed("EVENT without record"))?;
                Ok(ClientFrame::Publish {
                    record: serde_json::from_value(record)?,
                })
            }
            _ => Err(FrameError::Malformed("unknown client frame")),
        }
    }
}

/// Frames sent from a relay to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayFrame {
    /// A record matching one of our subscriptions.
    Event {
        /// Subscription the record matched.
        sub_id: String,
        /// The record itself.
        record: Record,
    },
    /// Acknowledgement for a published record.
    Ok {
        /// Id of the record the acknowledgement refers to.
        record_id: String,
        /// Whether the relay accepted the record.
        accepted: bool,
        /// Human-readable detail, possibly empty.
        message: String,
    },
    /// End of stored records for a subscription; live records follow.
    Eose {
        /// Subscription id.
        sub_id: String,
    },
    /// Free-form notice from the relay.
    Notice {
        /// The notice text.
        message: String,
    },
}

impl RelayFrame {
    /// Encodes the frame as a JSON array.
    pub fn to_json(&self) -> String {
        let value = match self {
            RelayFrame::Event { sub_id, record } => json!(["EVENT", sub_id, record]),
            RelayFrame::Ok {
                record_id,
                accepted,
                message,
            } => json!(["OK", record_id, accepted, message]),
            RelayFrame::Eose { sub_id } => json!(["EOSE", sub_id]),
            RelayFrame::Notice { message } => json!(["NOTICE", message]),
        };
        value.to_string()
    }

    /// Decodes a frame from its JSON text form.
    pub fn from_json(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text)?;
        let items = value
            .as_array()
            .ok_or(FrameError::Malformed("expected array"))?;
        let label = items
            .first()
            .and_then(Value::as_str)
            .ok_or(FrameError::Malformed("missing frame label"))?;
        match label {
            "EVENT" => {
                let sub_id = frame_str(items, 1)?;
                let record = items
                    .get(2)
                    .cloned()
                    .ok_or(FrameError::Malformed("EVENT without record"))?;
                Ok(RelayFrame::Event {
                    sub_id,
                    record: serde_json::from_value(record)?,
                })
            }
            "OK" => {
                let record_id = frame_str(items, 1)?;
                let accepted = items
                    .get(2)
                    .and_then(Value::as_bool)
                    .ok_or(FrameError::Malformed("OK without flag"))?;
                let message = items
                    .get(3)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(RelayFrame::Ok {
                    record_id,
                    accepted,
                    message,
                })
            }
            "EOSE" => Ok(RelayFrame::Eose {
                sub_id: frame_str(items, 1)?,
            }),
            "NOTICE" => Ok(RelayFrame::Notice {
                message: frame_str(items, 1)?,
            }),
            _ => Err(FrameError::Malformed("unknown relay frame")),
        }
    }
}

fn frame_str(items: &[Value], index: usize) -> Result<String, FrameError> {
    items
        .get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(FrameError::Malformed("expected string element"))
}

/// Current wall clock, seconds since the unix epoch.
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> Record {
        Record {
            id: "ab".repeat(32),
            pubkey: "cd".repeat(32),
            created_at: 1_700_000_000,
            kind: RecordKind::CatalogListing,
            tags: vec![
                vec!["d".into(), "widget-1".into()],
                vec!["title".into(), "Widget".into()],
                vec!["price".into(), "9.99".into(), "USD".into()],
                vec!["image".into(), "https://example.com/a.png".into()],
                vec!["image".into(), "https://example.com/b.png".into()],
            ],
            content: "A fine widget".into(),
            sig: "ef".repeat(64),
        }
    }

    #[test]
    fn kind_roundtrip_preserves_unknown() {
        for raw in [CATALOG_LISTING_KIND, RETRACTION_KIND, 1, 30018] {
            let kind = RecordKind::from(raw);
            assert_eq!(u16::from(kind), raw);
        }
        let json = serde_json::to_string(&RecordKind::Other(30018)).unwrap();
        assert_eq!(json, "30018");
    }

    #[test]
    fn record_wire_shape() {
        let record = sample_record();
        let json: Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], json!(30402));
        assert_eq!(json["tags"][0], json!(["d", "widget-1"]));
        assert_eq!(json["content"], json!("A fine widget"));

        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn tag_lookup() {
        let record = sample_record();
        assert_eq!(record.tag_value("d"), Some("widget-1"));
        assert_eq!(record.tag_value("missing"), None);
        let images: Vec<_> = record.tags_named("image").collect();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0][0], "https://example.com/a.png");
    }

    #[test]
    fn client_frame_roundtrip() {
        let frames = [
            ClientFrame::Req {
                sub_id: "7".into(),
                filter: Filter::kinds([RecordKind::CatalogListing, RecordKind::Retraction]),
            },
            ClientFrame::Close { sub_id: "7".into() },
            ClientFrame::Publish {
                record: sample_record(),
            },
        ];
        for frame in frames {
            let text = frame.to_json();
            let back = ClientFrame::from_json(&text).unwrap();
            assert_eq!(back, frame);
        }
    }

    #[test]
    fn relay_frame_roundtrip() {
        let frames = [
            RelayFrame::Event {
                sub_id: "7".into(),
                record: sample_record(),
            },
            RelayFrame::Ok {
                record_id: "ab".repeat(32),
                accepted: true,
                message: String::new(),
            },
            RelayFrame::Eose { sub_id: "7".into() },
            RelayFrame::Notice {
                message: "slow down".into(),
            },
        ];
        for frame in frames {
            let text = frame.to_json();
            let back = RelayFrame::from_json(&text).unwrap();
            assert_eq!(back, frame);
        }
    }

    #[test]
    fn malformed_frames_are_rejected() {
        for text in ["{}", "[]", "[\"REQ\"]", "[\"WHAT\", \"x\"]", "not json"] {
            assert!(RelayFrame::from_json(text).is_err(), "accepted: {text}");
        }
    }
}
