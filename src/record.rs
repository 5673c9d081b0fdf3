// src/record.rs
// On-disk format of a failure record.
//
// A record is one line: `batch_name-recipient-sequence_index-payload\n`.
// Splitting the body (without its terminator) on `-` must give exactly four
// fields, so no field may contain the delimiter or the terminator.

use serde::Serialize;

use crate::error::RecordError;
use crate::job::{Job, Lineage};

pub const FIELD_DELIMITER: char = '-';
pub const RECORD_TERMINATOR: char = '\n';

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub batch_name: String,
    pub recipient: String,
    pub sequence_index: u64,
    pub payload: String,
}

impl FailureRecord {
    pub fn from_job(job: &Job) -> Self {
        Self {
            batch_name: job.batch_name().to_string(),
            recipient: job.recipient().to_string(),
            sequence_index: job.sequence_index(),
            payload: job.payload().to_string(),
        }
    }

    /// A fresh relay job carrying this record's content, attempt counter at 0.
    pub fn into_job(self) -> Job {
        Job::new(
            Lineage::Relay,
            self.batch_name,
            self.recipient,
            self.sequence_index,
            self.payload,
        )
    }

    pub fn validate(&self) -> Result<(), RecordError> {
        let fields = [
            ("batch_name", self.batch_name.as_str()),
            ("recipient", self.recipient.as_str()),
            ("payload", self.payload.as_str()),
        ];
        for (field, value) in fields {
            for ch in [FIELD_DELIMITER, RECORD_TERMINATOR] {
                if value.contains(ch) {
                    return Err(RecordError::ReservedCharacter { field, ch });
                }
            }
        }
        if self.batch_name.is_empty() {
            return Err(RecordError::EmptyField("batch_name"));
        }
        if self.recipient.is_empty() {
            return Err(RecordError::EmptyField("recipient"));
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<String, RecordError> {
        self.validate()?;
        Ok(format!(
            "{}{d}{}{d}{}{d}{}{RECORD_TERMINATOR}",
            self.batch_name,
            self.recipient,
            self.sequence_index,
            self.payload,
            d = FIELD_DELIMITER,
        ))
    }

    /// Parses a record body. The terminator is optional so records written
    /// without one still load.
    pub fn decode(body: &str) -> Result<Self, RecordError> {
        let body = body.strip_suffix(RECORD_TERMINATOR).unwrap_or(body);
        if body.contains(RECORD_TERMINATOR) {
            return Err(RecordError::ReservedCharacter {
                field: "payload",
                ch: RECORD_TERMINATOR,
            });
        }

        let fields: Vec<&str> = body.split(FIELD_DELIMITER).collect();
        let [batch_name, recipient, sequence_index, payload] = fields.as_slice() else {
            return Err(RecordError::FieldCount {
                found: fields.len(),
            });
        };

        let record = Self {
            batch_name: batch_name.to_string(),
            recipient: recipient.to_string(),
            sequence_index: sequence_index
                .parse()
                .map_err(|_| RecordError::InvalidSequenceIndex(sequence_index.to_string()))?,
            payload: payload.to_string(),
        };
        record.validate()?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> FailureRecord {
        FailureRecord {
            batch_name: "transmission_20200101101010000000_abc123.log".to_string(),
            recipient: "earth".to_string(),
            sequence_index: 2,
            payload: "SOS".to_string(),
        }
    }

    #[test]
    fn encodes_the_four_fields_in_order() {
        assert_eq!(
            record().encode().expect("encode"),
            "transmission_20200101101010000000_abc123.log-earth-2-SOS\n"
        );
    }

    #[test]
    fn decodes_what_it_encodes() {
        let encoded = record().encode().expect("encode");
        assert_eq!(FailureRecord::decode(&encoded).expect("decode"), record());
    }

    #[test]
    fn decodes_without_terminator() {
        let decoded = FailureRecord::decode("batch-earth-7-01100100").expect("decode");
        assert_eq!(decoded.sequence_index, 7);
        assert_eq!(decoded.payload, "01100100");
    }

    #[test]
    fn empty_payload_is_allowed() {
        let decoded = FailureRecord::decode("batch-earth-0-\n").expect("decode");
        assert_eq!(decoded.payload, "");
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert_eq!(
            FailureRecord::decode("batch-earth-2"),
            Err(RecordError::FieldCount { found: 3 })
        );
        assert_eq!(
            FailureRecord::decode("batch-padme-amidala-2-SOS"),
            Err(RecordError::FieldCount { found: 5 })
        );
        assert_eq!(FailureRecord::decode(""), Err(RecordError::FieldCount { found: 1 }));
    }

    #[test]
    fn rejects_bad_sequence_index() {
        assert_eq!(
            FailureRecord::decode("batch-earth-two-SOS"),
            Err(RecordError::InvalidSequenceIndex("two".to_string()))
        );
    }

    #[test]
    fn rejects_embedded_terminator() {
        assert!(FailureRecord::decode("batch-earth-2-S\nOS").is_err());
    }

    #[test]
    fn refuses_to_encode_reserved_characters() {
        let mut hyphenated = record();
        hyphenated.recipient = "padme-amidala".to_string();
        assert_eq!(
            hyphenated.encode(),
            Err(RecordError::ReservedCharacter {
                field: "recipient",
                ch: '-'
            })
        );

        let mut empty = record();
        empty.batch_name.clear();
        assert_eq!(empty.encode(), Err(RecordError::EmptyField("batch_name")));
    }

    #[test]
    fn into_job_starts_a_fresh_relay_attempt() {
        let job = record().into_job();
        assert_eq!(job.lineage(), Lineage::Relay);
        assert_eq!(job.attempt_count(), 0);
        assert_eq!(FailureRecord::from_job(&job), record());
    }
}
