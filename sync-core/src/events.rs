//! Notification decoding for the incremental path.
//!
//! [`decide`] runs the validation steps for one queue message and returns
//! what should happen, without performing it:
//!
//! 1. parse the envelope (`Malformed` on failure)
//! 2. acknowledge provider test events
//! 3. require exactly one complete record (`Invalid` otherwise)
//! 4. classify the event name (`UnknownAction` for unmodelled families)
//! 5. match a bucket rule (no match is an acknowledged no-op)

use sync_types::{BucketRule, EventError, EventKind, EventRecord, Notification};

/// Why a message needs no replication work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ignored {
    /// Synthetic test event sent when notifications are configured.
    TestEvent,
    /// The object is outside every configured rule.
    NoMatchingRule {
        /// Bucket named in the notification.
        bucket: String,
        /// Decoded object key.
        key: String,
    },
}

/// Outcome of decoding one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDecision<'r> {
    /// Acknowledge without doing anything.
    Ignore(Ignored),
    /// Copy the object to every destination region of `rule`.
    Replicate {
        /// Matched rule.
        rule: &'r BucketRule,
        /// Source key.
        key: String,
        /// Size reported by the notification.
        size: u64,
    },
    /// Delete the object's destination key in every destination region.
    Remove {
        /// Matched rule.
        rule: &'r BucketRule,
        /// Source key.
        key: String,
    },
}

/// Find the rule whose source bucket is `bucket` and whose prefix starts `key`.
///
/// Rules are tried in configuration order; the first match wins.
pub fn match_rule<'r>(rules: &'r [BucketRule], bucket: &str, key: &str) -> Option<&'r BucketRule> {
    rules.iter().find(|rule| rule.matches(bucket, key))
}

/// Decode a queue message body into a replication decision.
///
/// # Errors
///
/// - [`EventError::Malformed`] if the body is not a notification envelope
/// - [`EventError::Invalid`] if the envelope lacks exactly one complete record
/// - [`EventError::UnknownAction`] for an unmodelled event family
/// - [`EventError::Unsupported`] for `ReducedRedundancyLostObject` on a
///   matched object
pub fn decide<'r>(rules: &'r [BucketRule], body: &str) -> Result<EventDecision<'r>, EventError> {
    let notification = Notification::parse(body)?;
    if notification.is_test_event() {
        return Ok(EventDecision::Ignore(Ignored::TestEvent));
    }

    let record = single_record(&notification)?;
    let change = validate(record)?;
    let kind = EventKind::from_event_name(change.event_name)?;

    let Some(rule) = match_rule(rules, change.bucket, &change.key) else {
        return Ok(EventDecision::Ignore(Ignored::NoMatchingRule {
            bucket: change.bucket.to_string(),
            key: change.key,
        }));
    };

    match kind {
        EventKind::ObjectCreated => {
            let size = change.size.ok_or_else(|| {
                EventError::Invalid(format!("{} without s3.object.size", change.event_name))
            })?;
            Ok(EventDecision::Replicate {
                rule,
                key: change.key,
                size,
            })
        }
        EventKind::ObjectRemoved => Ok(EventDecision::Remove {
            rule,
            key: change.key,
        }),
        EventKind::ReducedRedundancyLostObject => {
            Err(EventError::Unsupported(change.event_name.to_string()))
        }
    }
}

/// The fields of a record that passed schema validation.
struct Change<'a> {
    event_name: &'a str,
    bucket: &'a str,
    key: String,
    size: Option<u64>,
}

fn single_record(notification: &Notification) -> Result<&EventRecord, EventError> {
    match notification.records.as_deref() {
        Some([record]) => Ok(record),
        Some(records) => Err(EventError::Invalid(format!(
            "expected exactly one record, got {}",
            records.len()
        ))),
        None => Err(EventError::Invalid("missing Records".into())),
    }
}

fn validate(record: &EventRecord) -> Result<Change<'_>, EventError> {
    let missing = |field: &str| EventError::Invalid(format!("missing {}", field));

    record
        .event_source
        .as_deref()
        .ok_or_else(|| missing("eventSource"))?;
    record
        .aws_region
        .as_deref()
        .ok_or_else(|| missing("awsRegion"))?;
    let event_name = record
        .event_name
        .as_deref()
        .ok_or_else(|| missing("eventName"))?;
    let s3 = record.s3.as_ref().ok_or_else(|| missing("s3"))?;
    let bucket = s3
        .bucket
        .as_ref()
        .and_then(|bucket| bucket.name.as_deref())
        .ok_or_else(|| missing("s3.bucket.name"))?;
    let object = s3.object.as_ref().ok_or_else(|| missing("s3.object"))?;
    let key = object.decoded_key()?;

    Ok(Change {
        event_name,
        bucket,
        key,
        size: object.size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> Vec<BucketRule> {
        vec![
            BucketRule {
                source_bucket: "srcbucket".into(),
                source_prefix: "srcfolder/".into(),
                source_region: "us-west-2".into(),
                dest_bucket: "destbucket".into(),
                dest_prefix: "destfolder/".into(),
                dest_regions: vec!["us-west-2".into(), "eu-west-1".into()],
            },
            BucketRule {
                source_bucket: "srcbucket2".into(),
                source_prefix: "srcfolder2/".into(),
                source_region: "us-east-1".into(),
                dest_bucket: "destbucket".into(),
                dest_prefix: "destfolder2/".into(),
                dest_regions: vec!["us-east-1".into()],
            },
        ]
    }

    fn body(event_name: &str, bucket: &str, key: &str, size: Option<u64>) -> String {
        let size = size.map(|s| format!(r#", "size": {}"#, s)).unwrap_or_default();
        format!(
            r#"{{"Records":[{{"eventSource":"aws:s3","awsRegion":"us-west-2","eventName":"{}","s3":{{"bucket":{{"name":"{}"}},"object":{{"key":"{}"{}}}}}}}]}}"#,
            event_name, bucket, key, size
        )
    }

    #[test]
    fn test_event_is_ignored() {
        let rules = rules();
        let decision = decide(&rules, r#"{"Event":"s3:TestEvent","Bucket":"srcbucket"}"#).unwrap();
        assert_eq!(decision, EventDecision::Ignore(Ignored::TestEvent));
    }

    #[test]
    fn created_event_replicates() {
        let rules = rules();
        let decision = decide(
            &rules,
            &body("ObjectCreated:Put", "srcbucket", "srcfolder/a.txt", Some(42)),
        )
        .unwrap();
        assert_eq!(
            decision,
            EventDecision::Replicate {
                rule: &rules[0],
                key: "srcfolder/a.txt".into(),
                size: 42,
            }
        );
    }

    #[test]
    fn removed_event_removes() {
        let rules = rules();
        let decision = decide(
            &rules,
            &body("ObjectRemoved:Delete", "srcbucket2", "srcfolder2/x", None),
        )
        .unwrap();
        assert_eq!(
            decision,
            EventDecision::Remove {
                rule: &rules[1],
                key: "srcfolder2/x".into(),
            }
        );
    }

    #[test]
    fn unmatched_object_is_ignored() {
        let rules = rules();
        let decision = decide(
            &rules,
            &body("ObjectCreated:Put", "srcbucket", "elsewhere/a.txt", Some(1)),
        )
        .unwrap();
        assert_eq!(
            decision,
            EventDecision::Ignore(Ignored::NoMatchingRule {
                bucket: "srcbucket".into(),
                key: "elsewhere/a.txt".into(),
            })
        );
    }

    #[test]
    fn key_is_decoded_before_matching() {
        let rules = rules();
        let decision = decide(
            &rules,
            &body("ObjectCreated:Put", "srcbucket", "srcfolder/my+file%21", Some(1)),
        )
        .unwrap();
        assert!(matches!(
            decision,
            EventDecision::Replicate { key, .. } if key == "srcfolder/my file!"
        ));
    }

    #[test]
    fn malformed_body_is_rejected() {
        assert!(matches!(
            decide(&rules(), "{"),
            Err(EventError::Malformed(_))
        ));
    }

    #[test]
    fn zero_or_many_records_are_invalid() {
        assert!(matches!(
            decide(&rules(), r#"{"Records":[]}"#),
            Err(EventError::Invalid(_))
        ));
        let one = body("ObjectCreated:Put", "srcbucket", "srcfolder/a", Some(1));
        let record = &one[r#"{"Records":["#.len()..one.len() - 2];
        let two = format!(r#"{{"Records":[{},{}]}}"#, record, record);
        assert!(matches!(decide(&rules(), &two), Err(EventError::Invalid(_))));
        assert!(matches!(decide(&rules(), "{}"), Err(EventError::Invalid(_))));
    }

    #[test]
    fn missing_fields_are_invalid() {
        let no_region = r#"{"Records":[{"eventSource":"aws:s3","eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"srcbucket"},"object":{"key":"srcfolder/a","size":1}}}]}"#;
        assert!(matches!(
            decide(&rules(), no_region),
            Err(EventError::Invalid(msg)) if msg.contains("awsRegion")
        ));
        let no_key = r#"{"Records":[{"eventSource":"aws:s3","awsRegion":"us-west-2","eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"srcbucket"},"object":{}}}]}"#;
        assert!(matches!(
            decide(&rules(), no_key),
            Err(EventError::Invalid(msg)) if msg.contains("s3.object.key")
        ));
    }

    #[test]
    fn created_without_size_is_invalid() {
        assert!(matches!(
            decide(
                &rules(),
                &body("ObjectCreated:Put", "srcbucket", "srcfolder/a", None)
            ),
            Err(EventError::Invalid(_))
        ));
    }

    #[test]
    fn unknown_action_fails_loudly() {
        assert!(matches!(
            decide(
                &rules(),
                &body("ObjectRestore:Completed", "srcbucket", "srcfolder/a", Some(1))
            ),
            Err(EventError::UnknownAction(_))
        ));
    }

    #[test]
    fn lost_object_is_unsupported() {
        assert!(matches!(
            decide(
                &rules(),
                &body("ReducedRedundancyLostObject", "srcbucket", "srcfolder/a", Some(1))
            ),
            Err(EventError::Unsupported(_))
        ));
    }

    #[test]
    fn first_matching_rule_wins() {
        let mut rules = rules();
        let mut broader = rules[0].clone();
        broader.source_prefix = String::new();
        broader.dest_bucket = "broad".into();
        rules.push(broader);
        let rule = match_rule(&rules, "srcbucket", "srcfolder/a").unwrap();
        assert_eq!(rule.dest_bucket, "destbucket");
        let rule = match_rule(&rules, "srcbucket", "other/a").unwrap();
        assert_eq!(rule.dest_bucket, "broad");
    }
}
