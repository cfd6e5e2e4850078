//! Field-level request validation.
//!
//! Each operation has a table of [`Field`]s. A request body is checked in two
//! passes: the type pass rejects values of the wrong JSON shape with a
//! `SerializationException` and produces a normalized object (nulls and
//! unknown members dropped, integers made integral); the constraint pass then
//! collects every broken constraint into one `ValidationException` message.

use kinesim_types::Operation;
use serde_json::{Map, Value as JsonValue};

use crate::error::ProtocolError;

#[derive(Debug, Clone, Copy)]
enum Pattern {
    Name,
    HashKey,
    SequenceNumber,
}

impl Pattern {
    fn as_str(self) -> &'static str {
        match self {
            Self::Name => "[a-zA-Z0-9_.-]+",
            Self::HashKey => "0|([1-9]\\d{0,38})",
            Self::SequenceNumber => "0|([1-9]\\d{0,128})",
        }
    }

    fn matches(self, value: &str) -> bool {
        match self {
            Self::Name => {
                !value.is_empty()
                    && value
                        .bytes()
                        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
            }
            Self::HashKey => is_decimal(value, 39),
            Self::SequenceNumber => is_decimal(value, 129),
        }
    }
}

fn is_decimal(value: &str, max_digits: usize) -> bool {
    value == "0"
        || (!value.is_empty()
            && value.len() <= max_digits
            && !value.starts_with('0')
            && value.bytes().all(|b| b.is_ascii_digit()))
}

#[derive(Debug, Clone, Copy)]
enum Rule {
    Required,
    MinLen(usize),
    MaxLen(usize),
    Min(i64),
    Max(i64),
    Matches(Pattern),
    OneOf(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Str,
    Int,
    Blob,
    Timestamp,
    StrList(&'static [Rule]),
    /// Key rules, then value rules
    StrMap(&'static [Rule], &'static [Rule]),
    Structs(&'static [Field]),
}

#[derive(Debug, Clone, Copy)]
struct Field {
    name: &'static str,
    kind: Kind,
    rules: &'static [Rule],
}

const fn field(name: &'static str, kind: Kind, rules: &'static [Rule]) -> Field {
    Field { name, kind, rules }
}

const NAME_RULES: &[Rule] = &[Rule::MinLen(1), Rule::MaxLen(128), Rule::Matches(Pattern::Name)];
const REQUIRED_NAME_RULES: &[Rule] = &[
    Rule::Required,
    Rule::MinLen(1),
    Rule::MaxLen(128),
    Rule::Matches(Pattern::Name),
];
const ITERATOR_TYPES: &[&str] = &[
    "AT_SEQUENCE_NUMBER",
    "AFTER_SEQUENCE_NUMBER",
    "TRIM_HORIZON",
    "LATEST",
    "AT_TIMESTAMP",
];

const STREAM_NAME: Field = field("StreamName", Kind::Str, REQUIRED_NAME_RULES);
const DATA: Field = field("Data", Kind::Blob, &[Rule::Required, Rule::MaxLen(1024 * 1024)]);
const EXPLICIT_HASH_KEY: Field = field(
    "ExplicitHashKey",
    Kind::Str,
    &[Rule::Matches(Pattern::HashKey)],
);
const PARTITION_KEY: Field = field(
    "PartitionKey",
    Kind::Str,
    &[Rule::Required, Rule::MinLen(1), Rule::MaxLen(256)],
);
const RETENTION_HOURS: Field = field(
    "RetentionPeriodHours",
    Kind::Int,
    &[Rule::Required, Rule::Min(1), Rule::Max(8760)],
);

const ADD_TAGS: &[Field] = &[
    STREAM_NAME,
    field(
        "Tags",
        Kind::StrMap(&[Rule::MinLen(1), Rule::MaxLen(128)], &[Rule::MaxLen(256)]),
        &[Rule::Required, Rule::MinLen(1), Rule::MaxLen(10)],
    ),
];
const CREATE_STREAM: &[Field] = &[
    field(
        "ShardCount",
        Kind::Int,
        &[Rule::Required, Rule::Min(1), Rule::Max(100_000)],
    ),
    STREAM_NAME,
];
const RETENTION: &[Field] = &[RETENTION_HOURS, STREAM_NAME];
const DELETE_STREAM: &[Field] = &[STREAM_NAME];
const DESCRIBE_STREAM: &[Field] = &[
    field("ExclusiveStartShardId", Kind::Str, NAME_RULES),
    field("Limit", Kind::Int, &[Rule::Min(1), Rule::Max(10_000)]),
    STREAM_NAME,
];
const GET_RECORDS: &[Field] = &[
    field("Limit", Kind::Int, &[Rule::Min(1), Rule::Max(10_000)]),
    field(
        "ShardIterator",
        Kind::Str,
        &[Rule::Required, Rule::MinLen(1), Rule::MaxLen(512)],
    ),
];
const GET_SHARD_ITERATOR: &[Field] = &[
    field("ShardId", Kind::Str, REQUIRED_NAME_RULES),
    field(
        "ShardIteratorType",
        Kind::Str,
        &[Rule::Required, Rule::OneOf(ITERATOR_TYPES)],
    ),
    field(
        "StartingSequenceNumber",
        Kind::Str,
        &[Rule::Matches(Pattern::SequenceNumber)],
    ),
    STREAM_NAME,
    field("Timestamp", Kind::Timestamp, &[]),
];
const LIST_STREAMS: &[Field] = &[
    field("ExclusiveStartStreamName", Kind::Str, NAME_RULES),
    field("Limit", Kind::Int, &[Rule::Min(1), Rule::Max(10_000)]),
];
const LIST_TAGS: &[Field] = &[
    field(
        "ExclusiveStartTagKey",
        Kind::Str,
        &[Rule::MinLen(1), Rule::MaxLen(128)],
    ),
    field("Limit", Kind::Int, &[Rule::Min(1), Rule::Max(50)]),
    STREAM_NAME,
];
const MERGE_SHARDS: &[Field] = &[
    field("AdjacentShardToMerge", Kind::Str, REQUIRED_NAME_RULES),
    field("ShardToMerge", Kind::Str, REQUIRED_NAME_RULES),
    STREAM_NAME,
];
const PUT_RECORD: &[Field] = &[
    DATA,
    EXPLICIT_HASH_KEY,
    PARTITION_KEY,
    field(
        "SequenceNumberForOrdering",
        Kind::Str,
        &[Rule::Matches(Pattern::SequenceNumber)],
    ),
    STREAM_NAME,
];
const PUT_RECORDS: &[Field] = &[
    field(
        "Records",
        Kind::Structs(&[DATA, EXPLICIT_HASH_KEY, PARTITION_KEY]),
        &[Rule::Required, Rule::MinLen(1), Rule::MaxLen(500)],
    ),
    STREAM_NAME,
];
const REMOVE_TAGS: &[Field] = &[
    STREAM_NAME,
    field(
        "TagKeys",
        Kind::StrList(&[Rule::MinLen(1), Rule::MaxLen(128)]),
        &[Rule::Required, Rule::MinLen(1), Rule::MaxLen(10)],
    ),
];
const SPLIT_SHARD: &[Field] = &[
    field(
        "NewStartingHashKey",
        Kind::Str,
        &[Rule::Required, Rule::Matches(Pattern::HashKey)],
    ),
    field("ShardToSplit", Kind::Str, REQUIRED_NAME_RULES),
    STREAM_NAME,
];

fn fields_for(operation: Operation) -> &'static [Field] {
    match operation {
        Operation::AddTagsToStream => ADD_TAGS,
        Operation::CreateStream => CREATE_STREAM,
        Operation::DecreaseStreamRetentionPeriod | Operation::IncreaseStreamRetentionPeriod => {
            RETENTION
        }
        Operation::DeleteStream => DELETE_STREAM,
        Operation::DescribeStream => DESCRIBE_STREAM,
        Operation::GetRecords => GET_RECORDS,
        Operation::GetShardIterator => GET_SHARD_ITERATOR,
        Operation::ListStreams => LIST_STREAMS,
        Operation::ListTagsForStream => LIST_TAGS,
        Operation::MergeShards => MERGE_SHARDS,
        Operation::PutRecord => PUT_RECORD,
        Operation::PutRecords => PUT_RECORDS,
        Operation::RemoveTagsFromStream => REMOVE_TAGS,
        Operation::SplitShard => SPLIT_SHARD,
    }
}

/// Check `body` against the field table of `operation` and return the normalized body.
pub fn validate(operation: Operation, body: JsonValue) -> Result<JsonValue, ProtocolError> {
    let object = match body {
        JsonValue::Object(object) => object,
        JsonValue::Null => Map::new(),
        other => return Err(shape_error(&other, "a structure")),
    };

    let fields = fields_for(operation);
    let normalized = check_types(fields, &object)?;

    let mut errors = Vec::new();
    check_constraints(fields, &normalized, "", &mut errors);
    if !errors.is_empty() {
        return Err(ProtocolError::Validation(format!(
            "{} validation error{} detected: {}",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" },
            errors.join("; ")
        )));
    }

    Ok(JsonValue::Object(normalized))
}

fn check_types(
    fields: &[Field],
    object: &Map<String, JsonValue>,
) -> Result<Map<String, JsonValue>, ProtocolError> {
    let mut normalized = Map::new();
    for field in fields {
        let Some(value) = object.get(field.name).filter(|v| !v.is_null()) else {
            continue;
        };
        normalized.insert(field.name.to_string(), check_type(field.kind, value)?);
    }
    Ok(normalized)
}

fn check_type(kind: Kind, value: &JsonValue) -> Result<JsonValue, ProtocolError> {
    match (kind, value) {
        (Kind::Str, JsonValue::String(_)) => Ok(value.clone()),
        (Kind::Str, other) => Err(shape_error(other, "a String")),

        (Kind::Int, JsonValue::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && f.abs() < 9.0e15).map(|f| f.trunc() as i64))
            .map(JsonValue::from)
            .ok_or_else(|| ProtocolError::serialization("NUMBER_VALUE can not be converted to an Integer")),
        (Kind::Int, other) => Err(shape_error(other, "an Integer")),

        (Kind::Blob, JsonValue::String(text)) => {
            decoded_len(text)?;
            Ok(value.clone())
        }
        (Kind::Blob, other) => Err(shape_error(other, "a Blob")),

        (Kind::Timestamp, JsonValue::Number(_)) => Ok(value.clone()),
        (Kind::Timestamp, other) => Err(shape_error(other, "a Timestamp")),

        (Kind::StrList(_), JsonValue::Array(items)) => items
            .iter()
            .map(|item| check_type(Kind::Str, item))
            .collect::<Result<Vec<_>, _>>()
            .map(JsonValue::Array),
        (Kind::StrMap(..), JsonValue::Object(entries)) => entries
            .iter()
            .map(|(key, item)| Ok((key.clone(), check_type(Kind::Str, item)?)))
            .collect::<Result<Map<_, _>, ProtocolError>>()
            .map(JsonValue::Object),
        (Kind::Structs(fields), JsonValue::Array(items)) => items
            .iter()
            .map(|item| match item {
                JsonValue::Object(entry) => check_types(fields, entry).map(JsonValue::Object),
                other => Err(shape_error(other, "a structure")),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(JsonValue::Array),
        (_, other) => Err(shape_error(other, "a collection")),
    }
}

fn shape_error(value: &JsonValue, target: &str) -> ProtocolError {
    let message = match value {
        JsonValue::Object(_) => "Start of structure or map found where not expected".to_string(),
        JsonValue::Array(_) => "Start of list found where not expected".to_string(),
        JsonValue::String(_) => format!("STRING_VALUE can not be converted to {}", target),
        JsonValue::Number(_) => format!("NUMBER_VALUE can not be converted to {}", target),
        JsonValue::Bool(true) => format!("TRUE_VALUE can not be converted to {}", target),
        JsonValue::Bool(false) => format!("FALSE_VALUE can not be converted to {}", target),
        JsonValue::Null => "Unexpected null value".to_string(),
    };
    ProtocolError::serialization(message)
}

/// Decoded length of a base64 blob, rejecting malformed input.
fn decoded_len(text: &str) -> Result<usize, ProtocolError> {
    use base64::{Engine, engine::general_purpose::STANDARD};

    if text.len() % 4 != 0 {
        return Err(ProtocolError::serialization(format!(
            "Base64 encoded length is expected a multiple of 4 bytes but found: {}",
            text.len()
        )));
    }
    STANDARD
        .decode(text)
        .map(|bytes| bytes.len())
        .map_err(|_| ProtocolError::serialization("Invalid Base64 character in Blob value"))
}

fn check_constraints(
    fields: &[Field],
    object: &Map<String, JsonValue>,
    prefix: &str,
    errors: &mut Vec<String>,
) {
    for field in fields {
        let path = format!("{}{}", prefix, lower_first(field.name));
        match object.get(field.name) {
            None => {
                if field.rules.iter().any(|r| matches!(r, Rule::Required)) {
                    errors.push(violation("null", &path, "Member must not be null"));
                }
            }
            Some(value) => check_value(field.kind, field.rules, value, &path, errors),
        }
    }
}

fn check_value(kind: Kind, rules: &[Rule], value: &JsonValue, path: &str, errors: &mut Vec<String>) {
    // One message per member: the first broken rule wins
    if let Some(message) = rules.iter().find_map(|rule| broken_rule(*rule, kind, value)) {
        errors.push(violation(&render(kind, value), path, &message));
    }

    match (kind, value) {
        (Kind::StrList(item_rules), JsonValue::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{}.{}.member", path, i + 1);
                check_value(Kind::Str, item_rules, item, &item_path, errors);
            }
        }
        (Kind::StrMap(key_rules, value_rules), JsonValue::Object(entries)) => {
            for (key, item) in entries {
                let key_value = JsonValue::String(key.clone());
                check_value(Kind::Str, key_rules, &key_value, &format!("{}.{}.key", path, key), errors);
                check_value(Kind::Str, value_rules, item, &format!("{}.{}.value", path, key), errors);
            }
        }
        (Kind::Structs(fields), JsonValue::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                if let JsonValue::Object(entry) = item {
                    check_constraints(fields, entry, &format!("{}.{}.member.", path, i + 1), errors);
                }
            }
        }
        _ => {}
    }
}

fn broken_rule(rule: Rule, kind: Kind, value: &JsonValue) -> Option<String> {
    match rule {
        Rule::Required => None,
        Rule::MinLen(min) => (length(kind, value) < min)
            .then(|| format!("Member must have length greater than or equal to {}", min)),
        Rule::MaxLen(max) => (length(kind, value) > max)
            .then(|| format!("Member must have length less than or equal to {}", max)),
        Rule::Min(min) => value
            .as_i64()
            .filter(|n| *n < min)
            .map(|_| format!("Member must have value greater than or equal to {}", min)),
        Rule::Max(max) => value
            .as_i64()
            .filter(|n| *n > max)
            .map(|_| format!("Member must have value less than or equal to {}", max)),
        Rule::Matches(pattern) => value
            .as_str()
            .filter(|s| !pattern.matches(s))
            .map(|_| {
                format!(
                    "Member must satisfy regular expression pattern: {}",
                    pattern.as_str()
                )
            }),
        Rule::OneOf(allowed) => value
            .as_str()
            .filter(|s| !allowed.contains(s))
            .map(|_| format!("Member must satisfy enum value set: [{}]", allowed.join(", "))),
    }
}

fn length(kind: Kind, value: &JsonValue) -> usize {
    match (kind, value) {
        (Kind::Blob, JsonValue::String(text)) => decoded_len(text).unwrap_or(0),
        (_, JsonValue::String(text)) => text.chars().count(),
        (_, JsonValue::Array(items)) => items.len(),
        (_, JsonValue::Object(entries)) => entries.len(),
        _ => 0,
    }
}

fn render(kind: Kind, value: &JsonValue) -> String {
    match (kind, value) {
        (Kind::Blob, _) => {
            let len = length(kind, value);
            format!("'java.nio.HeapByteBuffer[pos=0 lim={} cap={}]'", len, len)
        }
        (_, JsonValue::String(text)) => format!("'{}'", text),
        (_, JsonValue::Array(items)) => {
            let rendered: Vec<String> = items
                .iter()
                .map(|item| match item {
                    JsonValue::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect();
            format!("'[{}]'", rendered.join(", "))
        }
        (_, JsonValue::Object(entries)) => {
            let rendered: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}={}", k, v.as_str().unwrap_or_default()))
                .collect();
            format!("'{{{}}}'", rendered.join(", "))
        }
        (_, other) => other.to_string(),
    }
}

fn violation(value: &str, path: &str, constraint: &str) -> String {
    format!(
        "Value {} at '{}' failed to satisfy constraint: {}",
        value, path, constraint
    )
}

fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
