// Copyright 2024 RisingWave Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Codec Builder (C2, spec.md §4.2).
//!
//! Builds an Avro-compatible schema from a [`SchemaSet`] once, and an
//! [`Encoder`] that turns rows into single-object Avro payloads (not an Avro
//! container file — there is no downstream consumer expecting file framing,
//! only message bytes for the pub/sub ledger).

use apache_avro::types::Value as AvroValue;
use apache_avro::Schema as AvroSchema;
use serde_json::json;

use crate::error::EncodeError;
use crate::row::ColumnValue;
use crate::schema::{FieldDesc, SchemaSet, SemanticType};

/// The fixed mapping from database semantic types to Avro-equivalent logical
/// types (spec.md §4.2 table). No coercion is attempted.
fn avro_field_type(semantic_type: SemanticType, nullable: bool) -> serde_json::Value {
    let inner = match semantic_type {
        SemanticType::Int64 => json!("long"),
        SemanticType::Float64 => json!("double"),
        SemanticType::Bool => json!("boolean"),
        SemanticType::String => json!("string"),
        SemanticType::Bytes => json!("bytes"),
        SemanticType::Timestamp => json!({"type": "long", "logicalType": "timestamp-micros"}),
        SemanticType::Date => json!({"type": "int", "logicalType": "date"}),
    };
    if nullable {
        json!(["null", inner])
    } else {
        inner
    }
}

fn build_avro_schema_json(schema_set: &SchemaSet) -> serde_json::Value {
    let fields: Vec<_> = schema_set
        .fields
        .iter()
        .map(|f| {
            json!({
                "name": f.name,
                "type": avro_field_type(f.semantic_type, f.nullable),
            })
        })
        .collect();

    json!({
        "type": "record",
        "name": schema_set.table_name,
        "namespace": schema_set.namespace,
        "fields": fields,
    })
}

/// An immutable, shared schema derived from a [`SchemaSet`] (spec.md §3,
/// "Schema set" — "a serialised form of the destination schema").
#[derive(Clone)]
pub struct DestinationSchema {
    pub json: String,
    avro_schema: AvroSchema,
    fields: Vec<FieldDesc>,
}

impl DestinationSchema {
    pub fn build(schema_set: &SchemaSet) -> anyhow::Result<Self> {
        let json_value = build_avro_schema_json(schema_set);
        let json = json_value.to_string();
        let avro_schema = AvroSchema::parse_str(&json)?;
        Ok(Self {
            json,
            avro_schema,
            fields: schema_set.fields.clone(),
        })
    }

    pub fn encoder(&self) -> Encoder {
        Encoder {
            schema: self.avro_schema.clone(),
            fields: self.fields.clone(),
        }
    }
}

/// Row to bytes. Referentially transparent: `encode(row) == encode(row)`
/// byte-for-byte (spec.md §4.2, §8 invariant 3).
#[derive(Clone)]
pub struct Encoder {
    schema: AvroSchema,
    fields: Vec<FieldDesc>,
}

impl Encoder {
    pub fn encode(&self, columns: &[(String, ColumnValue)]) -> Result<Vec<u8>, EncodeError> {
        let mut record_fields = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let value = columns
                .iter()
                .find(|(name, _)| name == &field.name)
                .map(|(_, v)| v)
                .unwrap_or(&ColumnValue::Null);
            let avro_value = to_avro_value(field, value)?;
            record_fields.push((field.name.clone(), avro_value));
        }
        let record = AvroValue::Record(record_fields);
        apache_avro::to_avro_datum(&self.schema, record).map_err(|e| EncodeError::Avro(e.to_string()))
    }
}

fn to_avro_value(field: &FieldDesc, value: &ColumnValue) -> Result<AvroValue, EncodeError> {
    if matches!(value, ColumnValue::Null) {
        return if field.nullable {
            Ok(wrap_nullable(field, AvroValue::Null))
        } else {
            Err(EncodeError::TypeMismatch {
                column: field.name.clone(),
                expected: semantic_type_name(field.semantic_type),
                actual: "null",
            })
        };
    }

    let inner = match (field.semantic_type, value) {
        (SemanticType::Int64, ColumnValue::Int64(v)) => AvroValue::Long(*v),
        (SemanticType::Float64, ColumnValue::Float64(v)) => AvroValue::Double(*v),
        (SemanticType::Bool, ColumnValue::Bool(v)) => AvroValue::Boolean(*v),
        (SemanticType::String, ColumnValue::String(v)) => AvroValue::String(v.clone()),
        (SemanticType::Bytes, ColumnValue::Bytes(v)) => AvroValue::Bytes(v.clone()),
        (SemanticType::Timestamp, ColumnValue::Timestamp(v)) => {
            AvroValue::TimestampMicros(v.as_micros_since_epoch())
        }
        (SemanticType::Date, ColumnValue::Date(v)) => {
            let epoch = chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
            AvroValue::Date((*v - epoch).num_days() as i32)
        }
        _ => {
            return Err(EncodeError::TypeMismatch {
                column: field.name.clone(),
                expected: semantic_type_name(field.semantic_type),
                actual: value.type_name(),
            })
        }
    };

    Ok(wrap_nullable(field, inner))
}

fn wrap_nullable(field: &FieldDesc, value: AvroValue) -> AvroValue {
    if field.nullable {
        // Union index 0 is the `null` branch, 1 is the typed branch, matching
        // the `["null", inner]` schema order in `avro_field_type`.
        let index: u32 = if matches!(value, AvroValue::Null) { 0 } else { 1 };
        AvroValue::Union(index, Box::new(value))
    } else {
        value
    }
}

fn semantic_type_name(semantic_type: SemanticType) -> &'static str {
    match semantic_type {
        SemanticType::Int64 => "int64",
        SemanticType::Float64 => "float64",
        SemanticType::Bool => "bool",
        SemanticType::String => "string",
        SemanticType::Bytes => "bytes",
        SemanticType::Timestamp => "timestamp",
        SemanticType::Date => "date",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::CommitTimestamp;
    use crate::schema::FieldDesc;

    fn sample_schema_set() -> SchemaSet {
        SchemaSet {
            namespace: "tailer".to_string(),
            table_name: "events".to_string(),
            ts_column: "CommitTs".to_string(),
            ts_column_index: 1,
            primary_key: vec!["Id".to_string()],
            fields: vec![
                FieldDesc {
                    name: "Id".to_string(),
                    semantic_type: SemanticType::Int64,
                    nullable: false,
                },
                FieldDesc {
                    name: "CommitTs".to_string(),
                    semantic_type: SemanticType::Timestamp,
                    nullable: false,
                },
                FieldDesc {
                    name: "Name".to_string(),
                    semantic_type: SemanticType::String,
                    nullable: true,
                },
            ],
        }
    }

    #[test]
    fn encode_is_referentially_transparent() {
        let schema = DestinationSchema::build(&sample_schema_set()).unwrap();
        let encoder = schema.encoder();
        let columns = vec![
            ("Id".to_string(), ColumnValue::Int64(1)),
            (
                "CommitTs".to_string(),
                ColumnValue::Timestamp(CommitTimestamp::parse_rfc3339("2024-01-01T00:00:00Z").unwrap()),
            ),
            ("Name".to_string(), ColumnValue::String("alice".to_string())),
        ];
        let a = encoder.encode(&columns).unwrap();
        let b = encoder.encode(&columns).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn encode_rejects_type_mismatch() {
        let schema = DestinationSchema::build(&sample_schema_set()).unwrap();
        let encoder = schema.encoder();
        let columns = vec![
            ("Id".to_string(), ColumnValue::String("not-an-int".to_string())),
            (
                "CommitTs".to_string(),
                ColumnValue::Timestamp(CommitTimestamp::parse_rfc3339("2024-01-01T00:00:00Z").unwrap()),
            ),
            ("Name".to_string(), ColumnValue::Null),
        ];
        let err = encoder.encode(&columns).unwrap_err();
        assert!(matches!(err, EncodeError::TypeMismatch { .. }));
    }

    #[test]
    fn encode_accepts_null_for_nullable_column() {
        let schema = DestinationSchema::build(&sample_schema_set()).unwrap();
        let encoder = schema.encoder();
        let columns = vec![
            ("Id".to_string(), ColumnValue::Int64(2)),
            (
                "CommitTs".to_string(),
                ColumnValue::Timestamp(CommitTimestamp::parse_rfc3339("2024-01-01T00:00:00Z").unwrap()),
            ),
            ("Name".to_string(), ColumnValue::Null),
        ];
        assert!(encoder.encode(&columns).is_ok());
    }
}
