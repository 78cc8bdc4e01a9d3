//! Bench-data request parser.

use ciborium::Value;

use crate::protocols::codec;
use crate::protocols::ProtocolError;

/// Map key holding the requested payload length.
pub const DATASIZE_KEY: &str = "datasize";

/// Parsed bench-data request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRequest {
    /// Number of payload bytes to send back.
    pub size: u64,
}

/// Extract a `DataRequest` from a decoded value.
pub fn parse_request(value: &Value) -> Result<DataRequest, ProtocolError> {
    let Value::Map(entries) = value else {
        return Err(ProtocolError::Decode(format!(
            "expected a map, found {}",
            codec::kind(value)
        )));
    };

    let size = entries
        .iter()
        .find(|(key, _)| matches!(key, Value::Text(k) if k == DATASIZE_KEY))
        .map(|(_, size)| size)
        .ok_or(ProtocolError::FieldMissing(DATASIZE_KEY))?;

    let field_type = |found: String| ProtocolError::FieldType {
        field: DATASIZE_KEY,
        expected: "a non-negative integer",
        found,
    };

    match size {
        Value::Integer(n) => {
            let size = u64::try_from(*n).map_err(|_| field_type(i128::from(*n).to_string()))?;
            Ok(DataRequest { size })
        }
        other => Err(field_type(codec::kind(other).to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(entries: Vec<(Value, Value)>) -> Value {
        Value::Map(entries)
    }

    fn datasize(value: Value) -> (Value, Value) {
        (Value::Text(DATASIZE_KEY.into()), value)
    }

    #[test]
    fn test_parse_request() {
        let value = request(vec![datasize(Value::Integer(1024.into()))]);
        assert_eq!(parse_request(&value).unwrap(), DataRequest { size: 1024 });
    }

    #[test]
    fn test_parse_zero_size() {
        let value = request(vec![datasize(Value::Integer(0.into()))]);
        assert_eq!(parse_request(&value).unwrap(), DataRequest { size: 0 });
    }

    #[test]
    fn test_parse_max_size() {
        let value = request(vec![datasize(Value::Integer(u64::MAX.into()))]);
        assert_eq!(parse_request(&value).unwrap().size, u64::MAX);
    }

    #[test]
    fn test_ignores_other_keys() {
        let value = request(vec![
            (Value::Text("chunksize".into()), Value::Text("big".into())),
            (Value::Integer(1.into()), Value::Null),
            datasize(Value::Integer(5.into())),
        ]);
        assert_eq!(parse_request(&value).unwrap(), DataRequest { size: 5 });
    }

    #[test]
    fn test_missing_field() {
        let value = request(vec![(Value::Text("size".into()), Value::Integer(5.into()))]);
        match parse_request(&value) {
            Err(ProtocolError::FieldMissing(field)) => assert_eq!(field, DATASIZE_KEY),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_wrong_field_type() {
        for bad in [
            Value::Text("1024".into()),
            Value::Float(1024.0),
            Value::Bool(true),
            Value::Null,
        ] {
            let value = request(vec![datasize(bad)]);
            match parse_request(&value) {
                Err(ProtocolError::FieldType { field, .. }) => assert_eq!(field, DATASIZE_KEY),
                other => panic!("unexpected: {:?}", other),
            }
        }
    }

    #[test]
    fn test_negative_size() {
        let value = request(vec![datasize(Value::Integer((-1i64).into()))]);
        match parse_request(&value) {
            Err(ProtocolError::FieldType { found, .. }) => assert_eq!(found, "-1"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_not_a_map() {
        for bad in [Value::Text("datasize".into()), Value::Array(Vec::new())] {
            match parse_request(&bad) {
                Err(ProtocolError::Decode(_)) => {}
                other => panic!("unexpected: {:?}", other),
            }
        }
    }
}
