//! Study record and page types returned by the registry API.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One trial document as returned by the registry.
///
/// The document is kept opaque; only the registry identifier is exposed for
/// logging. Uniqueness is not enforced at ingestion time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Value);

impl Record {
    /// Wraps a raw JSON document.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Returns the registry identifier (NCT number), when present.
    ///
    /// Looks at `protocolSection.identificationModule.nctId` first, then a
    /// flat `NCTId` field.
    #[must_use]
    pub fn nct_id(&self) -> Option<&str> {
        self.0
            .pointer("/protocolSection/identificationModule/nctId")
            .or_else(|| self.0.get("NCTId"))
            .and_then(Value::as_str)
    }

    /// Returns the underlying document.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consumes the record, returning the underlying document.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Serializes the record to its canonical compact JSON text.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; `Value` serialization only fails on
    /// non-string map keys, which cannot occur for parsed documents.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }
}

impl From<Value> for Record {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// Total matching studies, when `countTotal=true` was requested.
    #[serde(default)]
    pub total_count: Option<u64>,

    /// Studies on this page. A missing or `null` array is an empty page.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub studies: Vec<Record>,

    /// Continuation token for the next page; absent on the last page.
    #[serde(default)]
    pub next_page_token: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Record>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Record>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_nct_id_from_protocol_section() {
        let record = Record::new(json!({
            "protocolSection": {"identificationModule": {"nctId": "NCT01234567"}}
        }));
        assert_eq!(record.nct_id(), Some("NCT01234567"));
    }

    #[test]
    fn test_record_nct_id_flat_field() {
        let record = Record::new(json!({"NCTId": "NCT07654321"}));
        assert_eq!(record.nct_id(), Some("NCT07654321"));
    }

    #[test]
    fn test_record_nct_id_missing() {
        assert_eq!(Record::new(json!({"briefTitle": "x"})).nct_id(), None);
    }

    #[test]
    fn test_record_to_json_is_compact_and_reparses_equal() {
        let value = json!({"a": [1, 2, {"b": null}], "c": "d\ne"});
        let record = Record::new(value.clone());
        let text = record.to_json().unwrap();
        assert!(!text.contains('\n'), "canonical form must be single-line");
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, value);
    }

    #[test]
    fn test_page_full_payload() {
        let page: Page = serde_json::from_value(json!({
            "totalCount": 250,
            "studies": [{"NCTId": "NCT1"}, {"NCTId": "NCT2"}],
            "nextPageToken": "abc"
        }))
        .unwrap();
        assert_eq!(page.total_count, Some(250));
        assert_eq!(page.studies.len(), 2);
        assert_eq!(page.next_page_token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_page_missing_and_null_fields() {
        let page: Page = serde_json::from_value(json!({})).unwrap();
        assert!(page.studies.is_empty());
        assert!(page.total_count.is_none());
        assert!(page.next_page_token.is_none());

        let page: Page = serde_json::from_value(json!({"studies": null})).unwrap();
        assert!(page.studies.is_empty());
    }
}
