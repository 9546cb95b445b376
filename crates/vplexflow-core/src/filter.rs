//! Typed list filters
//!
//! A filter is a `(key, operator, value)` triple. Values are typed when
//! parsed so that ordering comparisons only ever apply to numbers.

use crate::error::{Result, VplexError};
use crate::model::ResourceDetails;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterOperator {
    Equal,
    Greater,
    Lesser,
    GreaterEqual,
    LesserEqual,
}

impl FilterOperator {
    /// Prefix the management API expects in front of the value
    pub fn wire_prefix(&self) -> &'static str {
        match self {
            FilterOperator::Equal => "",
            FilterOperator::Greater => "gt~",
            FilterOperator::Lesser => "lt~",
            FilterOperator::GreaterEqual => "gte~",
            FilterOperator::LesserEqual => "lte~",
        }
    }

    pub fn is_ordering(&self) -> bool {
        !matches!(self, FilterOperator::Equal)
    }

    fn holds(&self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            FilterOperator::Equal => ordering == Equal,
            FilterOperator::Greater => ordering == Greater,
            FilterOperator::Lesser => ordering == Less,
            FilterOperator::GreaterEqual => ordering != Less,
            FilterOperator::LesserEqual => ordering != Greater,
        }
    }
}

impl FromStr for FilterOperator {
    type Err = VplexError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "equal" => Ok(FilterOperator::Equal),
            "greater" => Ok(FilterOperator::Greater),
            "lesser" => Ok(FilterOperator::Lesser),
            "greater-equal" => Ok(FilterOperator::GreaterEqual),
            "lesser-equal" => Ok(FilterOperator::LesserEqual),
            other => Err(VplexError::validation(format!(
                "the filter operator '{}' is not supported, only 'equal', 'greater-equal', 'lesser-equal', 'greater' and 'lesser' are supported",
                other
            ))),
        }
    }
}

impl std::fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FilterOperator::Equal => "equal",
            FilterOperator::Greater => "greater",
            FilterOperator::Lesser => "lesser",
            FilterOperator::GreaterEqual => "greater-equal",
            FilterOperator::LesserEqual => "lesser-equal",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FilterValue {
    Bool(bool),
    Integer(u64),
    /// Size in bytes, parsed from `<n>TB|GB|MB|B`
    Size(u64),
    Text(String),
}

impl FilterValue {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "True" => return FilterValue::Bool(true),
            "False" => return FilterValue::Bool(false),
            _ => {}
        }
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = raw.parse() {
                return FilterValue::Integer(n);
            }
        }
        if let Some(bytes) = parse_size(raw) {
            return FilterValue::Size(bytes);
        }
        FilterValue::Text(raw.to_string())
    }

    fn as_number(&self) -> Option<u64> {
        match self {
            FilterValue::Integer(n) | FilterValue::Size(n) => Some(*n),
            _ => None,
        }
    }

    fn wire(&self) -> String {
        match self {
            FilterValue::Bool(true) => "True".to_string(),
            FilterValue::Bool(false) => "False".to_string(),
            FilterValue::Integer(n) | FilterValue::Size(n) => n.to_string(),
            FilterValue::Text(s) => s.clone(),
        }
    }
}

fn parse_size(raw: &str) -> Option<u64> {
    const UNITS: [(&str, u64); 4] = [
        ("TB", 1024 * 1024 * 1024 * 1024),
        ("GB", 1024 * 1024 * 1024),
        ("MB", 1024 * 1024),
        ("B", 1),
    ];
    UNITS.iter().find_map(|(suffix, factor)| {
        let digits = raw.strip_suffix(suffix)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse::<u64>().ok()?.checked_mul(*factor)
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub key: String,
    pub operator: FilterOperator,
    pub value: FilterValue,
}

impl Filter {
    pub fn new(key: impl Into<String>, operator: FilterOperator, value: FilterValue) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(VplexError::validation("filter key can not be empty"));
        }
        if operator.is_ordering() && value.as_number().is_none() {
            return Err(VplexError::validation(format!(
                "operator '{}' on '{}' needs an integer or size value",
                operator, key
            )));
        }
        Ok(Self {
            key,
            operator,
            value,
        })
    }

    /// Parse `key:operator:value`
    ///
    /// The value may itself contain colons (storage volume VPD ids do).
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = raw.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(op), Some(value)) => {
                Self::new(key, op.parse()?, FilterValue::parse(value))
            }
            _ => Err(VplexError::validation(format!(
                "filter '{}' should be in the form key:operator:value",
                raw
            ))),
        }
    }

    fn wire_value(&self) -> String {
        format!("{}{}", self.operator.wire_prefix(), self.value.wire())
    }

    fn matches(&self, details: &ResourceDetails) -> bool {
        let Some(field) = details.field(&self.key) else {
            return false;
        };
        match &self.value {
            FilterValue::Bool(wanted) => match &field {
                serde_json::Value::Bool(b) => b == wanted,
                serde_json::Value::String(s) => s.eq_ignore_ascii_case(&wanted.to_string()),
                _ => false,
            },
            FilterValue::Integer(wanted) | FilterValue::Size(wanted) => {
                let actual = match &field {
                    serde_json::Value::Number(n) => n.as_u64(),
                    serde_json::Value::String(s) => s.parse().ok(),
                    _ => None,
                };
                actual.is_some_and(|a| self.operator.holds(a.cmp(wanted)))
            }
            FilterValue::Text(wanted) => match &field {
                serde_json::Value::String(s) => s == wanted,
                other => other.to_string() == *wanted,
            },
        }
    }
}

/// Filters applied together (logical AND)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSet {
    filters: Vec<Filter>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set and check cross-filter constraints
    pub fn from_filters(filters: Vec<Filter>) -> Result<Self> {
        let set = Self { filters };
        set.validate()?;
        Ok(set)
    }

    /// Parse a list of `key:operator:value` strings
    pub fn parse_all<S: AsRef<str>>(raw: &[S]) -> Result<Self> {
        let filters = raw
            .iter()
            .map(|r| Filter::parse(r.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::from_filters(filters)
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.filters.iter()
    }

    fn validate(&self) -> Result<()> {
        let has = |key: &str| self.filters.iter().any(|f| f.key == key);
        if has("limit") != has("offset") {
            return Err(VplexError::validation(
                "'limit' and 'offset' filter keys must be specified together",
            ));
        }
        Ok(())
    }

    /// Query parameters for the management API
    ///
    /// Repeated keys are joined with commas, preserving first-seen order.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query: Vec<(String, String)> = Vec::new();
        for filter in &self.filters {
            let value = filter.wire_value();
            match query.iter_mut().find(|(k, _)| *k == filter.key) {
                Some((_, existing)) => {
                    existing.push(',');
                    existing.push_str(&value);
                }
                None => query.push((filter.key.clone(), value)),
            }
        }
        query
    }

    fn pagination(&self, key: &str) -> Option<usize> {
        self.filters
            .iter()
            .find(|f| f.key == key)
            .and_then(|f| f.value.as_number())
            .map(|n| n as usize)
    }

    pub fn matches(&self, details: &ResourceDetails) -> bool {
        self.filters
            .iter()
            .filter(|f| f.key != "limit" && f.key != "offset")
            .all(|f| f.matches(details))
    }

    /// Filter and paginate a listing locally
    pub fn apply(&self, items: Vec<ResourceDetails>) -> Vec<ResourceDetails> {
        let offset = self.pagination("offset").unwrap_or(0);
        let limit = self.pagination("limit").unwrap_or(usize::MAX);
        items
            .into_iter()
            .filter(|d| self.matches(d))
            .skip(offset)
            .take(limit)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClaimState, ResourceRef};

    #[test]
    fn test_value_typing() {
        assert_eq!(FilterValue::parse("True"), FilterValue::Bool(true));
        assert_eq!(FilterValue::parse("42"), FilterValue::Integer(42));
        assert_eq!(FilterValue::parse("4GB"), FilterValue::Size(4 * 1024 * 1024 * 1024));
        assert_eq!(FilterValue::parse("512B"), FilterValue::Size(512));
        assert_eq!(FilterValue::parse("1TB"), FilterValue::Size(1 << 40));
        assert_eq!(
            FilterValue::parse("claimed"),
            FilterValue::Text("claimed".to_string())
        );
        assert_eq!(FilterValue::parse("GB"), FilterValue::Text("GB".to_string()));
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let err = Filter::parse("capacity:bigger:4GB").unwrap_err();
        assert!(matches!(err, VplexError::Validation(_)));
    }

    #[test]
    fn test_ordering_on_text_rejected() {
        assert!(Filter::parse("use:greater:claimed").is_err());
        assert!(Filter::parse("thin:lesser:True").is_err());
        assert!(Filter::parse("capacity:greater:4GB").is_ok());
    }

    #[test]
    fn test_value_keeps_colons() {
        let f = Filter::parse("name:equal:VPD83T3:6000abc").unwrap();
        assert_eq!(f.value, FilterValue::Text("VPD83T3:6000abc".to_string()));
    }

    #[test]
    fn test_query_encoding_joins_repeated_keys() {
        let set = FilterSet::parse_all(&[
            "capacity:greater-equal:1GB",
            "capacity:lesser:4GB",
            "use:equal:unclaimed",
        ])
        .unwrap();
        assert_eq!(
            set.to_query(),
            vec![
                (
                    "capacity".to_string(),
                    "gte~1073741824,lt~4294967296".to_string()
                ),
                ("use".to_string(), "unclaimed".to_string()),
            ]
        );
    }

    #[test]
    fn test_limit_requires_offset() {
        assert!(FilterSet::parse_all(&["limit:equal:10"]).is_err());
        assert!(FilterSet::parse_all(&["limit:equal:10", "offset:equal:0"]).is_ok());
    }

    #[test]
    fn test_apply_filters_and_paginates() {
        let volumes: Vec<ResourceDetails> = (1..=5)
            .map(|i| {
                ResourceDetails::new(ResourceRef::storage_volume("cluster-1", format!("sv{}", i)))
                    .with_capacity(i * 1024 * 1024 * 1024)
                    .with_claim_state(if i % 2 == 0 {
                        ClaimState::Claimed
                    } else {
                        ClaimState::Unclaimed
                    })
            })
            .collect();

        let set = FilterSet::parse_all(&["capacity:greater:1GB", "use:equal:unclaimed"]).unwrap();
        let names: Vec<String> = set
            .apply(volumes.clone())
            .into_iter()
            .map(|d| d.reference.name)
            .collect();
        assert_eq!(names, vec!["sv3", "sv5"]);

        let page = FilterSet::parse_all(&["limit:equal:2", "offset:equal:1"]).unwrap();
        let names: Vec<String> = page
            .apply(volumes)
            .into_iter()
            .map(|d| d.reference.name)
            .collect();
        assert_eq!(names, vec!["sv2", "sv3"]);
    }
}
