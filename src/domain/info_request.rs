//! Info request record: a mid-run request for externally supplied values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PlaneError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InfoRequest {
    pub id: i64,
    pub run_id: i64,
    pub status: InfoRequestStatus,
    pub prompt: String,
    pub required_keys: Vec<String>,
    /// Stored responses; ciphertext when a secret key is configured
    pub responses: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl InfoRequest {
    /// Required keys absent from `values`, in declaration order.
    pub fn missing_keys<'a, I>(&'a self, provided: I) -> Vec<&'a str>
    where
        I: IntoIterator<Item = &'a String> + Clone,
    {
        self.required_keys
            .iter()
            .filter(|k| !provided.clone().into_iter().any(|p| p == *k))
            .map(|k| k.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum InfoRequestStatus {
    Pending,
    Resolved,
    Cancelled,
}

impl InfoRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InfoRequestStatus::Pending => "pending",
            InfoRequestStatus::Resolved => "resolved",
            InfoRequestStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for InfoRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for InfoRequestStatus {
    type Err = PlaneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InfoRequestStatus::Pending),
            "resolved" => Ok(InfoRequestStatus::Resolved),
            "cancelled" => Ok(InfoRequestStatus::Cancelled),
            other => Err(PlaneError::Storage(format!("unknown info request status: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_missing_keys() {
        let req = InfoRequest {
            id: 1,
            run_id: 1,
            status: InfoRequestStatus::Pending,
            prompt: "creds".to_string(),
            required_keys: vec!["AWS_ACCESS_KEY_ID".to_string(), "AWS_DEFAULT_REGION".to_string()],
            responses: None,
            created_at: Utc::now(),
            resolved_at: None,
        };

        let mut values = BTreeMap::new();
        values.insert("AWS_DEFAULT_REGION".to_string(), "eu-west-1".to_string());

        assert_eq!(req.missing_keys(values.keys()), vec!["AWS_ACCESS_KEY_ID"]);
    }
}
