//! Core types for risk engine

use crate::config::ScoringModel;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ===== Inbound Order =====

/// Order-creation event as delivered by the storefront webhook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    /// Platform order id
    pub id: u64,

    /// Human readable order name (e.g. `#1001`)
    #[serde(default)]
    pub name: Option<String>,

    /// Creation timestamp with the shop's offset
    pub created_at: DateTime<FixedOffset>,

    /// Purchased items
    pub line_items: Vec<LineItem>,

    /// Free-form checkout attributes
    #[serde(default, deserialize_with = "lenient_note_attributes")]
    pub note_attributes: Vec<NoteAttribute>,

    /// Landing page of the session
    #[serde(default)]
    pub landing_site: Option<String>,

    /// Landing page with referral tracking, preferred over `landing_site`
    #[serde(default)]
    pub landing_site_ref: Option<String>,

    /// Shop identifier carried in the payload
    #[serde(default)]
    pub shop_id: Option<u64>,
}

impl OrderEvent {
    /// Landing URL used for attribution, referral variant first
    pub fn landing_url(&self) -> Option<&str> {
        self.landing_site_ref
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.landing_site.as_deref().filter(|s| !s.trim().is_empty()))
    }
}

/// Single purchased item
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineItem {
    /// Product id, absent for custom items
    #[serde(default)]
    pub product_id: Option<u64>,

    /// Variant id, absent for custom items
    #[serde(default)]
    pub variant_id: Option<u64>,

    /// Product title
    #[serde(default)]
    pub title: Option<String>,

    /// Variant title
    #[serde(default)]
    pub variant_title: Option<String>,

    /// Vendor name
    #[serde(default)]
    pub vendor: Option<String>,

    /// Unit price
    #[serde(default)]
    pub price: Option<Decimal>,

    /// Units ordered
    #[serde(default)]
    pub quantity: u32,

    /// Weight in grams
    #[serde(default)]
    pub grams: Option<i64>,
}

/// Name/value pair attached to an order at checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteAttribute {
    /// Attribute name as typed by the storefront
    pub name: String,
    /// Attribute value rendered to text; `None` for null
    pub value: Option<String>,
}

impl NoteAttribute {
    /// Build an attribute from plain strings
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }
}

/// Entries that are not `{name, value}` objects are skipped, and a
/// non-array attribute list reads as empty.
fn lenient_note_attributes<'de, D>(deserializer: D) -> Result<Vec<NoteAttribute>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    let serde_json::Value::Array(items) = raw else {
        return Ok(Vec::new());
    };

    Ok(items
        .iter()
        .filter_map(|item| {
            let name = item.get("name")?.as_str()?.to_string();
            let value = match item.get("value") {
                None | Some(serde_json::Value::Null) => None,
                Some(serde_json::Value::String(s)) => Some(s.clone()),
                Some(other) => Some(other.to_string()),
            };
            Some(NoteAttribute { name, value })
        })
        .collect())
}

// ===== Normalized Signals =====

/// Campaign attribution fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtmAttribution {
    /// `utm_source`
    pub source: Option<String>,
    /// `utm_medium`
    pub medium: Option<String>,
    /// `utm_campaign`
    pub campaign: Option<String>,
    /// `utm_content`
    pub content: Option<String>,
    /// `utm_term`
    pub term: Option<String>,
    /// `utm_id`
    pub id: Option<String>,
}

/// Customer, address and attribution signals extracted from an order.
///
/// Every field is either a trimmed non-empty value or `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedSignals {
    /// Customer full name
    pub customer_name: Option<String>,
    /// Phone number, digits only
    pub phone: Option<String>,
    /// Address line 1
    pub address1: Option<String>,
    /// Address line 2
    pub address2: Option<String>,
    /// City
    pub city: Option<String>,
    /// State or province
    pub state: Option<String>,
    /// Postal code, digits only
    pub zip: Option<String>,
    /// Country as stated by the customer
    pub country: Option<String>,
    /// Campaign attribution
    pub utm: UtmAttribution,
    /// Full attribution URL
    pub full_url: Option<String>,
    /// Client IP, canonical form when it parses
    pub client_ip: Option<String>,
}

// ===== Geo =====

/// IP-derived location and network owner
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoSignal {
    /// Resolved country name
    pub country: Option<String>,
    /// Most specific subdivision name
    pub region: Option<String>,
    /// Network organization, lower-cased
    pub organization: String,
}

// ===== Risk =====

/// Discrete risk classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskBucket {
    /// Nothing notable
    Clean,
    /// Platform or social traffic
    Platform,
    /// Mobile carrier traffic
    Telecom,
    /// Strong fraud indicators
    RealFraud,
    /// No geo signal to classify against
    Unknown,
}

impl RiskBucket {
    /// Stored representation
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskBucket::Clean => "CLEAN",
            RiskBucket::Platform => "PLATFORM",
            RiskBucket::Telecom => "TELECOM",
            RiskBucket::RealFraud => "REAL_FRAUD",
            RiskBucket::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for RiskBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Additive risk score, unbounded above
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiskScore(u32);

impl RiskScore {
    /// Create new risk score
    pub fn new(score: u32) -> Self {
        Self(score)
    }

    /// Get raw score
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for RiskScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One rule that contributed to a score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactor {
    /// Rule name
    pub name: String,
    /// Points contributed
    pub points: u32,
    /// Human readable detail
    pub reason: String,
}

/// Risk assessment result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Bucket
    pub bucket: RiskBucket,

    /// Score
    pub score: RiskScore,

    /// Rules that fired
    pub factors: Vec<RiskFactor>,

    /// Strategy that produced this assessment
    pub model: ScoringModel,
}

// ===== Persisted Rows =====

/// Flattened record for one line item of one order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRow {
    /// Natural key: `{store}_{order}_{product}_{variant}`
    pub row_id: String,
    /// Order calendar date in the shop's offset
    pub date: NaiveDate,
    /// Order creation timestamp
    pub date_time: DateTime<FixedOffset>,
    /// Order id
    pub order_id: u64,
    /// Order name
    pub order_name: Option<String>,

    /// Customer name
    pub customer_name: Option<String>,
    /// Phone digits
    pub phone: Option<String>,
    /// Address line 1
    pub address1: Option<String>,
    /// Address line 2
    pub address2: Option<String>,
    /// City
    pub city: Option<String>,
    /// State
    pub state: Option<String>,
    /// Zip digits
    pub zip: Option<String>,
    /// Stated country
    pub country: Option<String>,

    /// Product id
    pub product_id: Option<u64>,
    /// Variant id
    pub variant_id: Option<u64>,
    /// Product title
    pub product_name: Option<String>,
    /// Variant title
    pub variant_name: Option<String>,
    /// Vendor
    pub vendor: Option<String>,
    /// Unit price
    pub price: Option<Decimal>,
    /// Quantity
    pub quantity: u32,
    /// Weight in grams
    pub weight: Option<i64>,

    /// `utm_source`
    pub utm_source: Option<String>,
    /// `utm_medium`
    pub utm_medium: Option<String>,
    /// `utm_campaign`
    pub utm_campaign: Option<String>,
    /// `utm_content`
    pub utm_content: Option<String>,
    /// `utm_term`
    pub utm_term: Option<String>,
    /// `utm_id`
    pub utm_id: Option<String>,
    /// Raw attribution URL
    pub full_url: Option<String>,
    /// Client IP
    pub ip_address: Option<String>,

    /// Store identifier
    pub store_name: String,
    /// Stated country matched the resolved country
    pub location_match: bool,
    /// Geo lookup succeeded
    pub ip_checked: bool,
    /// Risk bucket
    pub fraud_bucket: RiskBucket,
    /// Risk score
    pub risk_score: RiskScore,

    /// Evaluation instant, used by the burst window
    pub recorded_at: DateTime<Utc>,
}

/// All rows of one order, persisted as one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBatch {
    /// Order id
    pub order_id: u64,
    /// Store identifier
    pub store_id: String,
    /// One row per line item
    pub rows: Vec<PersistedRow>,
}

impl OrderBatch {
    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the order had no line items
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row identifiers in line-item order
    pub fn row_ids(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|r| r.row_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_event_parses_storefront_payload() {
        let payload = serde_json::json!({
            "id": 5012,
            "name": "#1001",
            "created_at": "2024-03-05T23:30:00+05:30",
            "shop_id": 77,
            "landing_site": "/?utm_source=plain",
            "landing_site_ref": "/?utm_source=ref",
            "note_attributes": [
                {"name": "Full Name", "value": "Asha Rao"},
                {"name": "Pincode", "value": 560001},
                {"name": "Empty", "value": null},
                "garbage"
            ],
            "line_items": [
                {"product_id": 1, "variant_id": 2, "title": "Tee", "price": "19.99", "quantity": 2, "grams": 150}
            ]
        });

        let order: OrderEvent = serde_json::from_value(payload).unwrap();
        assert_eq!(order.id, 5012);
        assert_eq!(order.note_attributes.len(), 3);
        assert_eq!(order.note_attributes[1].value.as_deref(), Some("560001"));
        assert_eq!(order.note_attributes[2].value, None);
        assert_eq!(order.landing_url(), Some("/?utm_source=ref"));
        assert_eq!(order.line_items[0].price, Some(Decimal::new(1999, 2)));
    }

    #[test]
    fn test_missing_line_items_is_rejected() {
        let payload = serde_json::json!({
            "id": 1,
            "created_at": "2024-03-05T10:00:00Z"
        });
        assert!(serde_json::from_value::<OrderEvent>(payload).is_err());
    }

    #[test]
    fn test_non_array_note_attributes_read_as_empty() {
        let payload = serde_json::json!({
            "id": 1,
            "created_at": "2024-03-05T10:00:00Z",
            "line_items": [],
            "note_attributes": {"unexpected": true}
        });
        let order: OrderEvent = serde_json::from_value(payload).unwrap();
        assert!(order.note_attributes.is_empty());
    }

    #[test]
    fn test_bucket_serializes_screaming_case() {
        let json = serde_json::to_string(&RiskBucket::RealFraud).unwrap();
        assert_eq!(json, "\"REAL_FRAUD\"");
        assert_eq!(RiskBucket::RealFraud.to_string(), "REAL_FRAUD");
    }
}
