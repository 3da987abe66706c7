//! Order signal normalization
//!
//! Turns free-form note attributes and the landing URL into a
//! [`NormalizedSignals`] record. Nothing here fails: bad input yields
//! absent fields.

use crate::types::{NormalizedSignals, NoteAttribute, OrderEvent, UtmAttribution};
use std::collections::HashMap;
use std::net::IpAddr;
use url::Url;

/// Base used to resolve relative landing paths such as `/products/x?utm_source=y`
const LANDING_BASE: &str = "http://landing.invalid/";

const CUSTOMER_NAME_KEYS: &[&str] = &["full_name", "customer_name", "name"];
const PHONE_KEYS: &[&str] = &["phone", "phone_number"];
const ADDRESS1_KEYS: &[&str] = &["house_no._&_colony/apartment", "address1", "address_1"];
const ADDRESS2_KEYS: &[&str] = &["nearby_school,_hospital,_shop", "address2", "address_2"];
const STATE_KEYS: &[&str] = &["state", "province"];
const ZIP_KEYS: &[&str] = &["zip_code", "zip", "pincode"];
const IP_KEYS: &[&str] = &["ip_address", "ip"];

/// Case-insensitive view over note attributes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteMap {
    entries: HashMap<String, String>,
}

impl NoteMap {
    /// Build from raw attributes. Keys are lower-cased with whitespace turned
    /// into underscores; pairs with a blank value are dropped. A later pair
    /// overwrites an earlier one with the same normalized key.
    pub fn from_attributes(attributes: &[NoteAttribute]) -> Self {
        let mut entries = HashMap::new();
        for attr in attributes {
            let key = normalize_key(&attr.name);
            if key.is_empty() {
                continue;
            }
            if let Some(value) = attr.value.as_deref().and_then(clean) {
                entries.insert(key, value);
            }
        }
        Self { entries }
    }

    /// Value for an already-normalized key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// First present value among aliases
    pub fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.get(k))
    }

    /// Number of retained pairs
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no pair survived normalization
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lower-case and replace each whitespace character with an underscore
pub fn normalize_key(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect::<String>()
        .to_lowercase()
}

/// Trimmed value, or `None` when blank
pub fn clean(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Keep only ASCII digits, `None` when nothing remains
pub fn digits_only(value: &str) -> Option<String> {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    (!digits.is_empty()).then_some(digits)
}

/// `utm_*` query parameters of a landing URL, first occurrence winning.
/// Unparseable URLs yield an empty map.
pub fn extract_utm_params(landing: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    let parsed = Url::parse(LANDING_BASE)
        .ok()
        .and_then(|base| base.join(landing.trim()).ok());
    let Some(url) = parsed else {
        return params;
    };

    for (key, value) in url.query_pairs() {
        if !key.starts_with("utm_") {
            continue;
        }
        let Some(value) = clean(&value) else {
            continue;
        };
        params.entry(key.into_owned()).or_insert(value);
    }
    params
}

fn canonical_ip(raw: &str) -> String {
    raw.parse::<IpAddr>()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|_| raw.to_string())
}

/// Extract typed signals from an order
pub fn normalize(order: &OrderEvent) -> NormalizedSignals {
    let notes = NoteMap::from_attributes(&order.note_attributes);
    let landing = order.landing_url();
    let url_utms = landing.map(extract_utm_params).unwrap_or_default();

    // Explicit note attributes win over the landing URL.
    let utm = |field: &str| -> Option<String> {
        notes
            .get(field)
            .map(str::to_string)
            .or_else(|| url_utms.get(field).cloned())
    };

    let owned = |keys: &[&str]| notes.first_of(keys).map(str::to_string);

    NormalizedSignals {
        customer_name: owned(CUSTOMER_NAME_KEYS),
        phone: notes.first_of(PHONE_KEYS).and_then(digits_only),
        address1: owned(ADDRESS1_KEYS),
        address2: owned(ADDRESS2_KEYS),
        city: notes.get("city").map(str::to_string),
        state: owned(STATE_KEYS),
        zip: notes.first_of(ZIP_KEYS).and_then(digits_only),
        country: notes.get("country").map(str::to_string),
        utm: UtmAttribution {
            source: utm("utm_source"),
            medium: utm("utm_medium"),
            campaign: utm("utm_campaign"),
            content: utm("utm_content"),
            term: utm("utm_term"),
            id: utm("utm_id"),
        },
        full_url: notes
            .get("full_url")
            .map(str::to_string)
            .or_else(|| landing.and_then(clean)),
        client_ip: notes.first_of(IP_KEYS).map(canonical_ip),
    }
}
