//! Flattening orders into persisted rows

use crate::types::{
    GeoSignal, LineItem, NormalizedSignals, OrderBatch, OrderEvent, PersistedRow, RiskAssessment,
};
use chrono::{DateTime, Utc};

/// Natural key of a line-item row. Missing ids render as empty segments.
pub fn row_id(
    store_id: &str,
    order_id: u64,
    product_id: Option<u64>,
    variant_id: Option<u64>,
) -> String {
    let id = |v: Option<u64>| v.map(|v| v.to_string()).unwrap_or_default();
    format!("{}_{}_{}_{}", store_id, order_id, id(product_id), id(variant_id))
}

/// Stated country equals the resolved one, ignoring case. False without geo.
pub fn location_matches(signals: &NormalizedSignals, geo: Option<&GeoSignal>) -> bool {
    let Some(geo) = geo else {
        return false;
    };
    let stated = signals.country.as_deref().unwrap_or("").trim().to_lowercase();
    let resolved = geo.country.as_deref().unwrap_or("").trim().to_lowercase();
    stated == resolved
}

/// Build one row per line item, all stamped with the same assessment
pub fn build_batch(
    order: &OrderEvent,
    store_id: &str,
    signals: &NormalizedSignals,
    geo: Option<&GeoSignal>,
    assessment: &RiskAssessment,
    recorded_at: DateTime<Utc>,
) -> OrderBatch {
    let location_match = location_matches(signals, geo);
    let ip_checked = geo.is_some();
    let rows = order
        .line_items
        .iter()
        .map(|item| {
            build_row(
                order,
                item,
                store_id,
                signals,
                assessment,
                location_match,
                ip_checked,
                recorded_at,
            )
        })
        .collect();

    OrderBatch {
        order_id: order.id,
        store_id: store_id.to_string(),
        rows,
    }
}

#[allow(clippy::too_many_arguments)]
fn build_row(
    order: &OrderEvent,
    item: &LineItem,
    store_id: &str,
    signals: &NormalizedSignals,
    assessment: &RiskAssessment,
    location_match: bool,
    ip_checked: bool,
    recorded_at: DateTime<Utc>,
) -> PersistedRow {
    PersistedRow {
        row_id: row_id(store_id, order.id, item.product_id, item.variant_id),
        date: order.created_at.date_naive(),
        date_time: order.created_at,
        order_id: order.id,
        order_name: order.name.clone(),

        customer_name: signals.customer_name.clone(),
        phone: signals.phone.clone(),
        address1: signals.address1.clone(),
        address2: signals.address2.clone(),
        city: signals.city.clone(),
        state: signals.state.clone(),
        zip: signals.zip.clone(),
        country: signals.country.clone(),

        product_id: item.product_id,
        variant_id: item.variant_id,
        product_name: item.title.clone(),
        variant_name: item.variant_title.clone(),
        vendor: item.vendor.clone(),
        price: item.price,
        quantity: item.quantity,
        weight: item.grams,

        utm_source: signals.utm.source.clone(),
        utm_medium: signals.utm.medium.clone(),
        utm_campaign: signals.utm.campaign.clone(),
        utm_content: signals.utm.content.clone(),
        utm_term: signals.utm.term.clone(),
        utm_id: signals.utm.id.clone(),
        full_url: signals.full_url.clone(),
        ip_address: signals.client_ip.clone(),

        store_name: store_id.to_string(),
        location_match,
        ip_checked,
        fraud_bucket: assessment.bucket,
        risk_score: assessment.score,

        recorded_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringModel;
    use crate::types::{RiskBucket, RiskScore};
    use chrono::{DateTime, NaiveDate};

    fn order() -> OrderEvent {
        OrderEvent {
            id: 900,
            name: Some("#1900".to_string()),
            created_at: DateTime::parse_from_rfc3339("2024-03-05T23:30:00+05:30").unwrap(),
            line_items: vec![
                LineItem {
                    product_id: Some(11),
                    variant_id: Some(1),
                    title: Some("Kurta".to_string()),
                    quantity: 1,
                    ..Default::default()
                },
                LineItem {
                    product_id: Some(11),
                    variant_id: Some(2),
                    title: Some("Kurta".to_string()),
                    quantity: 3,
                    ..Default::default()
                },
            ],
            note_attributes: vec![],
            landing_site: None,
            landing_site_ref: None,
            shop_id: None,
        }
    }

    fn assessment() -> RiskAssessment {
        RiskAssessment {
            bucket: RiskBucket::Platform,
            score: RiskScore::new(35),
            factors: vec![],
            model: ScoringModel::Additive,
        }
    }

    #[test]
    fn test_row_id_format() {
        assert_eq!(row_id("shop", 1, Some(2), Some(3)), "shop_1_2_3");
        assert_eq!(row_id("shop", 1, None, None), "shop_1__");
        assert_ne!(row_id("shop", 1, Some(2), Some(3)), row_id("shop", 1, Some(2), Some(4)));
    }

    #[test]
    fn test_every_item_gets_same_assessment() {
        let signals = NormalizedSignals {
            country: Some("India".to_string()),
            ..Default::default()
        };
        let geo = GeoSignal {
            country: Some("india".to_string()),
            ..Default::default()
        };
        let batch = build_batch(&order(), "acme", &signals, Some(&geo), &assessment(), Utc::now());

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.row_ids().collect::<Vec<_>>(), vec!["acme_900_11_1", "acme_900_11_2"]);
        for row in &batch.rows {
            assert_eq!(row.fraud_bucket, RiskBucket::Platform);
            assert_eq!(row.risk_score.value(), 35);
            assert!(row.location_match);
            assert!(row.ip_checked);
            assert_eq!(row.store_name, "acme");
        }
        assert_eq!(batch.rows[1].quantity, 3);
    }

    #[test]
    fn test_date_uses_order_offset() {
        let batch = build_batch(
            &order(),
            "acme",
            &NormalizedSignals::default(),
            None,
            &assessment(),
            Utc::now(),
        );
        assert_eq!(batch.rows[0].date, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
    }

    #[test]
    fn test_location_match_requires_geo() {
        let signals = NormalizedSignals::default();
        assert!(!location_matches(&signals, None));
        // Both sides missing still compares equal once geo resolved.
        assert!(location_matches(&signals, Some(&GeoSignal::default())));
        let stated = NormalizedSignals {
            country: Some("India".to_string()),
            ..Default::default()
        };
        assert!(!location_matches(&stated, Some(&GeoSignal::default())));
    }
}
