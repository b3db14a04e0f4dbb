use crate::record::MetricsRecord;

/// Whether `current` carries news relative to the last parsed record.
///
/// Reserved fields never count. Values compare exactly, and a field present
/// on only one side is a difference.
pub fn should_push(previous: Option<&MetricsRecord>, current: &MetricsRecord) -> bool {
    match previous {
        None => true,
        Some(previous) => previous.fields() != current.fields(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FieldValue, Fields};
    use chrono::{Duration, Utc};

    fn record(url: &str, offset_secs: i64, fields: &[(&str, FieldValue)]) -> MetricsRecord {
        let fields: Fields = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        MetricsRecord::captured_at(
            "openai_billing",
            url,
            Utc::now() + Duration::seconds(offset_secs),
            fields,
        )
    }

    const URL: &str = "https://platform.openai.com/settings/organization/billing/overview";

    #[test]
    fn first_record_always_pushes() {
        assert!(should_push(None, &record(URL, 0, &[])));
        assert!(should_push(None, &record(URL, 0, &[("balance_usd", 1.0.into())])));
    }

    #[test]
    fn identical_record_is_skipped() {
        let r = record(URL, 0, &[("balance_usd", 42.5.into()), ("tier", "Tier 3".into())]);
        assert!(!should_push(Some(&r), &r));
    }

    #[test]
    fn reserved_field_changes_are_ignored() {
        let a = record(URL, 0, &[("balance_usd", 42.5.into())]);
        let b = record("https://platform.openai.com/settings/organization/billing/history", 120, &[("balance_usd", 42.5.into())]);
        assert!(!should_push(Some(&a), &b));
    }

    #[test]
    fn any_value_change_pushes() {
        let a = record(URL, 0, &[("balance_usd", 42.5.into()), ("auto_recharge", true.into())]);
        let b = record(URL, 0, &[("balance_usd", 42.51.into()), ("auto_recharge", true.into())]);
        let c = record(URL, 0, &[("balance_usd", 42.5.into()), ("auto_recharge", false.into())]);
        assert!(should_push(Some(&a), &b));
        assert!(should_push(Some(&a), &c));
    }

    #[test]
    fn one_sided_fields_count_as_changes() {
        let a = record(URL, 0, &[("balance_usd", 42.5.into())]);
        let b = record(URL, 0, &[("balance_usd", 42.5.into()), ("tier", "Tier 3".into())]);
        assert!(should_push(Some(&a), &b));
        assert!(should_push(Some(&b), &a));
    }

    #[test]
    fn number_and_text_of_same_digits_differ() {
        let a = record(URL, 0, &[("plan", "5".into())]);
        let b = record(URL, 0, &[("plan", 5.0.into())]);
        assert!(should_push(Some(&a), &b));
    }
}
