use geogate_storage::{BusinessType, Store};

use crate::error::ServiceError;

/// `<PREFIX>-<NNNNNN>`. Sequences past 999999 keep growing in width.
pub fn format_invitation_number(prefix: &str, sequence: u64) -> String {
    format!("{prefix}-{sequence:06}")
}

/// Split a number into prefix and sequence; `None` if it isn't one of ours.
pub fn parse_invitation_number(number: &str) -> Option<(&str, u64)> {
    let (prefix, digits) = number.split_once('-')?;
    if prefix.len() != 3 || !prefix.chars().all(|c| c.is_ascii_uppercase()) {
        return None;
    }
    if digits.len() < 6 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((prefix, digits.parse().ok()?))
}

pub async fn allocate_number(
    store: &dyn Store,
    business_type: BusinessType,
) -> Result<String, ServiceError> {
    let prefix = business_type.number_prefix();
    let sequence = store.next_invitation_sequence(prefix).await?;
    Ok(format_invitation_number(prefix, sequence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geogate_storage::MockStore;

    #[test]
    fn format_and_parse() {
        assert_eq!(format_invitation_number("HTL", 1), "HTL-000001");
        assert_eq!(format_invitation_number("VIL", 1_234_567), "VIL-1234567");
        assert_eq!(parse_invitation_number("RES-000042"), Some(("RES", 42)));
        assert_eq!(parse_invitation_number("res-000042"), None);
        assert_eq!(parse_invitation_number("RES-42"), None);
        assert_eq!(parse_invitation_number("RES000042"), None);
    }

    #[tokio::test]
    async fn allocation_uses_business_prefix() {
        let mut store = MockStore::new();
        store
            .expect_next_invitation_sequence()
            .withf(|prefix| prefix == "BTQ")
            .times(1)
            .returning(|_| Ok(7));
        let number = allocate_number(&store, BusinessType::BoutiqueHotel)
            .await
            .unwrap();
        assert_eq!(number, "BTQ-000007");
    }
}
