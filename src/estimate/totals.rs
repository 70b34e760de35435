use super::types::{DiscountType, LineItem, Totals};

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Recomputes the derived money figures from scratch. Pure; callers replace
/// the stored totals with the result on every relevant mutation, so the
/// stored figures can never drift from the item list.
///
/// A percentage discount larger than 100 (or a fixed discount larger than the
/// subtotal) yields a negative taxable base and negative tax. That mirrors
/// how drafts have historically been priced; clamping is a pending product
/// decision, not done here.
pub fn compute(
    items: &[LineItem],
    discount_type: DiscountType,
    discount_value: f64,
    tax_rate: f64,
) -> Totals {
    let subtotal = round_cents(items.iter().map(|item| item.total).sum());

    let discount_amount = match discount_type {
        DiscountType::Percentage => round_cents(subtotal * discount_value / 100.0),
        DiscountType::Fixed => round_cents(discount_value),
    };

    let taxable_base = subtotal - discount_amount;
    let tax = round_cents(taxable_base * tax_rate / 100.0);
    let total = round_cents(taxable_base + tax);

    Totals {
        subtotal,
        discount_amount,
        tax,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: f64, unit_price: f64) -> LineItem {
        LineItem::new("test item", "", quantity, unit_price, "unit")
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_reference_scenario() {
        let items = vec![item(2.0, 50.0), item(1.0, 100.0)];
        let totals = compute(&items, DiscountType::Percentage, 10.0, 8.0);

        assert_close(totals.subtotal, 200.0);
        assert_close(totals.discount_amount, 20.0);
        assert_close(totals.tax, 14.40);
        assert_close(totals.total, 194.40);
    }

    #[test]
    fn test_empty_items_all_zero() {
        let totals = compute(&[], DiscountType::Percentage, 10.0, 8.0);
        assert_eq!(totals, Totals::default());
    }

    #[test]
    fn test_fixed_discount() {
        let items = vec![item(3.0, 40.0)];
        let totals = compute(&items, DiscountType::Fixed, 25.0, 10.0);

        assert_close(totals.subtotal, 120.0);
        assert_close(totals.discount_amount, 25.0);
        assert_close(totals.tax, 9.50);
        assert_close(totals.total, 104.50);
    }

    #[test]
    fn test_subtotal_is_sum_of_item_totals() {
        let items = vec![item(1.5, 10.0), item(0.25, 80.0), item(12.0, 3.75)];
        let totals = compute(&items, DiscountType::Percentage, 0.0, 0.0);
        let expected: f64 = items.iter().map(|i| i.total).sum();

        assert_close(totals.subtotal, expected);
        assert_close(totals.total, expected);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let items = vec![item(2.0, 33.33), item(7.0, 19.99)];
        let first = compute(&items, DiscountType::Percentage, 12.5, 21.0);
        let second = compute(&items, DiscountType::Percentage, 12.5, 21.0);

        assert_eq!(first, second);
    }

    #[test]
    fn test_oversized_discount_goes_negative() {
        // Not clamped to the subtotal; preserved as observed behavior.
        let items = vec![item(1.0, 100.0)];
        let totals = compute(&items, DiscountType::Fixed, 150.0, 10.0);

        assert_close(totals.discount_amount, 150.0);
        assert_close(totals.tax, -5.0);
        assert_close(totals.total, -55.0);
    }
}
