// libs/appointment-cell/src/services/pricing.rs
use serde::Serialize;

/// Price snapshot stored on an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceQuote {
    pub original_price: f64,
    pub final_price: f64,
    pub applied_discount_percent: f64,
}

/// Applies the service's VIP discount when the client is VIP.
///
/// The discount is clamped into 0..=100, so a 100% discount yields a free
/// appointment rather than an error. Amounts are rounded to cents.
pub fn calculate_price(base_price: f64, vip_discount_percent: f64, is_vip: bool) -> PriceQuote {
    let original_price = round_cents(base_price);
    let discount = vip_discount_percent.clamp(0.0, 100.0);

    if !is_vip || discount <= 0.0 {
        return PriceQuote {
            original_price,
            final_price: original_price,
            applied_discount_percent: 0.0,
        };
    }

    PriceQuote {
        original_price,
        final_price: round_cents(base_price * (1.0 - discount / 100.0)),
        applied_discount_percent: discount,
    }
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_vip_pays_full_price() {
        let quote = calculate_price(8500.0, 20.0, false);
        assert_eq!(quote.final_price, 8500.0);
        assert_eq!(quote.original_price, 8500.0);
        assert_eq!(quote.applied_discount_percent, 0.0);
    }

    #[test]
    fn test_vip_discount_applied() {
        let quote = calculate_price(8500.0, 20.0, true);
        assert_eq!(quote.final_price, 6800.0);
        assert_eq!(quote.applied_discount_percent, 20.0);
    }

    #[test]
    fn test_zero_discount_is_not_applied() {
        let quote = calculate_price(120.0, 0.0, true);
        assert_eq!(quote.final_price, 120.0);
        assert_eq!(quote.applied_discount_percent, 0.0);
    }

    #[test]
    fn test_full_discount_is_free() {
        let quote = calculate_price(99.99, 100.0, true);
        assert_eq!(quote.final_price, 0.0);
        assert_eq!(quote.applied_discount_percent, 100.0);
    }

    #[test]
    fn test_fractional_prices_round_to_cents() {
        let quote = calculate_price(59.90, 10.0, true);
        assert!((quote.final_price - 53.91).abs() < 1e-9);
    }
}
