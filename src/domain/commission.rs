use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::money::round_minor;
use super::order::OrderLine;

/// How an order's money splits between the vendor, the platform and the
/// delivery agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionBreakdown {
    /// Order-level average markup percentage. Purely informational; callers
    /// must not reconstruct amounts from it.
    pub platform_rate: Decimal,
    pub platform_amount: Decimal,
    pub vendor_amount: Decimal,
    pub dispatch_amount: Decimal,
}

impl CommissionBreakdown {
    pub fn zero() -> Self {
        Self {
            platform_rate: Decimal::ZERO,
            platform_amount: Decimal::ZERO,
            vendor_amount: Decimal::ZERO,
            dispatch_amount: Decimal::ZERO,
        }
    }

    /// Scales the breakdown for a partial refund of `refund_amount` out of
    /// `original_total`. The vendor and dispatch components are rounded per
    /// component; the platform leg takes the rounding residual so the three
    /// components reconcile to `refund_amount` exactly, never going negative.
    pub fn scale_to(&self, refund_amount: Decimal, original_total: Decimal) -> Self {
        if original_total.is_zero() {
            return Self::zero();
        }
        let ratio = refund_amount / original_total;
        let mut vendor = round_minor(self.vendor_amount * ratio);
        let dispatch = round_minor(self.dispatch_amount * ratio);
        let mut platform = refund_amount - vendor - dispatch;
        if platform < Decimal::ZERO {
            vendor += platform;
            platform = Decimal::ZERO;
        }
        Self {
            platform_rate: self.platform_rate,
            platform_amount: platform,
            vendor_amount: vendor,
            dispatch_amount: dispatch,
        }
    }
}

/// Splits each line's listed price into the vendor's share and the platform's
/// markup, aggregates across lines, and folds in the delivery-agent fee when
/// the order is agent-fulfilled.
///
/// Aggregates are rounded once, at the point of aggregation, so per-line
/// rounding error cannot compound. An order with no lines (or all-zero listed
/// prices) yields an all-zero breakdown, not an error.
pub fn compute(lines: &[OrderLine], delivery_fee: Decimal, has_dispatch: bool) -> CommissionBreakdown {
    let mut vendor_total = Decimal::ZERO;
    let mut platform_total = Decimal::ZERO;
    let mut rate_sum = Decimal::ZERO;
    let mut rate_count = 0u32;

    for line in lines {
        let quantity = Decimal::from(line.quantity);
        let vendor_share = line.store_price * quantity;
        let platform_share = line.listed_price * quantity - vendor_share;
        vendor_total += vendor_share;
        platform_total += platform_share;

        // TODO: product to confirm whether this should be amount-weighted;
        // the unweighted per-line average is what reporting has always shown.
        if !line.store_price.is_zero() {
            rate_sum += (line.listed_price - line.store_price) / line.store_price * dec!(100);
            rate_count += 1;
        }
    }

    let dispatch = if has_dispatch && delivery_fee > Decimal::ZERO {
        delivery_fee
    } else {
        Decimal::ZERO
    };
    let platform_rate = if rate_count == 0 {
        Decimal::ZERO
    } else {
        round_minor(rate_sum / Decimal::from(rate_count))
    };

    CommissionBreakdown {
        platform_rate,
        platform_amount: round_minor(platform_total),
        vendor_amount: round_minor(vendor_total),
        dispatch_amount: round_minor(dispatch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(store: Decimal, listed: Decimal, quantity: u32) -> OrderLine {
        OrderLine {
            store_price: store,
            listed_price: listed,
            quantity,
        }
    }

    #[test]
    fn test_single_line_split() {
        let breakdown = compute(&[line(dec!(9_000), dec!(9_675), 1)], dec!(1_075), true);
        assert_eq!(breakdown.vendor_amount, dec!(9_000));
        assert_eq!(breakdown.platform_amount, dec!(675));
        assert_eq!(breakdown.dispatch_amount, dec!(1_075));
        assert_eq!(breakdown.platform_rate, dec!(7.5));
    }

    #[test]
    fn test_aggregates_rounded_once() {
        // each line's platform share is 0.333...; rounded per line the total
        // would be 0.99, rounded at aggregation it is 1.00
        let lines = vec![
            line(dec!(0.3333), dec!(0.6666), 1),
            line(dec!(0.3333), dec!(0.6666), 1),
            line(dec!(0.3334), dec!(0.6668), 1),
        ];
        let breakdown = compute(&lines, Decimal::ZERO, false);
        assert_eq!(breakdown.vendor_amount, dec!(1.00));
        assert_eq!(breakdown.platform_amount, dec!(1.00));
    }

    #[test]
    fn test_quantity_multiplies_shares() {
        let breakdown = compute(&[line(dec!(100), dec!(110), 3)], Decimal::ZERO, false);
        assert_eq!(breakdown.vendor_amount, dec!(300));
        assert_eq!(breakdown.platform_amount, dec!(30));
        assert_eq!(breakdown.platform_rate, dec!(10.0));
    }

    #[test]
    fn test_no_agent_means_no_dispatch_amount() {
        let breakdown = compute(&[line(dec!(100), dec!(110), 1)], dec!(500), false);
        assert_eq!(breakdown.dispatch_amount, Decimal::ZERO);
    }

    #[test]
    fn test_empty_order_is_all_zero() {
        let breakdown = compute(&[], Decimal::ZERO, false);
        assert_eq!(breakdown, CommissionBreakdown::zero());
    }

    #[test]
    fn test_platform_rate_is_unweighted_average() {
        // 10% and 50% markups average to 30% regardless of line size
        let lines = vec![
            line(dec!(1_000), dec!(1_100), 1),
            line(dec!(10), dec!(15), 1),
        ];
        let breakdown = compute(&lines, Decimal::ZERO, false);
        assert_eq!(breakdown.platform_rate, dec!(30.0));
    }

    #[test]
    fn test_scale_to_reconciles_exactly() {
        let original = compute(&[line(dec!(9_000), dec!(9_675), 1)], dec!(1_075), true);
        let scaled = original.scale_to(dec!(5_375), dec!(10_750));
        assert_eq!(
            scaled.vendor_amount + scaled.platform_amount + scaled.dispatch_amount,
            dec!(5_375)
        );
        assert_eq!(scaled.vendor_amount, dec!(4_500));
        assert_eq!(scaled.dispatch_amount, dec!(537.50));
        assert_eq!(scaled.platform_amount, dec!(337.50));
    }

    #[test]
    fn test_scale_to_full_refund_is_identity() {
        let original = compute(&[line(dec!(9_000), dec!(9_675), 1)], dec!(1_075), true);
        let scaled = original.scale_to(dec!(10_750), dec!(10_750));
        assert_eq!(scaled.vendor_amount, original.vendor_amount);
        assert_eq!(scaled.platform_amount, original.platform_amount);
        assert_eq!(scaled.dispatch_amount, original.dispatch_amount);
    }

    #[test]
    fn test_scale_components_never_exceed_original() {
        let original = compute(&[line(dec!(33.33), dec!(49.99), 3)], dec!(200), true);
        let total = original.vendor_amount + original.platform_amount + original.dispatch_amount;
        for cents in [1u32, 37, 100, 5_000] {
            let refund = Decimal::new(cents as i64, 2);
            if refund > total {
                continue;
            }
            let scaled = original.scale_to(refund, total);
            assert!(scaled.vendor_amount <= original.vendor_amount);
            assert!(scaled.dispatch_amount <= original.dispatch_amount);
            assert!(scaled.platform_amount >= Decimal::ZERO);
            assert_eq!(
                scaled.vendor_amount + scaled.platform_amount + scaled.dispatch_amount,
                refund
            );
        }
    }
}
