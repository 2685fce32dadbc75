//! Versioned, effective-dated VAT policy and its resolution rules.
//!
//! Resolution is deterministic: given identical inputs (amount, category,
//! vendor registration data, policy version), the output is always the same.
//! This property is what makes settlement audit-reproducible.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::money::round_minor;
use super::transaction::VatResponsibility;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyStatus {
    Draft,
    Active,
    Retired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxRates {
    /// Standard rate in percent, applied when no category override matches.
    pub standard: Decimal,
    pub reduced: Decimal,
    pub zero: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxThresholds {
    /// Cumulative annual turnover above which a vendor must be VAT-registered
    /// and becomes liable for its own remittance.
    pub registration_turnover: Decimal,
    /// Single-transaction amount above which the platform assumes liability.
    pub platform_liability: Decimal,
    /// Computed VAT below this amount is not worth collecting; the
    /// settlement records no VAT legs for it.
    pub minimum_collection: Decimal,
}

/// Per-category override of the standard rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub rate: Decimal,
    #[serde(default)]
    pub exempt: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemittanceCadence {
    Monthly,
    Quarterly,
    Annually,
}

/// Vendor registration data read from the user service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VendorTaxProfile {
    pub vat_registered: bool,
    pub annual_turnover: Decimal,
}

/// A versioned VAT configuration record. At most one policy is in effect for
/// any point in time; see [`select_active`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxPolicy {
    pub version: u32,
    pub status: PolicyStatus,
    pub effective_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<DateTime<Utc>>,
    pub rates: TaxRates,
    pub thresholds: TaxThresholds,
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryRule>,
    pub remittance: RemittanceCadence,
}

impl TaxPolicy {
    /// Built-in Nigerian VAT baseline: 7.5% standard rate.
    pub fn default_ngn(effective_date: DateTime<Utc>) -> Self {
        Self {
            version: 1,
            status: PolicyStatus::Active,
            effective_date,
            expiry_date: None,
            rates: TaxRates {
                standard: dec!(7.5),
                reduced: dec!(5.0),
                zero: Decimal::ZERO,
            },
            thresholds: TaxThresholds {
                registration_turnover: dec!(25_000_000),
                platform_liability: dec!(1_000_000),
                minimum_collection: Decimal::ZERO,
            },
            categories: BTreeMap::new(),
            remittance: RemittanceCadence::Monthly,
        }
    }

    pub fn in_effect_at(&self, at: DateTime<Utc>) -> bool {
        self.status == PolicyStatus::Active
            && self.effective_date <= at
            && self.expiry_date.is_none_or(|expiry| expiry > at)
    }

    /// Rate for a category: an exempt category yields zero regardless of the
    /// standard rate, a non-exempt override yields its own rate, and an
    /// absent category yields the standard rate.
    pub fn rate_for(&self, category: Option<&str>) -> Decimal {
        match category.and_then(|c| self.categories.get(c)) {
            Some(rule) if rule.exempt => Decimal::ZERO,
            Some(rule) => rule.rate,
            None => self.rates.standard,
        }
    }

    /// `amount * rate / 100`, rounded to the currency's minor unit.
    pub fn vat_amount(&self, amount: Decimal, category: Option<&str>) -> Decimal {
        round_minor(amount * self.rate_for(category) / dec!(100))
    }

    /// Which party is liable to remit the VAT on a transaction.
    ///
    /// The order of checks encodes a policy precedence and must be preserved:
    /// an independently registered vendor always remits its own tax; above the
    /// platform-liability threshold the platform remits; a vendor past the
    /// registration-turnover threshold remits even if not yet registered; and
    /// the platform is the default for everything else.
    pub fn resolve_responsibility(
        &self,
        vendor: &VendorTaxProfile,
        transaction_amount: Decimal,
    ) -> VatResponsibility {
        if vendor.vat_registered {
            VatResponsibility::Vendor
        } else if transaction_amount > self.thresholds.platform_liability {
            VatResponsibility::Platform
        } else if vendor.annual_turnover > self.thresholds.registration_turnover {
            VatResponsibility::Vendor
        } else {
            VatResponsibility::Platform
        }
    }
}

/// Picks the policy in effect at `at`: the latest `effective_date <= at`
/// among active, unexpired records (highest version wins a tie).
pub fn select_active(policies: &[TaxPolicy], at: DateTime<Utc>) -> Option<&TaxPolicy> {
    policies
        .iter()
        .filter(|p| p.in_effect_at(at))
        .max_by_key(|p| (p.effective_date, p.version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn policy() -> TaxPolicy {
        let mut p = TaxPolicy::default_ngn(at(2024, 1, 1));
        p.categories.insert(
            "books".to_string(),
            CategoryRule {
                rate: Decimal::ZERO,
                exempt: true,
            },
        );
        p.categories.insert(
            "food-staples".to_string(),
            CategoryRule {
                rate: dec!(5.0),
                exempt: false,
            },
        );
        p
    }

    #[test]
    fn test_rate_for_category_overrides() {
        let p = policy();
        assert_eq!(p.rate_for(None), dec!(7.5));
        assert_eq!(p.rate_for(Some("food-staples")), dec!(5.0));
        assert_eq!(p.rate_for(Some("books")), Decimal::ZERO);
        assert_eq!(p.rate_for(Some("unknown")), dec!(7.5));
    }

    #[test]
    fn test_vat_amount_rounds_to_minor_unit() {
        let p = policy();
        assert_eq!(p.vat_amount(dec!(10_750), None), dec!(806.25));
        assert_eq!(p.vat_amount(dec!(0.07), None), dec!(0.01));
        assert_eq!(p.vat_amount(dec!(10_750), Some("books")), Decimal::ZERO);
    }

    #[test]
    fn test_responsibility_precedence() {
        let p = policy();
        let registered = VendorTaxProfile {
            vat_registered: true,
            annual_turnover: Decimal::ZERO,
        };
        let small = VendorTaxProfile::default();
        let large_turnover = VendorTaxProfile {
            vat_registered: false,
            annual_turnover: dec!(30_000_000),
        };

        // registration beats everything, including the amount threshold
        assert_eq!(
            p.resolve_responsibility(&registered, dec!(2_000_000)),
            VatResponsibility::Vendor
        );
        // above the platform-liability threshold, platform remits even for a
        // vendor with large turnover
        assert_eq!(
            p.resolve_responsibility(&large_turnover, dec!(2_000_000)),
            VatResponsibility::Platform
        );
        assert_eq!(
            p.resolve_responsibility(&large_turnover, dec!(10_000)),
            VatResponsibility::Vendor
        );
        assert_eq!(
            p.resolve_responsibility(&small, dec!(10_000)),
            VatResponsibility::Platform
        );
    }

    #[test]
    fn test_select_active_picks_latest_effective() {
        let mut v1 = TaxPolicy::default_ngn(at(2023, 1, 1));
        v1.version = 1;
        let mut v2 = TaxPolicy::default_ngn(at(2024, 1, 1));
        v2.version = 2;
        v2.rates.standard = dec!(10.0);
        let mut draft = TaxPolicy::default_ngn(at(2024, 6, 1));
        draft.version = 3;
        draft.status = PolicyStatus::Draft;

        let policies = vec![v1, v2, draft];
        let selected = select_active(&policies, at(2024, 7, 1)).unwrap();
        assert_eq!(selected.version, 2);

        // before v2 took effect, v1 governs
        assert_eq!(select_active(&policies, at(2023, 7, 1)).unwrap().version, 1);
        // nothing in effect before the first policy
        assert!(select_active(&policies, at(2022, 1, 1)).is_none());
    }

    #[test]
    fn test_expired_policy_not_selected() {
        let mut p = TaxPolicy::default_ngn(at(2023, 1, 1));
        p.expiry_date = Some(at(2024, 1, 1));
        let policies = vec![p];
        assert!(select_active(&policies, at(2024, 2, 1)).is_none());
        assert!(select_active(&policies, at(2023, 6, 1)).is_some());
    }
}
