//! Subscription Pricing Engine
//!
//! Tiered term discount plus a flat design add-on. Arithmetic is exact
//! (`Decimal`); rounding happens only in [`PriceQuote::rounded`].

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::model::{PlanType, Term};

/// Flat fee for the professional design service
pub const DESIGN_FEE: Decimal = dec!(25.00);

/// Price breakdown for a plan/term/add-on selection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub design_fee: Decimal,
    pub total: Decimal,
}

/// Round to cents and fix the scale at two places
fn cents(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp(2);
    rounded.rescale(2);
    rounded
}

impl PriceQuote {
    /// Copy rounded to cents, for display and persistence
    pub fn rounded(&self) -> Self {
        Self {
            subtotal: cents(self.subtotal),
            discount: cents(self.discount),
            design_fee: cents(self.design_fee),
            total: cents(self.total),
        }
    }
}

/// Compute the price of `term` months of an ad space costing `base_price` per month
pub fn compute_price(base_price: Decimal, term: Term, include_design: bool) -> Result<PriceQuote> {
    if base_price <= Decimal::ZERO {
        return Err(CoreError::Validation(format!(
            "base price must be positive, got {base_price}"
        )));
    }

    let subtotal = base_price * Decimal::from(term.months());
    let discount = subtotal * term.discount_rate();
    let design_fee = if include_design { DESIGN_FEE } else { Decimal::ZERO };

    Ok(PriceQuote {
        subtotal,
        discount,
        design_fee,
        total: subtotal - discount + design_fee,
    })
}

/// Quote using the catalogue price of `plan_type`
pub fn quote_for(plan_type: PlanType, term: Term, include_design: bool) -> Result<PriceQuote> {
    compute_price(plan_type.base_price(), term, include_design)
}
