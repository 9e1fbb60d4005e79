//! Price resolution for tiers whose cost is not confirmed yet
//!
//! Prices are observed at a global discount percentage. A price seen at one
//! discount converts to any other through the undiscounted base price.

use std::collections::BTreeMap;

use anyhow::Result;
use thiserror::Error;
use tracing::debug;

use crate::models::TierRef;

/// How many known tiers (and tier pairs) feed an estimate
const ESTIMATE_WINDOW: usize = 5;

/// Highest discount percentage a price can be observed at
pub const MAX_DISCOUNT: u32 = 99;

/// A cost together with whether it comes from confirmed user input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceQuote {
    pub cost: f64,
    pub confirmed: bool,
}

impl PriceQuote {
    pub fn confirmed(cost: f64) -> Self {
        Self {
            cost,
            confirmed: true,
        }
    }

    pub fn estimated(cost: f64) -> Self {
        Self {
            cost,
            confirmed: false,
        }
    }
}

/// A confirmed price of a tier, as seen at a given discount
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KnownCost {
    pub tier: u32,
    pub discount: u32,
    pub cost: f64,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolveError {
    #[error("no known sibling prices to estimate {0} from")]
    NoPriceBasis(TierRef),
    #[error("estimated price of {0} is out of range")]
    EstimateOutOfRange(TierRef),
    #[error("price store failed for {tier}: {message}")]
    Store { tier: TierRef, message: String },
}

/// Supplies a cost for any tier. Never blocks: a missing price is answered
/// with a best-effort estimate, and only a tier with nothing to estimate
/// from fails.
pub trait PriceResolver {
    fn price_of(&self, tier: &TierRef) -> Result<PriceQuote, ResolveError>;
}

impl<F> PriceResolver for F
where
    F: Fn(&TierRef) -> Result<PriceQuote, ResolveError>,
{
    fn price_of(&self, tier: &TierRef) -> Result<PriceQuote, ResolveError> {
        self(tier)
    }
}

/// Persistent record of confirmed tier costs.
pub trait KnownCostStore {
    fn get_known_cost(&self, research_id: &str, tier: u32, discount: u32) -> Result<Option<f64>>;

    fn set_known_cost(&mut self, research_id: &str, tier: u32, discount: u32, cost: f64) -> Result<()>;

    /// All confirmed costs of a research, sorted by tier index then discount
    fn known_costs(&self, research_id: &str) -> Result<Vec<KnownCost>>;
}

/// Resolver reading confirmed prices from a store and extrapolating the rest.
pub struct StoreResolver<'s, S: ?Sized> {
    store: &'s S,
    discount: u32,
    fallback_growth: Option<f64>,
}

impl<'s, S: KnownCostStore + ?Sized> StoreResolver<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            discount: 0,
            fallback_growth: None,
        }
    }

    /// Discount percentage the quotes are wanted at.
    pub fn at_discount(mut self, discount: u32) -> Self {
        self.discount = discount;
        self
    }

    /// Growth ratio used when a research has a single known price.
    pub fn with_fallback_growth(mut self, growth: Option<f64>) -> Self {
        self.fallback_growth = growth.filter(|g| g.is_finite() && *g > 0.0);
        self
    }
}

impl<S: KnownCostStore + ?Sized> PriceResolver for StoreResolver<'_, S> {
    fn price_of(&self, tier: &TierRef) -> Result<PriceQuote, ResolveError> {
        let store_err = |err: anyhow::Error| ResolveError::Store {
            tier: tier.clone(),
            message: format!("{:#}", err),
        };

        if let Some(cost) = self
            .store
            .get_known_cost(&tier.research_id, tier.tier, self.discount)
            .map_err(store_err)?
        {
            return Ok(PriceQuote::confirmed(cost));
        }

        let known = self
            .store
            .known_costs(&tier.research_id)
            .map_err(store_err)?;
        let levels = costs_at_discount(&known, self.discount);

        // seen at another discount
        if let Some(&(_, cost)) = levels.iter().find(|(index, _)| *index == tier.tier) {
            debug!(%tier, cost, discount = self.discount, "converted price");
            return Ok(PriceQuote::estimated(cost));
        }

        match estimate_cost(&levels, tier.tier, self.fallback_growth) {
            Ok(cost) => {
                debug!(%tier, cost, known = levels.len(), "estimated price");
                Ok(PriceQuote::estimated(cost))
            }
            Err(EstimateFailure::NoBasis) => Err(ResolveError::NoPriceBasis(tier.clone())),
            Err(EstimateFailure::OutOfRange) => Err(ResolveError::EstimateOutOfRange(tier.clone())),
        }
    }
}

/// Convert a price seen at `from` percent discount to `to` percent.
pub fn convert_discount(price: f64, from: u32, to: u32) -> f64 {
    if from == to {
        return price;
    }
    let base = price / (1.0 - f64::from(from) / 100.0);
    base * (1.0 - f64::from(to) / 100.0)
}

/// One cost per known tier, expressed at `discount`.
///
/// A tier seen at the wanted discount keeps that price. Otherwise its
/// undiscounted price is converted, and failing that the conversions of
/// every discount it was seen at are averaged.
pub fn costs_at_discount(known: &[KnownCost], discount: u32) -> Vec<(u32, f64)> {
    let mut by_tier: BTreeMap<u32, Vec<&KnownCost>> = BTreeMap::new();
    for price in known {
        by_tier.entry(price.tier).or_default().push(price);
    }

    by_tier
        .into_iter()
        .filter_map(|(tier, prices)| {
            let direct = prices
                .iter()
                .find(|p| p.discount == discount)
                .or_else(|| prices.iter().find(|p| p.discount == 0));
            let cost = match direct {
                Some(p) => convert_discount(p.cost, p.discount, discount),
                None => {
                    prices
                        .iter()
                        .map(|p| convert_discount(p.cost, p.discount, discount))
                        .sum::<f64>()
                        / prices.len() as f64
                }
            };
            cost.is_finite().then_some((tier, cost))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimateFailure {
    /// Not enough known prices to derive a growth ratio
    NoBasis,
    /// The projection overflowed
    OutOfRange,
}

/// Geometric extrapolation of a tier cost from sibling tiers.
///
/// The per-tier growth ratio is the mean over the highest adjacent pairs of
/// known tiers, each pair contributing `(cj / ci)^(1 / (j - i))`. Every one
/// of the highest known tiers is projected to `target` with that ratio and
/// the projections are averaged. A single known tier needs `fallback_growth`.
pub fn estimate_cost(
    known: &[(u32, f64)],
    target: u32,
    fallback_growth: Option<f64>,
) -> Result<f64, EstimateFailure> {
    let mut known: Vec<(u32, f64)> = known
        .iter()
        .copied()
        .filter(|(_, cost)| cost.is_finite() && *cost > 0.0)
        .collect();
    if known.is_empty() {
        return Err(EstimateFailure::NoBasis);
    }
    known.sort_by_key(|(index, _)| *index);
    known.dedup_by_key(|(index, _)| *index);

    let ratios: Vec<f64> = known
        .windows(2)
        .rev()
        .map(|pair| {
            let (i, ci) = pair[0];
            let (j, cj) = pair[1];
            (cj / ci).powf(1.0 / f64::from(j - i))
        })
        .filter(|r| r.is_finite() && *r > 0.0)
        .take(ESTIMATE_WINDOW)
        .collect();

    let growth = if ratios.is_empty() {
        fallback_growth.ok_or(EstimateFailure::NoBasis)?
    } else {
        ratios.iter().sum::<f64>() / ratios.len() as f64
    };

    let projections: Vec<f64> = known
        .iter()
        .rev()
        .take(ESTIMATE_WINDOW)
        .map(|&(index, cost)| cost * growth.powf(f64::from(target) - f64::from(index)))
        .collect();
    let estimate = projections.iter().sum::<f64>() / projections.len() as f64;

    if estimate.is_finite() && estimate >= 0.0 {
        Ok(estimate)
    } else {
        Err(EstimateFailure::OutOfRange)
    }
}

#[cfg(test)]
pub use self::memory::MemoryStore;
