//! In-memory catalog of researches and the purchasable frontier

use std::collections::HashSet;

use thiserror::Error;
use tracing::warn;

use crate::models::{Research, Tier, TierRef};

/// Malformed research definitions. Only the offending research is dropped.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CatalogError {
    #[error("research '{0}' has no tiers")]
    EmptyResearch(String),
    #[error("research '{research}' tier {tier} has no predecessor tier {}", .tier - 1)]
    MissingPredecessor { research: String, tier: u32 },
    #[error("research '{research}' defines tier {tier} more than once")]
    DuplicateTier { research: String, tier: u32 },
    #[error("research '{research}' tier {tier} has a negative {field}")]
    NegativeValue {
        research: String,
        tier: u32,
        field: &'static str,
    },
    #[error("research '{research}' tier {tier} has a non-finite {field}")]
    NonFiniteValue {
        research: String,
        tier: u32,
        field: &'static str,
    },
    #[error("research '{research}' tier {tier} is owned but tier {} is not", .tier - 1)]
    OwnershipGap { research: String, tier: u32 },
    #[error("research '{0}' is defined more than once")]
    DuplicateResearch(String),
}

impl CatalogError {
    pub fn research(&self) -> &str {
        match self {
            CatalogError::EmptyResearch(r) | CatalogError::DuplicateResearch(r) => r,
            CatalogError::MissingPredecessor { research, .. }
            | CatalogError::DuplicateTier { research, .. }
            | CatalogError::NegativeValue { research, .. }
            | CatalogError::NonFiniteValue { research, .. }
            | CatalogError::OwnershipGap { research, .. } => research,
        }
    }
}

/// A tier that can be bought right now: the next unowned tier of its research.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    /// Position of the research in catalog order, used for tie-breaking
    pub slot: usize,
    pub research: &'a Research,
    pub tier: &'a Tier,
}

impl Candidate<'_> {
    pub fn tier_ref(&self) -> TierRef {
        TierRef::new(self.research.id.as_str(), self.tier.index)
    }
}

/// Validated view of all researches for one planning invocation.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    researches: Vec<Research>,
    rejected: Vec<CatalogError>,
}

impl Catalog {
    /// Validate every research, keeping the well-formed ones in input order.
    pub fn build(researches: Vec<Research>) -> Self {
        let mut catalog = Catalog::default();
        let mut seen = HashSet::new();

        for mut research in researches {
            if !seen.insert(research.id.clone()) {
                warn!(research = %research.id, "duplicate research rejected");
                catalog
                    .rejected
                    .push(CatalogError::DuplicateResearch(research.id.clone()));
                continue;
            }
            research.tiers.sort_by_key(|t| t.index);
            match validate(&research) {
                Ok(()) => catalog.researches.push(research),
                Err(err) => {
                    warn!(research = %research.id, error = %err, "research rejected");
                    catalog.rejected.push(err);
                }
            }
        }

        catalog
    }

    pub fn researches(&self) -> &[Research] {
        &self.researches
    }

    /// Configuration errors found while building
    pub fn rejected(&self) -> &[CatalogError] {
        &self.rejected
    }

    /// Owned-tier count of every research, in catalog order.
    pub fn progress(&self) -> Vec<usize> {
        self.researches.iter().map(Research::owned_count).collect()
    }

    /// The next unowned tier of every research under the given progress.
    ///
    /// Later tiers stay hidden until their predecessor is owned, so the
    /// frontier never holds more than one tier per research.
    pub fn frontier(&self, progress: &[usize]) -> Vec<Candidate<'_>> {
        self.researches
            .iter()
            .zip(progress)
            .enumerate()
            .filter_map(|(slot, (research, &owned))| {
                research.tiers.get(owned).map(|tier| Candidate {
                    slot,
                    research,
                    tier,
                })
            })
            .collect()
    }

    /// Number of tiers not owned yet across the catalog.
    pub fn unowned_count(&self) -> usize {
        self.researches
            .iter()
            .map(|r| r.tiers.len() - r.owned_count())
            .sum()
    }
}

fn validate(research: &Research) -> Result<(), CatalogError> {
    if research.tiers.is_empty() {
        return Err(CatalogError::EmptyResearch(research.id.clone()));
    }

    let mut previous_owned = true;
    for (position, tier) in research.tiers.iter().enumerate() {
        let position = position as u32;
        if tier.index > position {
            return Err(CatalogError::MissingPredecessor {
                research: research.id.clone(),
                tier: tier.index,
            });
        }
        if tier.index < position {
            return Err(CatalogError::DuplicateTier {
                research: research.id.clone(),
                tier: tier.index,
            });
        }

        check_amount(research, tier.index, "delta", tier.delta)?;
        if let Some(cost) = tier.cost {
            check_amount(research, tier.index, "cost", cost)?;
        }

        if tier.owned && !previous_owned {
            return Err(CatalogError::OwnershipGap {
                research: research.id.clone(),
                tier: tier.index,
            });
        }
        previous_owned = tier.owned;
    }

    Ok(())
}

fn check_amount(
    research: &Research,
    tier: u32,
    field: &'static str,
    value: f64,
) -> Result<(), CatalogError> {
    if !value.is_finite() {
        return Err(CatalogError::NonFiniteValue {
            research: research.id.clone(),
            tier,
            field,
        });
    }
    if value < 0.0 {
        return Err(CatalogError::NegativeValue {
            research: research.id.clone(),
            tier,
            field,
        });
    }
    Ok(())
}
