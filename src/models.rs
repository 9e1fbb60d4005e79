//! Data models for researches, tiers and purchase plans

use std::fmt;

/// An upgrade track made of tiers that must be bought in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Research {
    pub id: String,
    pub name: String,
    pub tiers: Vec<Tier>,
}

/// One purchase step ("discount level") of a research.
#[derive(Debug, Clone, PartialEq)]
pub struct Tier {
    pub index: u32,
    /// `None` when no confirmed price is known yet
    pub cost: Option<f64>,
    /// Permanent increase of the income rate once bought
    pub delta: f64,
    pub owned: bool,
}

impl Research {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tiers: Vec::new(),
        }
    }

    /// Append a tier at the next index.
    pub fn with_tier(mut self, cost: Option<f64>, delta: f64, owned: bool) -> Self {
        let index = self.tiers.len() as u32;
        self.tiers.push(Tier {
            index,
            cost,
            delta,
            owned,
        });
        self
    }

    pub fn owned_count(&self) -> usize {
        self.tiers.iter().filter(|t| t.owned).count()
    }
}

/// Identifies a tier across the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TierRef {
    pub research_id: String,
    pub tier: u32,
}

impl TierRef {
    pub fn new(research_id: impl Into<String>, tier: u32) -> Self {
        Self {
            research_id: research_id.into(),
            tier,
        }
    }
}

impl fmt::Display for TierRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.research_id, self.tier)
    }
}

/// Live game state supplied by the caller. Never mutated by the planner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameState {
    pub rate: f64,
    pub balance: f64,
    /// Simulated seconds since planning started
    pub elapsed: f64,
}

impl GameState {
    pub fn new(rate: f64, balance: f64) -> Self {
        Self {
            rate,
            balance,
            elapsed: 0.0,
        }
    }
}

/// A single simulated purchase in a plan
#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    pub tier: TierRef,
    pub research_name: String,
    pub cost: f64,
    /// False when the cost is a guess from the price resolver
    pub confirmed: bool,
    pub delta: f64,
    /// Seconds waited since the previous purchase
    pub wait: f64,
    /// Simulated time of the purchase
    pub at: f64,
    /// Balance left right after the purchase
    pub balance: f64,
    /// Income rate after the purchase
    pub rate: f64,
}

impl PlanStep {
    /// Seconds of the added income needed to repay the cost.
    pub fn payback(&self) -> Option<f64> {
        (self.delta > 0.0).then(|| self.cost / self.delta)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnreachableReason {
    /// No income and the balance never covers the cost
    NoIncome,
    /// The price resolver could not produce a cost
    PriceUnavailable(String),
    /// An earlier tier of the same research is unreachable
    Blocked { by: u32 },
}

impl fmt::Display for UnreachableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnreachableReason::NoIncome => write!(f, "never affordable without income"),
            UnreachableReason::PriceUnavailable(msg) => write!(f, "no price: {}", msg),
            UnreachableReason::Blocked { by } => write!(f, "blocked by tier {}", by),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnreachableTier {
    pub tier: TierRef,
    pub research_name: String,
    pub reason: UnreachableReason,
}

/// Result of a planning pass
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
    pub unreachable: Vec<UnreachableTier>,
    /// Researches left out because their definition is malformed
    pub rejected: Vec<crate::catalog::CatalogError>,
    /// Simulated state after the last step
    pub final_state: GameState,
}

impl Plan {
    pub fn estimated_steps(&self) -> usize {
        self.steps.iter().filter(|s| !s.confirmed).count()
    }
}

/// Stored research overview for listings
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchInfo {
    pub id: String,
    pub name: String,
    pub tiers: u32,
    pub owned: u32,
    pub known_costs: u32,
}
