//! Purchase-order planner and plan reporting

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use crate::catalog::{Candidate, Catalog};
use crate::models::{GameState, Plan, PlanStep, TierRef, UnreachableReason, UnreachableTier};
use crate::pricing::{PriceQuote, PriceResolver};
use crate::units::{format_amount, format_duration};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlanError {
    #[error("income rate must be a non-negative number, got {0}")]
    InvalidRate(f64),
    #[error("balance must be a finite number, got {0}")]
    InvalidBalance(f64),
    #[error("elapsed time must be a non-negative number, got {0}")]
    InvalidElapsed(f64),
}

/// Scheduling key of a frontier tier in one round
struct Choice<'a> {
    candidate: Candidate<'a>,
    quote: PriceQuote,
    wait: f64,
}

impl Choice<'_> {
    /// Shortest wait first, then cheapest, then catalog order.
    fn cmp_priority(&self, other: &Self) -> Ordering {
        self.wait
            .total_cmp(&other.wait)
            .then(self.quote.cost.total_cmp(&other.quote.cost))
            .then(self.candidate.slot.cmp(&other.candidate.slot))
    }
}

/// Simulation state private to one planning pass
struct Simulation {
    state: GameState,
    progress: Vec<usize>,
    closed: Vec<bool>,
    quotes: HashMap<TierRef, PriceQuote>,
    plan: Plan,
}

/// Order every unowned tier of the catalog for the fastest completion.
///
/// Greedy simulation: each round takes the frontier tier that becomes
/// affordable first at the current simulated rate and balance, buys it, and
/// ranks the new frontier again under the raised rate. Tiers that can never
/// be afforded, or whose price cannot be resolved, are reported as
/// unreachable along with every later tier of their research.
pub fn plan<R>(catalog: &Catalog, state: GameState, resolver: &R) -> Result<Plan, PlanError>
where
    R: PriceResolver + ?Sized,
{
    validate_state(&state)?;

    let mut sim = Simulation {
        state,
        progress: catalog.progress(),
        closed: vec![false; catalog.researches().len()],
        quotes: HashMap::new(),
        plan: Plan {
            steps: Vec::with_capacity(catalog.unowned_count()),
            unreachable: Vec::new(),
            rejected: catalog.rejected().to_vec(),
            final_state: state,
        },
    };

    loop {
        let frontier: Vec<Candidate<'_>> = catalog
            .frontier(&sim.progress)
            .into_iter()
            .filter(|c| !sim.closed[c.slot])
            .collect();
        if frontier.is_empty() {
            break;
        }

        let mut best: Option<Choice<'_>> = None;
        let mut stalled = Vec::new();
        for candidate in frontier {
            let quote = match sim.quote(candidate, resolver) {
                Ok(quote) => quote,
                Err(message) => {
                    sim.close(candidate, UnreachableReason::PriceUnavailable(message));
                    continue;
                }
            };

            let Some(wait) = wait_for(quote.cost, &sim.state) else {
                stalled.push(candidate);
                continue;
            };

            let choice = Choice {
                candidate,
                quote,
                wait,
            };
            best = match best {
                Some(current) if current.cmp_priority(&choice) != Ordering::Greater => {
                    Some(current)
                }
                _ => Some(choice),
            };
        }

        match best {
            Some(choice) => sim.buy(choice),
            None => {
                // nothing affordable and no income to wait on
                for candidate in stalled {
                    sim.close(candidate, UnreachableReason::NoIncome);
                }
            }
        }
    }

    sim.plan.final_state = sim.state;
    Ok(sim.plan)
}

fn validate_state(state: &GameState) -> Result<(), PlanError> {
    if !state.rate.is_finite() || state.rate < 0.0 {
        return Err(PlanError::InvalidRate(state.rate));
    }
    if !state.balance.is_finite() {
        return Err(PlanError::InvalidBalance(state.balance));
    }
    if !state.elapsed.is_finite() || state.elapsed < 0.0 {
        return Err(PlanError::InvalidElapsed(state.elapsed));
    }
    Ok(())
}

/// Seconds until `cost` is affordable, or `None` when it never is at this rate.
fn wait_for(cost: f64, state: &GameState) -> Option<f64> {
    if state.balance >= cost {
        return Some(0.0);
    }
    if state.rate <= 0.0 {
        return None;
    }
    let wait = (cost - state.balance) / state.rate;
    wait.is_finite().then_some(wait)
}

impl Simulation {
    fn quote<R>(&mut self, candidate: Candidate<'_>, resolver: &R) -> Result<PriceQuote, String>
    where
        R: PriceResolver + ?Sized,
    {
        if let Some(cost) = candidate.tier.cost {
            return Ok(PriceQuote::confirmed(cost));
        }

        let tier = candidate.tier_ref();
        if let Some(quote) = self.quotes.get(&tier) {
            return Ok(*quote);
        }

        match resolver.price_of(&tier) {
            Ok(quote) if quote.cost.is_finite() && quote.cost >= 0.0 => {
                self.quotes.insert(tier, quote);
                Ok(quote)
            }
            Ok(quote) => Err(format!("resolver returned invalid cost {}", quote.cost)),
            Err(err) => Err(err.to_string()),
        }
    }

    fn buy(&mut self, choice: Choice<'_>) {
        let Choice {
            candidate,
            quote,
            wait,
        } = choice;

        let funds = self.state.balance + self.state.rate * wait;
        self.state.elapsed += wait;
        // clamp float noise; the wait was chosen so funds cover the cost
        self.state.balance = (funds - quote.cost).max(0.0);
        self.state.rate += candidate.tier.delta;
        self.progress[candidate.slot] += 1;

        let step = PlanStep {
            tier: candidate.tier_ref(),
            research_name: candidate.research.name.clone(),
            cost: quote.cost,
            confirmed: quote.confirmed,
            delta: candidate.tier.delta,
            wait,
            at: self.state.elapsed,
            balance: self.state.balance,
            rate: self.state.rate,
        };
        debug!(
            tier = %step.tier,
            cost = step.cost,
            confirmed = step.confirmed,
            wait = step.wait,
            rate = step.rate,
            "planned purchase"
        );
        self.plan.steps.push(step);
    }

    /// Drop a research from planning, recording its remaining tiers.
    fn close(&mut self, candidate: Candidate<'_>, reason: UnreachableReason) {
        let research = candidate.research;
        warn!(tier = %candidate.tier_ref(), %reason, "tier unreachable");

        self.closed[candidate.slot] = true;
        self.plan.unreachable.push(UnreachableTier {
            tier: candidate.tier_ref(),
            research_name: research.name.clone(),
            reason,
        });
        for later in &research.tiers[self.progress[candidate.slot] + 1..] {
            self.plan.unreachable.push(UnreachableTier {
                tier: TierRef::new(research.id.as_str(), later.index),
                research_name: research.name.clone(),
                reason: UnreachableReason::Blocked {
                    by: candidate.tier.index,
                },
            });
        }
    }
}

/// Format the first `limit` plan steps as a table, followed by any
/// unreachable tiers and rejected researches.
pub fn format_plan(plan: &Plan, limit: Option<usize>) -> String {
    let mut output = String::new();
    let shown = limit.unwrap_or(plan.steps.len()).min(plan.steps.len());

    if plan.steps.is_empty() {
        output.push_str("Nothing left to buy.\n");
    } else {
        output.push_str(&format!(
            "{:>3}  {:<28} {:>4} {:>14} {:>14} {:>14} {:>14} {:>14}\n",
            "#", "Research", "Tier", "Cost", "Wait", "At", "Rate", "Payback"
        ));
        output.push_str(&format!("{}\n", "-".repeat(112)));
        for (n, step) in plan.steps.iter().take(shown).enumerate() {
            let marker = if step.confirmed { " " } else { "*" };
            output.push_str(&format!(
                "{:>3}  {:<28} {:>4} {}{:>13} {:>14} {:>14} {:>14} {:>14}\n",
                n + 1,
                step.research_name,
                step.tier.tier,
                marker,
                format_amount(step.cost),
                format_duration(step.wait),
                format_duration(step.at),
                format_amount(step.rate),
                step.payback().map_or_else(|| "-".to_string(), format_duration),
            ));
        }
        if shown < plan.steps.len() {
            output.push_str(&format!("  ... {} more\n", plan.steps.len() - shown));
        }
        if plan.estimated_steps() > 0 {
            output.push_str("  * estimated cost\n");
        }
    }

    if !plan.unreachable.is_empty() {
        output.push_str("\nUnreachable:\n");
        for u in &plan.unreachable {
            output.push_str(&format!(
                "  {} tier {}: {}\n",
                u.research_name, u.tier.tier, u.reason
            ));
        }
    }

    if !plan.rejected.is_empty() {
        output.push_str("\nRejected researches:\n");
        for err in &plan.rejected {
            output.push_str(&format!("  {}\n", err));
        }
    }

    output
}

/// Summary of a planning pass
#[derive(Debug)]
pub struct PlanSummary {
    pub steps: usize,
    pub estimated: usize,
    pub unreachable: usize,
    pub rejected: usize,
    pub completion: f64,
    pub final_rate: f64,
    pub final_balance: f64,
}

pub fn summarize_plan(plan: &Plan) -> PlanSummary {
    PlanSummary {
        steps: plan.steps.len(),
        estimated: plan.estimated_steps(),
        unreachable: plan.unreachable.len(),
        rejected: plan.rejected.len(),
        completion: plan.final_state.elapsed,
        final_rate: plan.final_state.rate,
        final_balance: plan.final_state.balance,
    }
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Plan Summary ===")?;
        writeln!(
            f,
            "Purchases:   {} ({} estimated)",
            self.steps, self.estimated
        )?;
        if self.unreachable > 0 || self.rejected > 0 {
            writeln!(
                f,
                "Skipped:     {} unreachable tiers, {} rejected researches",
                self.unreachable, self.rejected
            )?;
        }
        writeln!(f, "Done after:  {}", format_duration(self.completion))?;
        writeln!(f, "Final rate:  {}/s", format_amount(self.final_rate))?;
        writeln!(f, "Left over:   {}", format_amount(self.final_balance))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use proptest::prelude::*;

    use super::*;
    use crate::catalog::CatalogError;
    use crate::models::Research;
    use crate::pricing::{KnownCostStore, MemoryStore, ResolveError, StoreResolver};

    fn no_guess(tier: &TierRef) -> Result<PriceQuote, ResolveError> {
        Err(ResolveError::NoPriceBasis(tier.clone()))
    }

    fn guess(tier: &TierRef) -> Result<PriceQuote, ResolveError> {
        Ok(PriceQuote::estimated(100.0 + 50.0 * f64::from(tier.tier)))
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn position(plan: &Plan, tier: &TierRef) -> Option<usize> {
        plan.steps.iter().position(|s| &s.tier == tier)
    }

    #[test]
    fn cheap_tier_first_then_rate_shortens_the_next_wait() {
        let catalog = Catalog::build(vec![
            Research::new("r1", "R1").with_tier(Some(100.0), 10.0, false),
            Research::new("r2", "R2").with_tier(Some(50.0), 1.0, false),
        ]);
        let plan = plan(&catalog, GameState::new(10.0, 0.0), &no_guess).unwrap();

        assert_eq!(plan.steps.len(), 2);
        let first = &plan.steps[0];
        assert_eq!(first.tier, TierRef::new("r2", 0));
        assert!(close(first.wait, 5.0));
        assert!(close(first.at, 5.0));
        assert!(close(first.balance, 0.0));
        assert!(close(first.rate, 11.0));

        let second = &plan.steps[1];
        assert_eq!(second.tier, TierRef::new("r1", 0));
        assert!(close(second.wait, 100.0 / 11.0));
        assert!(second.wait < 10.0);
        assert!(close(second.at, 5.0 + 100.0 / 11.0));
        assert!(close(second.balance, 0.0));
        assert!(close(second.rate, 21.0));
        assert!(close(plan.final_state.rate, 21.0));
    }

    #[test]
    fn later_tier_waits_for_its_predecessor() {
        let catalog = Catalog::build(vec![
            Research::new("r", "R")
                .with_tier(Some(10.0), 5.0, false)
                .with_tier(Some(200.0), 1.0, false),
        ]);
        let plan = plan(&catalog, GameState::new(1.0, 0.0), &no_guess).unwrap();

        let tiers: Vec<u32> = plan.steps.iter().map(|s| s.tier.tier).collect();
        assert_eq!(tiers, vec![0, 1]);
        assert!(close(plan.steps[0].wait, 10.0));
        assert!(close(plan.steps[0].rate, 6.0));
        assert!(close(plan.steps[1].wait, 200.0 / 6.0));
        assert!(close(plan.steps[1].rate, 7.0));
    }

    #[test]
    fn negative_balance_is_paid_off_before_buying() {
        let catalog = Catalog::build(vec![
            Research::new("r", "R").with_tier(Some(5.0), 2.0, false),
        ]);
        let plan = plan(&catalog, GameState::new(1.0, -10.0), &no_guess).unwrap();

        assert_eq!(plan.steps.len(), 1);
        let step = &plan.steps[0];
        assert!(close(step.wait, 15.0));
        assert!(close(step.at, 15.0));
        assert!(close(step.balance, 0.0));
        assert!(close(step.rate, 3.0));
        assert!(plan.unreachable.is_empty());
    }

    #[test]
    fn no_income_tier_is_unreachable() {
        let catalog = Catalog::build(vec![
            Research::new("r", "R").with_tier(Some(10.0), 0.0, false),
        ]);
        let plan = plan(&catalog, GameState::new(0.0, 0.0), &no_guess).unwrap();

        assert!(plan.steps.is_empty());
        assert_eq!(
            plan.unreachable,
            vec![UnreachableTier {
                tier: TierRef::new("r", 0),
                research_name: "R".to_string(),
                reason: UnreachableReason::NoIncome,
            }]
        );
    }

    #[test]
    fn free_tier_can_unlock_income_for_stalled_ones() {
        let catalog = Catalog::build(vec![
            Research::new("paid", "Paid").with_tier(Some(10.0), 1.0, false),
            Research::new("free", "Free").with_tier(Some(0.0), 2.0, false),
        ]);
        let plan = plan(&catalog, GameState::new(0.0, 0.0), &no_guess).unwrap();

        assert!(plan.unreachable.is_empty());
        assert_eq!(plan.steps[0].tier, TierRef::new("free", 0));
        assert_eq!(plan.steps[1].tier, TierRef::new("paid", 0));
        assert!(close(plan.steps[1].wait, 5.0));
    }

    #[test]
    fn estimated_price_is_flagged_then_replaced_by_confirmed() {
        let catalog = Catalog::build(vec![
            Research::new("r", "R")
                .with_tier(Some(7.5), 1.0, true)
                .with_tier(Some(15.0), 1.0, true)
                .with_tier(None, 5.0, false),
        ]);
        let mut store = MemoryStore::default();
        store.set_known_cost("r", 0, 0, 7.5).unwrap();
        store.set_known_cost("r", 1, 0, 15.0).unwrap();

        let before = plan(&catalog, GameState::new(1.0, 0.0), &StoreResolver::new(&store)).unwrap();
        assert_eq!(before.steps.len(), 1);
        assert!(!before.steps[0].confirmed);
        assert!(close(before.steps[0].cost, 30.0));
        assert!(close(before.steps[0].wait, 30.0));
        assert_eq!(before.estimated_steps(), 1);

        store.set_known_cost("r", 2, 0, 25.0).unwrap();
        let after = plan(&catalog, GameState::new(1.0, 0.0), &StoreResolver::new(&store)).unwrap();
        assert!(after.steps[0].confirmed);
        assert!(close(after.steps[0].cost, 25.0));
        assert!(close(after.steps[0].wait, 25.0));
        assert!(close(after.steps[0].balance, 0.0));
        assert!(close(after.steps[0].rate, 6.0));
    }

    #[test]
    fn affordable_ties_break_on_cost_then_catalog_order() {
        let catalog = Catalog::build(vec![
            Research::new("a", "A").with_tier(Some(20.0), 1.0, false),
            Research::new("b", "B").with_tier(Some(10.0), 1.0, false),
            Research::new("c", "C").with_tier(Some(10.0), 1.0, false),
        ]);
        let plan = plan(&catalog, GameState::new(1.0, 100.0), &no_guess).unwrap();

        let order: Vec<&str> = plan
            .steps
            .iter()
            .map(|s| s.tier.research_id.as_str())
            .collect();
        assert_eq!(order, vec!["b", "c", "a"]);
        assert!(plan.steps.iter().all(|s| s.wait == 0.0));
        assert!(close(plan.steps[2].balance, 60.0));
    }

    #[test]
    fn buying_affordable_tier_can_push_sibling_into_a_wait() {
        let catalog = Catalog::build(vec![
            Research::new("a", "A").with_tier(Some(30.0), 1.0, false),
            Research::new("b", "B").with_tier(Some(40.0), 1.0, false),
        ]);
        let plan = plan(&catalog, GameState::new(2.0, 50.0), &no_guess).unwrap();

        assert_eq!(plan.steps[0].tier.research_id, "a");
        assert!(close(plan.steps[0].balance, 20.0));
        assert!(close(plan.steps[1].wait, 20.0 / 3.0));
    }

    #[test]
    fn resolver_failure_blocks_rest_of_research_only() {
        let catalog = Catalog::build(vec![
            Research::new("u", "Unknown")
                .with_tier(None, 1.0, false)
                .with_tier(Some(5.0), 1.0, false)
                .with_tier(Some(5.0), 1.0, false),
            Research::new("k", "Known").with_tier(Some(5.0), 1.0, false),
        ]);
        let plan = plan(&catalog, GameState::new(1.0, 0.0), &no_guess).unwrap();

        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].tier, TierRef::new("k", 0));
        assert_eq!(plan.unreachable.len(), 3);
        assert!(matches!(
            plan.unreachable[0].reason,
            UnreachableReason::PriceUnavailable(_)
        ));
        assert_eq!(
            plan.unreachable[2].reason,
            UnreachableReason::Blocked { by: 0 }
        );
    }

    #[test]
    fn invalid_resolver_cost_is_unreachable() {
        let catalog = Catalog::build(vec![Research::new("r", "R").with_tier(None, 1.0, false)]);
        let nan = |_: &TierRef| -> Result<PriceQuote, ResolveError> {
            Ok(PriceQuote::estimated(f64::NAN))
        };
        let plan = plan(&catalog, GameState::new(1.0, 0.0), &nan).unwrap();
        assert!(plan.steps.is_empty());
        assert_eq!(plan.unreachable.len(), 1);
    }

    #[test]
    fn rejected_researches_are_carried_and_others_planned() {
        let catalog = Catalog::build(vec![
            Research::new("empty", "Empty"),
            Research::new("ok", "Ok").with_tier(Some(1.0), 1.0, false),
        ]);
        let plan = plan(&catalog, GameState::new(1.0, 0.0), &no_guess).unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(
            plan.rejected,
            vec![CatalogError::EmptyResearch("empty".to_string())]
        );
    }

    #[test]
    fn elapsed_time_offsets_step_times() {
        let catalog = Catalog::build(vec![Research::new("r", "R").with_tier(Some(10.0), 1.0, false)]);
        let mut state = GameState::new(1.0, 0.0);
        state.elapsed = 100.0;
        let plan = plan(&catalog, state, &no_guess).unwrap();
        assert!(close(plan.steps[0].at, 110.0));
        assert!(close(plan.steps[0].wait, 10.0));
    }

    #[test]
    fn invalid_state_is_an_error() {
        let catalog = Catalog::default();
        assert_eq!(
            plan(&catalog, GameState::new(-1.0, 0.0), &no_guess),
            Err(PlanError::InvalidRate(-1.0))
        );
        assert!(matches!(
            plan(&catalog, GameState::new(1.0, f64::INFINITY), &no_guess),
            Err(PlanError::InvalidBalance(_))
        ));
    }

    #[test]
    fn report_marks_estimates_and_lists_unreachable() {
        let catalog = Catalog::build(vec![
            Research::new("a", "Alpha").with_tier(None, 1.0, false),
            Research::new("b", "Beta").with_tier(Some(10.0), 0.0, false),
        ]);
        let plan = plan(&catalog, GameState::new(0.0, 500.0), &guess).unwrap();
        let text = format_plan(&plan, Some(10));

        assert!(text.contains("Alpha"));
        assert!(text.contains("*"));
        assert!(text.contains("* estimated cost"));
        assert!(!text.contains("Unreachable"));

        let summary = summarize_plan(&plan).to_string();
        assert!(summary.contains("Purchases:   2 (1 estimated)"));
    }

    #[test]
    fn report_truncates_to_limit() {
        let catalog = Catalog::build(vec![
            Research::new("a", "A")
                .with_tier(Some(1.0), 1.0, false)
                .with_tier(Some(2.0), 1.0, false)
                .with_tier(Some(3.0), 1.0, false),
        ]);
        let plan = plan(&catalog, GameState::new(1.0, 0.0), &no_guess).unwrap();
        let text = format_plan(&plan, Some(1));
        assert!(text.contains("... 2 more"));
    }

    fn arb_research() -> impl Strategy<Value = (Vec<(Option<u32>, u32)>, usize)> {
        prop::collection::vec((prop::option::of(0u32..1000), 0u32..50), 1..5)
            .prop_flat_map(|tiers| {
                let n = tiers.len();
                (Just(tiers), 0..=n)
            })
    }

    fn arb_catalog() -> impl Strategy<Value = Catalog> {
        prop::collection::vec(arb_research(), 1..6).prop_map(|defs| {
            let researches = defs
                .into_iter()
                .enumerate()
                .map(|(i, (tiers, owned))| {
                    let mut research = Research::new(format!("r{}", i), format!("Research {}", i));
                    for (k, (cost, delta)) in tiers.into_iter().enumerate() {
                        research = research.with_tier(cost.map(f64::from), f64::from(delta), k < owned);
                    }
                    research
                })
                .collect();
            Catalog::build(researches)
        })
    }

    fn arb_state() -> impl Strategy<Value = GameState> {
        (0u32..20, 0u32..500).prop_map(|(rate, balance)| GameState::new(f64::from(rate), f64::from(balance)))
    }

    proptest! {
        #[test]
        fn tiers_follow_their_predecessors(catalog in arb_catalog(), state in arb_state()) {
            let plan = plan(&catalog, state, &guess).unwrap();
            let mut owned: HashSet<TierRef> = catalog
                .researches()
                .iter()
                .flat_map(|r| r.tiers.iter().filter(|t| t.owned).map(move |t| TierRef::new(r.id.as_str(), t.index)))
                .collect();
            for step in &plan.steps {
                if step.tier.tier > 0 {
                    let previous = TierRef::new(step.tier.research_id.as_str(), step.tier.tier - 1);
                    prop_assert!(owned.contains(&previous), "{} before its predecessor", step.tier);
                }
                prop_assert!(owned.insert(step.tier.clone()), "{} planned twice", step.tier);
            }
        }

        #[test]
        fn every_unowned_tier_is_planned_or_unreachable(catalog in arb_catalog(), state in arb_state()) {
            let plan = plan(&catalog, state, &guess).unwrap();
            prop_assert_eq!(plan.steps.len() + plan.unreachable.len(), catalog.unowned_count());
        }

        #[test]
        fn balance_stays_non_negative(catalog in arb_catalog(), state in arb_state()) {
            let plan = plan(&catalog, state, &guess).unwrap();
            for step in &plan.steps {
                prop_assert!(step.balance >= 0.0);
            }
        }

        #[test]
        fn rate_grows_exactly_with_deltas(catalog in arb_catalog(), state in arb_state()) {
            let plan = plan(&catalog, state, &guess).unwrap();
            let mut rate = state.rate;
            for step in &plan.steps {
                prop_assert!(step.rate >= rate);
                prop_assert_eq!(step.rate > rate, step.delta > 0.0);
                rate = step.rate;
            }
        }

        #[test]
        fn planning_is_deterministic(catalog in arb_catalog(), state in arb_state()) {
            let first = plan(&catalog, state, &guess).unwrap();
            let second = plan(&catalog, state, &guess).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn confirming_a_price_keeps_earlier_steps(
            catalog in arb_catalog(),
            state in arb_state(),
            pick in any::<prop::sample::Index>(),
            confirmed_cost in 0u32..1000,
        ) {
            let before = plan(&catalog, state, &guess).unwrap();
            let estimated: Vec<&PlanStep> = before.steps.iter().filter(|s| !s.confirmed).collect();
            prop_assume!(!estimated.is_empty());
            let target = pick.get(&estimated).tier.clone();

            let confirmed: HashMap<TierRef, f64> = HashMap::from([(target.clone(), f64::from(confirmed_cost))]);
            let resolver = |tier: &TierRef| -> Result<PriceQuote, ResolveError> {
                match confirmed.get(tier) {
                    Some(cost) => Ok(PriceQuote::confirmed(*cost)),
                    None => guess(tier),
                }
            };
            let after = plan(&catalog, state, &resolver).unwrap();

            let old_pos = position(&before, &target).unwrap();
            // a dearer confirmed price can leave the tier unaffordable without income
            let new_pos = position(&after, &target);
            if let Some(pos) = new_pos {
                prop_assert!(after.steps[pos].confirmed);
            }
            let keep = new_pos.map_or(old_pos, |pos| pos.min(old_pos));
            prop_assert_eq!(&before.steps[..keep], &after.steps[..keep]);
        }
    }
}
