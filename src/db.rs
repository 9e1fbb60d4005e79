//! Database schema and operations

use anyhow::{bail, Result};
use rusqlite::{Connection, OptionalExtension};

use crate::models::{Research, ResearchInfo, Tier};
use crate::pricing::{KnownCost, KnownCostStore, MAX_DISCOUNT};

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Research tracks, listed in catalog order
        CREATE TABLE IF NOT EXISTS researches (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            position INTEGER NOT NULL,
            owned_tiers INTEGER NOT NULL DEFAULT 0
        );

        -- Income gained by each tier
        CREATE TABLE IF NOT EXISTS tiers (
            research_id TEXT NOT NULL,
            tier_index INTEGER NOT NULL,
            delta REAL NOT NULL,
            PRIMARY KEY (research_id, tier_index)
        );

        -- Confirmed prices by the discount percentage they were seen at
        CREATE TABLE IF NOT EXISTS known_costs (
            research_id TEXT NOT NULL,
            tier_index INTEGER NOT NULL,
            discount INTEGER NOT NULL DEFAULT 0,
            cost REAL NOT NULL,
            PRIMARY KEY (research_id, tier_index, discount)
        );

        CREATE INDEX IF NOT EXISTS idx_researches_position ON researches(position);
        "#,
    )?;
    Ok(())
}

/// Remove every research, tier and price
pub fn clear_data(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DELETE FROM known_costs;
        DELETE FROM tiers;
        DELETE FROM researches;
        "#,
    )?;
    Ok(())
}

/// Insert or replace a research with its tiers, ownership and known prices.
///
/// Prices of the research are recorded at `discount`. A replaced research
/// keeps its catalog position and the prices stored earlier for tiers it
/// still has, unless it supplies a new one. Prices of dropped tiers go.
pub fn save_research(conn: &Connection, research: &Research, discount: u32) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO researches (id, name, position, owned_tiers)
         VALUES (?1, ?2, (SELECT COALESCE(MAX(position) + 1, 0) FROM researches), ?3)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, owned_tiers = excluded.owned_tiers",
        (&research.id, &research.name, research.owned_count() as u32),
    )?;

    tx.execute("DELETE FROM tiers WHERE research_id = ?1", [&research.id])?;
    tx.execute(
        "DELETE FROM known_costs WHERE research_id = ?1 AND tier_index >= ?2",
        (&research.id, research.tiers.len() as u32),
    )?;
    for tier in &research.tiers {
        tx.execute(
            "INSERT INTO tiers (research_id, tier_index, delta) VALUES (?1, ?2, ?3)",
            (&research.id, tier.index, tier.delta),
        )?;
        if let Some(cost) = tier.cost {
            set_known_cost(&tx, &research.id, tier.index, discount, cost)?;
        }
    }
    tx.commit()?;
    Ok(())
}

pub fn set_known_cost(
    conn: &Connection,
    research_id: &str,
    tier: u32,
    discount: u32,
    cost: f64,
) -> Result<()> {
    if !cost.is_finite() || cost < 0.0 {
        bail!("cost must be a non-negative number, got {}", cost);
    }
    if discount > MAX_DISCOUNT {
        bail!("discount must be at most {}%, got {}%", MAX_DISCOUNT, discount);
    }
    conn.execute(
        "INSERT OR REPLACE INTO known_costs (research_id, tier_index, discount, cost)
         VALUES (?1, ?2, ?3, ?4)",
        (research_id, tier, discount, cost),
    )?;
    Ok(())
}

pub fn get_known_cost(
    conn: &Connection,
    research_id: &str,
    tier: u32,
    discount: u32,
) -> Result<Option<f64>> {
    let cost = conn
        .query_row(
            "SELECT cost FROM known_costs
             WHERE research_id = ?1 AND tier_index = ?2 AND discount = ?3",
            (research_id, tier, discount),
            |row| row.get(0),
        )
        .optional()?;
    Ok(cost)
}

/// Forget confirmed prices of a tier, at one discount or at all of them.
/// Returns how many were stored.
pub fn clear_known_cost(
    conn: &Connection,
    research_id: &str,
    tier: u32,
    discount: Option<u32>,
) -> Result<usize> {
    let removed = match discount {
        Some(discount) => conn.execute(
            "DELETE FROM known_costs WHERE research_id = ?1 AND tier_index = ?2 AND discount = ?3",
            (research_id, tier, discount),
        )?,
        None => conn.execute(
            "DELETE FROM known_costs WHERE research_id = ?1 AND tier_index = ?2",
            (research_id, tier),
        )?,
    };
    Ok(removed)
}

/// All confirmed prices of a research, by tier index then discount
pub fn known_costs(conn: &Connection, research_id: &str) -> Result<Vec<KnownCost>> {
    let mut stmt = conn.prepare(
        "SELECT tier_index, discount, cost FROM known_costs
         WHERE research_id = ?1 ORDER BY tier_index, discount",
    )?;

    let rows = stmt.query_map([research_id], |row| {
        Ok(KnownCost {
            tier: row.get(0)?,
            discount: row.get(1)?,
            cost: row.get(2)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

fn tier_count(conn: &Connection, research_id: &str) -> Result<Option<(u32, u32)>> {
    let counts = conn
        .query_row(
            "SELECT r.owned_tiers, (SELECT COUNT(*) FROM tiers t WHERE t.research_id = r.id)
             FROM researches r WHERE r.id = ?1",
            [research_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(counts)
}

/// Set how many tiers of a research are owned
pub fn set_owned_tiers(conn: &Connection, research_id: &str, owned: u32) -> Result<()> {
    let Some((_, total)) = tier_count(conn, research_id)? else {
        bail!("unknown research '{}'", research_id);
    };
    if owned > total {
        bail!(
            "research '{}' has only {} tiers, cannot own {}",
            research_id,
            total,
            owned
        );
    }
    conn.execute(
        "UPDATE researches SET owned_tiers = ?2 WHERE id = ?1",
        (research_id, owned),
    )?;
    Ok(())
}

/// Mark the next tier of a research as owned, returning its index
pub fn buy_next_tier(conn: &Connection, research_id: &str) -> Result<u32> {
    let Some((owned, total)) = tier_count(conn, research_id)? else {
        bail!("unknown research '{}'", research_id);
    };
    if owned >= total {
        bail!("research '{}' is already complete", research_id);
    }
    set_owned_tiers(conn, research_id, owned + 1)?;
    Ok(owned)
}

/// Load every research with tiers, ownership and the prices confirmed at `discount`
pub fn load_researches(conn: &Connection, discount: u32) -> Result<Vec<Research>> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.name, r.owned_tiers, t.tier_index, t.delta, k.cost
         FROM researches r
         LEFT JOIN tiers t ON t.research_id = r.id
         LEFT JOIN known_costs k
           ON k.research_id = t.research_id AND k.tier_index = t.tier_index AND k.discount = ?1
         ORDER BY r.position, t.tier_index",
    )?;

    let rows = stmt.query_map([discount], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, u32>(2)?,
            row.get::<_, Option<u32>>(3)?,
            row.get::<_, Option<f64>>(4)?,
            row.get::<_, Option<f64>>(5)?,
        ))
    })?;

    let mut results: Vec<Research> = Vec::new();
    for row in rows {
        let (id, name, owned, index, delta, cost) = row?;
        if results.last().map_or(true, |r| r.id != id) {
            results.push(Research::new(id, name));
        }
        // a research without tiers yields a single row of NULLs
        if let (Some(index), Some(delta), Some(research)) = (index, delta, results.last_mut()) {
            research.tiers.push(Tier {
                index,
                cost,
                delta,
                owned: index < owned,
            });
        }
    }
    Ok(results)
}

/// List researches with tier and price counts
pub fn list_researches(conn: &Connection) -> Result<Vec<ResearchInfo>> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.name, r.owned_tiers,
                (SELECT COUNT(*) FROM tiers t WHERE t.research_id = r.id),
                (SELECT COUNT(DISTINCT k.tier_index) FROM known_costs k WHERE k.research_id = r.id)
         FROM researches r ORDER BY r.position",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(ResearchInfo {
            id: row.get(0)?,
            name: row.get(1)?,
            owned: row.get(2)?,
            tiers: row.get(3)?,
            known_costs: row.get(4)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Price store backed by the SQLite database
pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl KnownCostStore for SqliteStore<'_> {
    fn get_known_cost(&self, research_id: &str, tier: u32, discount: u32) -> Result<Option<f64>> {
        get_known_cost(self.conn, research_id, tier, discount)
    }

    fn set_known_cost(&mut self, research_id: &str, tier: u32, discount: u32, cost: f64) -> Result<()> {
        set_known_cost(self.conn, research_id, tier, discount, cost)
    }

    fn known_costs(&self, research_id: &str) -> Result<Vec<KnownCost>> {
        known_costs(self.conn, research_id)
    }
}
