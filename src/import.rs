//! Import of research definitions from JSON files
//!
//! A file holds one research object or an array of them. Amounts may be
//! plain numbers or strings with a unit suffix such as `"12.5B"`. Prices are
//! taken as seen at the research's `discount` percentage, 0 when absent.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use serde::Deserialize;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::catalog::Catalog;
use crate::db;
use crate::models::Research;
use crate::pricing::MAX_DISCOUNT;
use crate::units::parse_amount;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Amount {
    Number(f64),
    Text(String),
}

impl Amount {
    fn value(&self) -> Result<f64> {
        match self {
            Amount::Number(n) => Ok(*n),
            Amount::Text(s) => Ok(parse_amount(s)?),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TierDef {
    delta: Amount,
    #[serde(default)]
    cost: Option<Amount>,
}

#[derive(Debug, Deserialize)]
struct ResearchDef {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    owned: u32,
    #[serde(default)]
    discount: u32,
    tiers: Vec<TierDef>,
}

/// A parsed research and the discount its prices were seen at
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedResearch {
    pub research: Research,
    pub discount: u32,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResearchFile {
    Many(Vec<ResearchDef>),
    One(ResearchDef),
}

/// Find all `*.json` files under a directory, or the path itself if it is a file
pub fn find_research_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        bail!("{} does not exist", path.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path.to_path_buf());
        }
    }

    Ok(files)
}

fn to_research(def: ResearchDef) -> Result<ImportedResearch> {
    if def.discount > MAX_DISCOUNT {
        bail!(
            "research '{}' has discount {}%, at most {}% is possible",
            def.id,
            def.discount,
            MAX_DISCOUNT
        );
    }
    if def.owned as usize > def.tiers.len() {
        bail!(
            "research '{}' owns {} of only {} tiers",
            def.id,
            def.owned,
            def.tiers.len()
        );
    }

    let name = def.name.unwrap_or_else(|| def.id.clone());
    let mut research = Research::new(def.id, name);
    for (index, tier) in def.tiers.iter().enumerate() {
        let delta = tier
            .delta
            .value()
            .with_context(|| format!("tier {} delta of '{}'", index, research.id))?;
        let cost = tier
            .cost
            .as_ref()
            .map(Amount::value)
            .transpose()
            .with_context(|| format!("tier {} cost of '{}'", index, research.id))?;
        research = research.with_tier(cost, delta, (index as u32) < def.owned);
    }
    Ok(ImportedResearch {
        research,
        discount: def.discount,
    })
}

/// Parse a single research definition file
pub fn parse_research_file(filepath: &Path) -> Result<Vec<ImportedResearch>> {
    let content = fs::read_to_string(filepath)
        .with_context(|| format!("Failed to read {}", filepath.display()))?;
    let parsed: ResearchFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", filepath.display()))?;

    let defs = match parsed {
        ResearchFile::Many(defs) => defs,
        ResearchFile::One(def) => vec![def],
    };
    defs.into_iter().map(to_research).collect()
}

/// Import every research definition found under `path` into the database
pub fn import_to_database(conn: &Connection, path: &Path) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    let files = find_research_files(path)?;
    info!(path = %path.display(), files = files.len(), "scanning research definitions");

    for filepath in &files {
        match parse_research_file(filepath) {
            Ok(researches) => {
                stats.files += 1;
                for ImportedResearch { research, discount } in researches {
                    let checked = Catalog::build(vec![research]);
                    if let Some(err) = checked.rejected().first() {
                        warn!(file = %filepath.display(), research = err.research(), error = %err, "skipping research");
                        stats.rejected += 1;
                        continue;
                    }
                    for research in checked.researches() {
                        db::save_research(conn, research, discount)?;
                        stats.researches += 1;
                        stats.tiers += research.tiers.len();
                        stats.known_costs += research.tiers.iter().filter(|t| t.cost.is_some()).count();
                        info!(research = %research.id, tiers = research.tiers.len(), "imported");
                    }
                }
            }
            Err(e) => {
                warn!(file = %filepath.display(), error = %format!("{:#}", e), "skipping file");
                stats.errors += 1;
            }
        }
    }

    Ok(stats)
}

#[derive(Debug, Default)]
pub struct ImportStats {
    pub files: usize,
    pub researches: usize,
    pub tiers: usize,
    pub known_costs: usize,
    pub rejected: usize,
    pub errors: usize,
}

impl fmt::Display for ImportStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Imported {} researches ({} tiers, {} known prices) from {} files. Rejected: {}, Errors: {}",
            self.researches, self.tiers, self.known_costs, self.files, self.rejected, self.errors
        )
    }
}
