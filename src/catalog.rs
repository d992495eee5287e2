//! Challenge catalog definitions
//!
//! All purchasable challenge products are defined here: the six notional
//! tiers, the two difficulty curves with their streak-threshold ladders and
//! minimum qualifying odds, purchase prices and the per-level reward tables.
//! Values are fixed at definition time; records snapshot what they need at
//! purchase so catalog changes never retroactively alter an open challenge.

use serde::{Deserialize, Serialize};

/// Difficulty curve of a challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Lower odds floor, longer streak ladder
    Beginner,
    /// Higher odds floor, shorter streak ladder
    Pro,
}

impl Difficulty {
    /// Get the string ID for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Pro => "pro",
        }
    }

    /// Parse from database string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "beginner" => Some(Self::Beginner),
            "pro" => Some(Self::Pro),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Beginner => "Beginner",
            Self::Pro => "Pro",
        }
    }

    /// Minimum decimal odds a bet must carry to count toward the streak
    pub fn min_odds(&self) -> f64 {
        match self {
            Self::Beginner => 1.5,
            Self::Pro => 2.0,
        }
    }

    /// Consecutive-win thresholds for levels 1 through 4
    pub fn thresholds(&self) -> [u32; 4] {
        match self {
            Self::Beginner => [3, 6, 10, 15],
            Self::Pro => [2, 4, 6, 9],
        }
    }
}

/// Notional size of a challenge account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Tier {
    T1k,
    T5k,
    T10k,
    T25k,
    T50k,
    T100k,
}

impl Tier {
    /// Notional account size in whole currency units
    pub fn notional(&self) -> i64 {
        match self {
            Self::T1k => 1_000,
            Self::T5k => 5_000,
            Self::T10k => 10_000,
            Self::T25k => 25_000,
            Self::T50k => 50_000,
            Self::T100k => 100_000,
        }
    }

    pub fn from_notional(notional: i64) -> Option<Self> {
        match notional {
            1_000 => Some(Self::T1k),
            5_000 => Some(Self::T5k),
            10_000 => Some(Self::T10k),
            25_000 => Some(Self::T25k),
            50_000 => Some(Self::T50k),
            100_000 => Some(Self::T100k),
            _ => None,
        }
    }

    /// Get all tiers, smallest first
    pub fn all() -> &'static [Tier] {
        &[
            Self::T1k,
            Self::T5k,
            Self::T10k,
            Self::T25k,
            Self::T50k,
            Self::T100k,
        ]
    }
}

impl TryFrom<i64> for Tier {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Tier::from_notional(value).ok_or_else(|| format!("unknown challenge tier: {}", value))
    }
}

impl From<Tier> for i64 {
    fn from(tier: Tier) -> i64 {
        tier.notional()
    }
}

/// One purchasable product: a (tier, difficulty) pair with its price and
/// the cash reward unlocked at each of the four levels.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub tier: Tier,
    pub difficulty: Difficulty,
    /// Purchase price in cents
    pub price_cents: i64,
    /// Reward per level in cents; level 4 always pays the full tier notional
    pub rewards_cents: [i64; 4],
}

/// All catalog entries
pub static CATALOG: &[CatalogEntry] = &[
    // === BEGINNER (odds floor 1.50, ladder 3/6/10/15) ===
    CatalogEntry {
        tier: Tier::T1k,
        difficulty: Difficulty::Beginner,
        price_cents: 4_900,
        rewards_cents: [300, 10_000, 50_000, 100_000],
    },
    CatalogEntry {
        tier: Tier::T5k,
        difficulty: Difficulty::Beginner,
        price_cents: 19_900,
        rewards_cents: [1_500, 50_000, 250_000, 500_000],
    },
    CatalogEntry {
        tier: Tier::T10k,
        difficulty: Difficulty::Beginner,
        price_cents: 34_900,
        rewards_cents: [3_000, 100_000, 500_000, 1_000_000],
    },
    CatalogEntry {
        tier: Tier::T25k,
        difficulty: Difficulty::Beginner,
        price_cents: 69_900,
        rewards_cents: [7_500, 250_000, 1_250_000, 2_500_000],
    },
    CatalogEntry {
        tier: Tier::T50k,
        difficulty: Difficulty::Beginner,
        price_cents: 119_900,
        rewards_cents: [15_000, 500_000, 2_500_000, 5_000_000],
    },
    CatalogEntry {
        tier: Tier::T100k,
        difficulty: Difficulty::Beginner,
        price_cents: 199_900,
        rewards_cents: [30_000, 1_000_000, 5_000_000, 10_000_000],
    },
    // === PRO (odds floor 2.00, ladder 2/4/6/9) ===
    CatalogEntry {
        tier: Tier::T1k,
        difficulty: Difficulty::Pro,
        price_cents: 4_900,
        rewards_cents: [500, 15_000, 60_000, 100_000],
    },
    CatalogEntry {
        tier: Tier::T5k,
        difficulty: Difficulty::Pro,
        price_cents: 19_900,
        rewards_cents: [2_500, 75_000, 300_000, 500_000],
    },
    CatalogEntry {
        tier: Tier::T10k,
        difficulty: Difficulty::Pro,
        price_cents: 34_900,
        rewards_cents: [5_000, 150_000, 600_000, 1_000_000],
    },
    CatalogEntry {
        tier: Tier::T25k,
        difficulty: Difficulty::Pro,
        price_cents: 69_900,
        rewards_cents: [12_500, 375_000, 1_500_000, 2_500_000],
    },
    CatalogEntry {
        tier: Tier::T50k,
        difficulty: Difficulty::Pro,
        price_cents: 119_900,
        rewards_cents: [25_000, 750_000, 3_000_000, 5_000_000],
    },
    CatalogEntry {
        tier: Tier::T100k,
        difficulty: Difficulty::Pro,
        price_cents: 199_900,
        rewards_cents: [50_000, 1_500_000, 6_000_000, 10_000_000],
    },
];

impl CatalogEntry {
    /// Get the catalog entry for a (tier, difficulty) pair
    pub fn get(tier: Tier, difficulty: Difficulty) -> &'static CatalogEntry {
        CATALOG
            .iter()
            .find(|e| e.tier == tier && e.difficulty == difficulty)
            .expect("All (tier, difficulty) pairs should be defined")
    }

    /// Reward in cents for a level (1-4)
    pub fn reward_for_level(&self, level: u8) -> i64 {
        self.rewards_cents[(level - 1) as usize]
    }

    /// Total number of catalog entries
    pub fn total_count() -> usize {
        CATALOG.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_covers_all_pairs() {
        assert_eq!(CATALOG.len(), Tier::all().len() * 2);
        for tier in Tier::all() {
            for difficulty in [Difficulty::Beginner, Difficulty::Pro] {
                let entry = CatalogEntry::get(*tier, difficulty);
                assert_eq!(entry.tier, *tier);
            }
        }
    }

    #[test]
    fn test_level_four_pays_the_full_notional() {
        for entry in CATALOG {
            assert_eq!(
                entry.rewards_cents[3],
                entry.tier.notional() * 100,
                "level 4 reward must equal the tier notional for {:?}/{:?}",
                entry.tier,
                entry.difficulty
            );
        }
    }

    #[test]
    fn test_rewards_strictly_increase_per_level() {
        for entry in CATALOG {
            for i in 1..4 {
                assert!(
                    entry.rewards_cents[i] > entry.rewards_cents[i - 1],
                    "rewards must increase per level for {:?}/{:?}",
                    entry.tier,
                    entry.difficulty
                );
            }
        }
    }

    #[test]
    fn test_thresholds_strictly_increase() {
        for difficulty in [Difficulty::Beginner, Difficulty::Pro] {
            let ladder = difficulty.thresholds();
            for i in 1..4 {
                assert!(ladder[i] > ladder[i - 1]);
            }
        }
    }

    #[test]
    fn test_tier_roundtrip() {
        for tier in Tier::all() {
            assert_eq!(Tier::from_notional(tier.notional()), Some(*tier));
        }
        assert_eq!(Tier::from_notional(777), None);
    }

    #[test]
    fn test_difficulty_roundtrip() {
        for d in [Difficulty::Beginner, Difficulty::Pro] {
            assert_eq!(Difficulty::from_str(d.as_str()), Some(d));
        }
        assert_eq!(Difficulty::from_str("elite"), None);
    }
}
