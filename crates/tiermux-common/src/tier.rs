use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Intent-complexity bucket. Larger numbers imply more capable (and more
/// expensive) models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    T1,
    T2,
    T3,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::T1, Tier::T2, Tier::T3];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::T1 => "t1",
            Tier::T2 => "t2",
            Tier::T3 => "t3",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognized tier: {0}")]
pub struct ParseTierError(String);

impl FromStr for Tier {
    type Err = ParseTierError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "t1" => Ok(Tier::T1),
            "t2" => Ok(Tier::T2),
            "t3" => Ok(Tier::T3),
            other => Err(ParseTierError(other.to_string())),
        }
    }
}

/// Finds the first occurrence of `t1|t2|t3` in a lowercased, trimmed string.
/// Used by the intent classifier to parse a free-text model reply.
pub fn find_tier_in_text(text: &str) -> Option<Tier> {
    let lowered = text.trim().to_ascii_lowercase();
    let mut best: Option<(usize, Tier)> = None;
    for (needle, tier) in [("t1", Tier::T1), ("t2", Tier::T2), ("t3", Tier::T3)] {
        if let Some(pos) = lowered.find(needle)
            && best.is_none_or(|(best_pos, _)| pos < best_pos)
        {
            best = Some((pos, tier));
        }
    }
    best.map(|(_, tier)| tier)
}
