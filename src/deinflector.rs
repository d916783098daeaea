//! Rule-table driven deinflection.
//!
//! A reason table maps a reason name (`"past"`, `"-te"`, ...) to suffix
//! rewrite variants. Each variant consumes `kanaIn` from the end of a term,
//! appends `kanaOut`, and moves the candidate from the `rulesIn` word
//! classes to the `rulesOut` ones.

use std::ops::{BitAnd, BitOr, BitOrAssign};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

const JAPANESE_REASON_TABLE: &str = include_str!("language/ja/deinflect.json");

#[derive(thiserror::Error, Debug)]
pub enum DeinflectorError {
    #[error("invalid deinflection rule table: {reason}")]
    InvalidRuleTable { reason: String },
    #[error("failed to parse deinflection rule table: {0}")]
    Json(#[from] serde_json::Error),
}

/// Word class bitmask.
///
/// Two masks are compatible when either is empty or they share a bit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleFlags(u32);

impl RuleFlags {
    pub const NONE: RuleFlags = RuleFlags(0);
    /// Ichidan verb.
    pub const V1: RuleFlags = RuleFlags(1 << 0);
    /// Godan verb.
    pub const V5: RuleFlags = RuleFlags(1 << 1);
    /// Suru verb.
    pub const VS: RuleFlags = RuleFlags(1 << 2);
    /// Kuru verb.
    pub const VK: RuleFlags = RuleFlags(1 << 3);
    /// Zuru verb.
    pub const VZ: RuleFlags = RuleFlags(1 << 4);
    pub const ADJ_I: RuleFlags = RuleFlags(1 << 5);
    /// Intermediate `-te` form that can take a following auxiliary.
    pub const IRU: RuleFlags = RuleFlags(1 << 6);

    /// Unknown names map to [RuleFlags::NONE].
    pub fn from_rule_name(name: &str) -> Self {
        match name {
            "v1" => Self::V1,
            "v5" => Self::V5,
            "vs" => Self::VS,
            "vk" => Self::VK,
            "vz" => Self::VZ,
            "adj-i" => Self::ADJ_I,
            "iru" => Self::IRU,
            _ => Self::NONE,
        }
    }

    pub fn from_rules<S: AsRef<str>>(rules: impl IntoIterator<Item = S>) -> Self {
        rules
            .into_iter()
            .fold(Self::NONE, |flags, rule| flags | Self::from_rule_name(rule.as_ref()))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_compatible(self, other: Self) -> bool {
        self.is_empty() || other.is_empty() || self.intersects(other)
    }
}

impl BitOr for RuleFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        RuleFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for RuleFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for RuleFlags {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        RuleFlags(self.0 & rhs.0)
    }
}

/// A variant as written in a reason table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReasonVariant {
    pub kana_in: String,
    pub kana_out: String,
    pub rules_in: Vec<String>,
    pub rules_out: Vec<String>,
}

/// `reason name -> variants`, in table order.
pub type ReasonTable = IndexMap<String, Vec<RawReasonVariant>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReasonVariant {
    pub kana_in: String,
    pub kana_out: String,
    pub rules_in: RuleFlags,
    pub rules_out: RuleFlags,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deinflection {
    pub term: String,
    pub rules: RuleFlags,
    /// Outermost reason first.
    pub reasons: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Deinflector {
    reasons: Vec<(String, Vec<ReasonVariant>)>,
}

impl Deinflector {
    /// Compiles a reason table.
    pub fn normalize(table: ReasonTable) -> Result<Self, DeinflectorError> {
        let mut reasons = Vec::with_capacity(table.len());
        for (reason, raw_variants) in table {
            if reason.is_empty() {
                return Err(DeinflectorError::InvalidRuleTable {
                    reason: "reason names must not be empty".into(),
                });
            }
            let mut variants = Vec::with_capacity(raw_variants.len());
            for raw in raw_variants {
                let variant = ReasonVariant {
                    rules_in: RuleFlags::from_rules(&raw.rules_in),
                    rules_out: RuleFlags::from_rules(&raw.rules_out),
                    kana_in: raw.kana_in,
                    kana_out: raw.kana_out,
                };
                // an empty suffix must not be able to match its own output
                if variant.kana_in.is_empty()
                    && (variant.rules_in.is_empty()
                        || variant.rules_out.is_empty()
                        || variant.rules_in.intersects(variant.rules_out))
                {
                    return Err(DeinflectorError::InvalidRuleTable {
                        reason: format!(
                            "`{reason}` has a variant with an empty kanaIn that can re-apply to its own output"
                        ),
                    });
                }
                variants.push(variant);
            }
            reasons.push((reason, variants));
        }
        log::debug!("compiled deinflection table with {} reasons", reasons.len());
        Ok(Self { reasons })
    }

    pub fn from_json(json: &str) -> Result<Self, DeinflectorError> {
        let table: ReasonTable = serde_json::from_str(json)?;
        Self::normalize(table)
    }

    /// The bundled Japanese reason table.
    pub fn japanese() -> Result<Self, DeinflectorError> {
        Self::from_json(JAPANESE_REASON_TABLE)
    }

    pub fn reason_count(&self) -> usize {
        self.reasons.len()
    }

    /// Every candidate dictionary form of `source`, breadth first.
    ///
    /// The first candidate is always `source` itself with no rules and no reasons.
    pub fn deinflect(&self, source: &str) -> Vec<Deinflection> {
        let mut results = vec![Deinflection {
            term: source.to_string(),
            rules: RuleFlags::NONE,
            reasons: vec![],
        }];

        let mut i = 0;
        while i < results.len() {
            let mut found = Vec::new();
            {
                let Deinflection {
                    term,
                    rules,
                    reasons,
                } = &results[i];
                let term_len = term.chars().count();
                for (reason, variants) in &self.reasons {
                    for variant in variants {
                        if !rules.is_empty() && !rules.intersects(variant.rules_in) {
                            continue;
                        }
                        if !term.ends_with(variant.kana_in.as_str()) {
                            continue;
                        }
                        let kana_in_len = variant.kana_in.chars().count();
                        let kana_out_len = variant.kana_out.chars().count();
                        if term_len - kana_in_len + kana_out_len == 0 {
                            continue;
                        }

                        let stem = &term[..term.len() - variant.kana_in.len()];
                        let mut new_reasons = Vec::with_capacity(reasons.len() + 1);
                        new_reasons.push(reason.clone());
                        new_reasons.extend(reasons.iter().cloned());
                        found.push(Deinflection {
                            term: format!("{stem}{}", variant.kana_out),
                            rules: variant.rules_out,
                            reasons: new_reasons,
                        });
                    }
                }
            }
            results.extend(found);
            i += 1;
        }
        log::trace!("deinflect `{source}`: {} candidates", results.len());
        results
    }
}
