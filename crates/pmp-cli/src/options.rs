//! Declarative option requirements.
//!
//! Each [`OptionRule`] names the pool types an option is valid for and what
//! else must be given with it. `requires` is a conjunction of groups; a
//! group is satisfied when any one of its options is present.

use anyhow::{Result, bail};
use pmp_types::PoolType;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Btt,
    Flog,
    Range,
}

impl Flag {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Btt => "--btt",
            Self::Flog => "--flog",
            Self::Range => "--range",
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OptionRule {
    pub option: Flag,
    pub pool_types: &'static [PoolType],
    pub requires: &'static [&'static [Flag]],
}

pub const INFO_RULES: &[OptionRule] = &[
    OptionRule {
        option: Flag::Btt,
        pool_types: &[PoolType::Block],
        requires: &[],
    },
    OptionRule {
        option: Flag::Flog,
        pool_types: &[PoolType::Block],
        requires: &[&[Flag::Btt]],
    },
    OptionRule {
        option: Flag::Range,
        pool_types: &[PoolType::Block],
        requires: &[&[Flag::Flog]],
    },
];

/// Check the options in `given` against `rules` for a pool of `pool_type`.
pub fn validate(rules: &[OptionRule], given: &[Flag], pool_type: PoolType) -> Result<()> {
    for rule in rules.iter().filter(|rule| given.contains(&rule.option)) {
        if !rule.pool_types.contains(&pool_type) {
            bail!("{} is not supported for {pool_type} pools", rule.option);
        }
        for group in rule.requires {
            if !group.iter().any(|flag| given.contains(flag)) {
                let alternatives: Vec<_> = group.iter().map(|flag| flag.as_str()).collect();
                bail!("{} requires {}", rule.option, alternatives.join(" or "));
            }
        }
    }
    Ok(())
}
