use crate::marker::record::{Category, MarkerRecord, UserId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// User-selectable marker filter.
///
/// `Mine` requires a signed-in user; the UI boundary rejects selecting it
/// while unauthenticated, and the predicate itself matches nothing without a
/// user id so the invariant holds even if the guard is bypassed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterToken {
    All,
    Benign,
    Hazard,
    Mine,
}

impl FromStr for FilterToken {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(FilterToken::All),
            "benign" => Ok(FilterToken::Benign),
            "hazard" => Ok(FilterToken::Hazard),
            "mine" => Ok(FilterToken::Mine),
            other => Err(format!("unknown filter token: {}", other)),
        }
    }
}

/// Maps the active filter token to a visibility predicate
#[derive(Debug, Clone, Default)]
pub struct FilterEngine {
    active: FilterToken,
}

impl Default for FilterToken {
    fn default() -> Self {
        FilterToken::All
    }
}

impl FilterEngine {
    pub fn new() -> Self {
        Self {
            active: FilterToken::All,
        }
    }

    pub fn set_active(&mut self, token: FilterToken) {
        self.active = token;
    }

    pub fn active(&self) -> FilterToken {
        self.active
    }

    /// Whether a record passes the active filter. Category filters compare
    /// by exact category equality; `All` always matches; `Mine` matches only
    /// records owned by the given user and nothing when no user is known.
    pub fn matches(&self, record: &MarkerRecord, current_user: Option<&UserId>) -> bool {
        match self.active {
            FilterToken::All => true,
            FilterToken::Benign => record.category == Category::Benign,
            FilterToken::Hazard => record.category.is_hazard(),
            FilterToken::Mine => match current_user {
                Some(user) => record.is_owned_by(user),
                None => false,
            },
        }
    }
}
