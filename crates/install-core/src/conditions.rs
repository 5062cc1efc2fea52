//! Guard predicates for transition rules.
//!
//! A guard is either a named check or a boolean combination of guards.
//! Refresh transitions mostly use `Guard::condition`, which reads a
//! precomputed condition from the transition arguments, so validation-backed
//! and ad-hoc boolean guards look the same to the state machine.

use crate::error::{CoreError, Result};
use crate::validation::ValidationId;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Condition values keyed by validation or derived-condition ID
pub type Conditions = BTreeMap<String, bool>;

/// Source of precomputed conditions, implemented by refresh arguments
pub trait ConditionSource {
    /// Value of a named condition, `None` when it was not computed
    fn condition(&self, id: &str) -> Option<bool>;
}

impl ConditionSource for Conditions {
    fn condition(&self, id: &str) -> Option<bool> {
        self.get(id).copied()
    }
}

type Predicate<E, A> = Arc<dyn Fn(&E, &A) -> Result<bool> + Send + Sync>;

/// Boolean guard over an entity and transition arguments
pub enum Guard<E, A> {
    /// Named predicate
    Check(String, Predicate<E, A>),
    /// True when every guard is true; empty is true
    All(Vec<Guard<E, A>>),
    /// True when any guard is true; empty is false
    Any(Vec<Guard<E, A>>),
    /// Negation
    Not(Box<Guard<E, A>>),
}

impl<E, A> Clone for Guard<E, A> {
    fn clone(&self) -> Self {
        match self {
            Self::Check(label, predicate) => Self::Check(label.clone(), Arc::clone(predicate)),
            Self::All(guards) => Self::All(guards.clone()),
            Self::Any(guards) => Self::Any(guards.clone()),
            Self::Not(guard) => Self::Not(guard.clone()),
        }
    }
}

impl<E, A> fmt::Debug for Guard<E, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl<E, A> fmt::Display for Guard<E, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, guards: &[Guard<E, A>], op: &str| -> fmt::Result {
            write!(f, "(")?;
            for (i, guard) in guards.iter().enumerate() {
                if i > 0 {
                    write!(f, " {op} ")?;
                }
                write!(f, "{guard}")?;
            }
            write!(f, ")")
        };
        match self {
            Self::Check(label, _) => write!(f, "{label}"),
            Self::All(guards) => join(f, guards, "AND"),
            Self::Any(guards) => join(f, guards, "OR"),
            Self::Not(guard) => write!(f, "NOT {guard}"),
        }
    }
}

impl<E, A> Guard<E, A> {
    /// Named predicate guard
    pub fn check<F>(label: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&E, &A) -> Result<bool> + Send + Sync + 'static,
    {
        Self::Check(label.into(), Arc::new(predicate))
    }

    /// Conjunction
    #[must_use]
    pub fn all(guards: Vec<Guard<E, A>>) -> Self {
        Self::All(guards)
    }

    /// Disjunction
    #[must_use]
    pub fn any(guards: Vec<Guard<E, A>>) -> Self {
        Self::Any(guards)
    }

    /// Negation
    #[must_use]
    #[allow(clippy::should_implement_trait, reason = "guards are built, not computed")]
    pub fn not(guard: Guard<E, A>) -> Self {
        Self::Not(Box::new(guard))
    }

    /// Evaluates the guard; short-circuits and propagates the first error
    pub fn evaluate(&self, entity: &E, args: &A) -> Result<bool> {
        match self {
            Self::Check(_, predicate) => predicate(entity, args),
            Self::All(guards) => {
                for guard in guards {
                    if !guard.evaluate(entity, args)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Any(guards) => {
                for guard in guards {
                    if guard.evaluate(entity, args)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::Not(guard) => Ok(!guard.evaluate(entity, args)?),
        }
    }
}

impl<E, A: ConditionSource> Guard<E, A> {
    /// Guard reading a precomputed condition; a missing condition is an error
    pub fn condition(id: impl Into<String>) -> Self
    where
        E: 'static,
        A: 'static,
    {
        let id = id.into();
        let key = id.clone();
        Self::check(id, move |_, args: &A| {
            args.condition(&key)
                .ok_or_else(|| CoreError::ValidationContext(format!("condition '{key}' was not computed")))
        })
    }
}

/// Validation IDs excluded from guard evaluation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisabledValidations {
    disabled: BTreeSet<String>,
    unknown: Vec<String>,
}

impl DisabledValidations {
    /// Splits the configured IDs into known ones, which get disabled, and
    /// unknown ones, which are logged and ignored
    #[must_use]
    pub fn new<I: ValidationId>(configured: &[String]) -> Self {
        let mut disabled = BTreeSet::new();
        let mut unknown = Vec::new();
        for raw in configured {
            if I::all().iter().any(|id| id.as_str() == raw) {
                disabled.insert(raw.clone());
            } else {
                warn!("Ignoring unknown validation ID {} in disabled validations", raw);
                unknown.push(raw.clone());
            }
        }
        Self { disabled, unknown }
    }

    /// Whether `id` is disabled
    #[must_use]
    pub fn is_disabled(&self, id: &str) -> bool {
        self.disabled.contains(id)
    }

    /// Configured IDs that matched no known validation
    #[must_use]
    pub fn unknown(&self) -> &[String] {
        &self.unknown
    }

    /// AND of the condition guards of every enabled ID in `ids`
    #[must_use]
    pub fn all_enabled<E, A, I>(&self, ids: &[I]) -> Guard<E, A>
    where
        E: 'static,
        A: ConditionSource + 'static,
        I: ValidationId,
    {
        Guard::all(
            ids.iter()
                .filter(|id| !self.is_disabled(id.as_str()))
                .map(|id| Guard::condition(id.as_str()))
                .collect(),
        )
    }
}
