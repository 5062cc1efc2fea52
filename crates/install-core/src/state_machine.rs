//! Generic state machine.
//!
//! A machine is an ordered list of transition rules built once through
//! `StateMachineBuilder` and immutable afterwards, so it can be shared
//! between tasks without locking. Running a transition picks the first rule,
//! in registration order, whose sources contain the current state and whose
//! guard holds, then hands the rule's hook to a `TransitionHandler` which
//! persists the new state.

use crate::conditions::Guard;
use crate::error::{CoreError, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Types a concrete machine is parameterised over
pub trait MachineSpec: Send + Sync + 'static {
    /// Entity status
    type State: Copy + Eq + fmt::Display + fmt::Debug + Send + Sync + 'static;
    /// Kind of transition requested by a caller
    type TransitionType: Copy + Eq + fmt::Display + fmt::Debug + Send + Sync + 'static;
    /// Entity driven by the machine
    type Entity: Send + Sync + 'static;
    /// Per-call transition arguments
    type Args: Send + Sync + 'static;
    /// Post-transition action attached to a rule
    type Hook: Clone + fmt::Debug + Send + Sync + 'static;

    /// Status the entity is in now
    fn current_state(entity: &Self::Entity) -> Self::State;
}

/// One transition rule
pub struct TransitionRule<M: MachineSpec> {
    /// Name used in logs and tests
    pub name: &'static str,
    /// Transition type the rule answers
    pub transition_type: M::TransitionType,
    /// States the rule applies from
    pub sources: Vec<M::State>,
    /// Optional guard; absent means always
    pub condition: Option<Guard<M::Entity, M::Args>>,
    /// Target state
    pub destination: M::State,
    /// Optional post-transition hook
    pub post: Option<M::Hook>,
}

impl<M: MachineSpec> TransitionRule<M> {
    /// Unguarded rule without a hook
    pub fn new(
        name: &'static str,
        transition_type: M::TransitionType,
        sources: impl Into<Vec<M::State>>,
        destination: M::State,
    ) -> Self {
        Self {
            name,
            transition_type,
            sources: sources.into(),
            condition: None,
            destination,
            post: None,
        }
    }

    /// Adds a guard
    #[must_use]
    pub fn when(mut self, guard: Guard<M::Entity, M::Args>) -> Self {
        self.condition = Some(guard);
        self
    }

    /// Adds a post-transition hook
    #[must_use]
    pub fn then(mut self, hook: M::Hook) -> Self {
        self.post = Some(hook);
        self
    }

    fn matches(&self, transition_type: M::TransitionType, state: M::State, entity: &M::Entity, args: &M::Args) -> Result<bool> {
        if self.transition_type != transition_type || !self.sources.contains(&state) {
            return Ok(false);
        }
        match &self.condition {
            Some(guard) => guard.evaluate(entity, args),
            None => Ok(true),
        }
    }
}

impl<M: MachineSpec> Clone for TransitionRule<M> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            transition_type: self.transition_type,
            sources: self.sources.clone(),
            condition: self.condition.clone(),
            destination: self.destination,
            post: self.post.clone(),
        }
    }
}

impl<M: MachineSpec> fmt::Debug for TransitionRule<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionRule")
            .field("name", &self.name)
            .field("transition_type", &self.transition_type)
            .field("sources", &self.sources)
            .field("condition", &self.condition)
            .field("destination", &self.destination)
            .field("post", &self.post)
            .finish()
    }
}

/// Persists the effect of a matched rule
#[async_trait]
pub trait TransitionHandler<M: MachineSpec>: Send + Sync {
    /// Runs the rule's hook. Returning an error aborts the transition; the
    /// stored state must then be unchanged.
    async fn post_transition(
        &self,
        hook: Option<&M::Hook>,
        entity: &M::Entity,
        source: M::State,
        destination: M::State,
        args: &M::Args,
    ) -> Result<()>;
}

/// Outcome of a successful transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition<S> {
    /// Matched rule
    pub rule: &'static str,
    /// State before the transition
    pub source: S,
    /// State after the transition
    pub destination: S,
}

impl<S: PartialEq> Transition<S> {
    /// Whether the transition changed the state
    #[must_use]
    pub fn is_changed(&self) -> bool {
        self.source != self.destination
    }
}

/// Collects rules in registration order
pub struct StateMachineBuilder<M: MachineSpec> {
    rules: Vec<TransitionRule<M>>,
}

impl<M: MachineSpec> Default for StateMachineBuilder<M> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<M: MachineSpec> fmt::Debug for StateMachineBuilder<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachineBuilder").field("rules", &self.rules.len()).finish()
    }
}

impl<M: MachineSpec> StateMachineBuilder<M> {
    /// Empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rule
    pub fn add(&mut self, rule: TransitionRule<M>) -> &mut Self {
        self.rules.push(rule);
        self
    }

    /// Freezes the rule list
    #[must_use]
    pub fn build(self) -> StateMachine<M> {
        StateMachine {
            rules: self.rules.into(),
        }
    }
}

/// Immutable rule table
pub struct StateMachine<M: MachineSpec> {
    rules: Arc<[TransitionRule<M>]>,
}

impl<M: MachineSpec> Clone for StateMachine<M> {
    fn clone(&self) -> Self {
        Self {
            rules: Arc::clone(&self.rules),
        }
    }
}

impl<M: MachineSpec> fmt::Debug for StateMachine<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine").field("rules", &self.rules.len()).finish()
    }
}

impl<M: MachineSpec> StateMachine<M> {
    /// Rules in registration order
    #[must_use]
    pub fn rules(&self) -> &[TransitionRule<M>] {
        &self.rules
    }

    /// First rule matching the entity's state and the arguments
    pub fn find(&self, transition_type: M::TransitionType, entity: &M::Entity, args: &M::Args) -> Result<&TransitionRule<M>> {
        let state = M::current_state(entity);
        for rule in self.rules.iter() {
            if rule.matches(transition_type, state, entity, args)? {
                return Ok(rule);
            }
        }
        Err(CoreError::NoMatchingTransition {
            transition_type: transition_type.to_string(),
            state: state.to_string(),
        })
    }

    /// Runs a transition: selects the rule, then lets `handler` persist it
    pub async fn run<H>(
        &self,
        transition_type: M::TransitionType,
        entity: &M::Entity,
        args: &M::Args,
        handler: &H,
    ) -> Result<Transition<M::State>>
    where
        H: TransitionHandler<M> + ?Sized,
    {
        let source = M::current_state(entity);
        let rule = self.find(transition_type, entity, args)?;
        debug!(
            "Transition {} from \"{}\" matched rule {} to \"{}\"",
            transition_type, source, rule.name, rule.destination
        );
        handler
            .post_transition(rule.post.as_ref(), entity, source, rule.destination, args)
            .await?;
        Ok(Transition {
            rule: rule.name,
            source,
            destination: rule.destination,
        })
    }
}
