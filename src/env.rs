//! Receiver environments and their query surface.
//!
//! An [`Env`] is a query-indexed bag threaded through the receiver chain.
//! Environments compose by layering: a child overlay answers the queries it
//! carries and delegates the rest to its parent. Adaptor receivers forward
//! their outer receiver's environment unchanged unless they deliberately
//! inject a query (`when_any` injects its internal stop token, a counting
//! scope's `wrap` injects the scope's).
//!
//! Queries:
//!
//! - [`Env::stop_token`]: the current stop token (never-stopping default)
//! - [`Env::scheduler`] / [`Env::delegatee_scheduler`]
//! - [`Env::forward_progress`]
//! - [`Env::completion_scheduler`]: per completion channel
//! - [`Env::domain`]: tag-based customisation dispatch (stubbed)

use crate::scheduler::{AnyScheduler, ForwardProgress};
use crate::stop::StopToken;
use std::sync::Arc;

/// The three completion channels of a sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// The value channel (`set_value`).
    Value,
    /// The error channel (`set_error`).
    Error,
    /// The stopped channel (`set_stopped`).
    Stopped,
}

impl Channel {
    const fn index(self) -> usize {
        match self {
            Self::Value => 0,
            Self::Error => 1,
            Self::Stopped => 2,
        }
    }
}

/// Opaque domain marker for tag-based customisation dispatch.
///
/// Advanced machinery in the source model; carried here as an opaque
/// identifier so user environments can round-trip it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Domain(pub u64);

#[derive(Default)]
struct EnvNode {
    stop_token: Option<StopToken>,
    scheduler: Option<AnyScheduler>,
    delegatee_scheduler: Option<AnyScheduler>,
    forward_progress: Option<ForwardProgress>,
    completion_schedulers: [Option<AnyScheduler>; 3],
    domain: Option<Domain>,
    parent: Option<Arc<EnvNode>>,
}

impl EnvNode {
    fn lookup<T, F>(&self, select: F) -> Option<T>
    where
        F: Fn(&EnvNode) -> Option<T>,
    {
        let mut node = self;
        loop {
            if let Some(found) = select(node) {
                return Some(found);
            }
            match &node.parent {
                Some(parent) => node = parent,
                None => return None,
            }
        }
    }
}

/// A layered query environment.
///
/// Cheap to clone; overlays share their parents. The empty environment
/// answers every query with its default.
#[derive(Clone, Default)]
pub struct Env {
    node: Option<Arc<EnvNode>>,
}

impl Env {
    /// The empty environment.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    fn overlay(&self, mutate: impl FnOnce(&mut EnvNode)) -> Self {
        let mut node = EnvNode {
            parent: self.node.clone(),
            ..EnvNode::default()
        };
        mutate(&mut node);
        Self {
            node: Some(Arc::new(node)),
        }
    }

    /// Returns a child environment answering `stop_token` with `token`.
    #[must_use]
    pub fn with_stop_token(&self, token: StopToken) -> Self {
        self.overlay(|node| node.stop_token = Some(token))
    }

    /// Returns a child environment answering `scheduler` with `scheduler`.
    #[must_use]
    pub fn with_scheduler(&self, scheduler: AnyScheduler) -> Self {
        self.overlay(|node| node.scheduler = Some(scheduler))
    }

    /// Returns a child environment answering `delegatee_scheduler`.
    #[must_use]
    pub fn with_delegatee_scheduler(&self, scheduler: AnyScheduler) -> Self {
        self.overlay(|node| node.delegatee_scheduler = Some(scheduler))
    }

    /// Returns a child environment answering `forward_progress`.
    #[must_use]
    pub fn with_forward_progress(&self, guarantee: ForwardProgress) -> Self {
        self.overlay(|node| node.forward_progress = Some(guarantee))
    }

    /// Returns a child environment answering `completion_scheduler` for the
    /// given channel.
    #[must_use]
    pub fn with_completion_scheduler(&self, channel: Channel, scheduler: AnyScheduler) -> Self {
        self.overlay(|node| node.completion_schedulers[channel.index()] = Some(scheduler))
    }

    /// Returns a child environment answering `domain`.
    #[must_use]
    pub fn with_domain(&self, domain: Domain) -> Self {
        self.overlay(|node| node.domain = Some(domain))
    }

    /// The current stop token, or a never-stopping one.
    #[must_use]
    pub fn stop_token(&self) -> StopToken {
        self.node
            .as_deref()
            .and_then(|node| node.lookup(|n| n.stop_token.clone()))
            .unwrap_or_else(StopToken::never)
    }

    /// The current scheduler, if one was injected.
    #[must_use]
    pub fn scheduler(&self) -> Option<AnyScheduler> {
        self.node
            .as_deref()
            .and_then(|node| node.lookup(|n| n.scheduler.clone()))
    }

    /// The fallback scheduler, if one was injected.
    #[must_use]
    pub fn delegatee_scheduler(&self) -> Option<AnyScheduler> {
        self.node
            .as_deref()
            .and_then(|node| node.lookup(|n| n.delegatee_scheduler.clone()))
    }

    /// The forward-progress guarantee of the current context, if known.
    #[must_use]
    pub fn forward_progress(&self) -> Option<ForwardProgress> {
        self.node
            .as_deref()
            .and_then(|node| node.lookup(|n| n.forward_progress))
    }

    /// The scheduler on which the given channel's completion will arrive,
    /// if known.
    #[must_use]
    pub fn completion_scheduler(&self, channel: Channel) -> Option<AnyScheduler> {
        self.node
            .as_deref()
            .and_then(|node| node.lookup(|n| n.completion_schedulers[channel.index()].clone()))
    }

    /// The customisation domain, if one was injected.
    #[must_use]
    pub fn domain(&self) -> Option<Domain> {
        self.node.as_deref().and_then(|node| node.lookup(|n| n.domain))
    }
}

impl std::fmt::Debug for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Env")
            .field("stop_possible", &self.stop_token().stop_possible())
            .field("has_scheduler", &self.scheduler().is_some())
            .finish_non_exhaustive()
    }
}
