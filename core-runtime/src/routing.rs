//! # Routing Engine
//!
//! Maps `(provider, level, keywords)` emissions to the sinks that want
//! them. The manager rebuilds the table on every configuration change and
//! swaps it in behind an `Arc`, so the emission path works against an
//! immutable snapshot: an emission observes exactly one configuration.
//!
//! Each provider entry also carries an aggregate of its subscriptions (the
//! most verbose admitted level and the union of keyword masks), which
//! drives the provider-side early-out: a provider asks
//! [`RoutingTable::is_provider_enabled`] before paying for event
//! construction.

use core_events::{Level, Subscription, TraceEvent};
use core_sinks::Sink;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

struct RouteTarget {
    sink: Arc<Sink>,
    subscription: Subscription,
}

struct ProviderRoutes {
    targets: Vec<RouteTarget>,
    /// Most verbose level any subscription admits.
    max_level: Level,
    /// Union of all keyword masks.
    keyword_union: u64,
    /// Whether some subscription admits every keyword.
    admits_all_keywords: bool,
}

/// Immutable dispatch table built from the installed sinks.
#[derive(Default)]
pub struct RoutingTable {
    providers: HashMap<Uuid, ProviderRoutes>,
}

impl RoutingTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a table from `(sink, subscriptions)` pairs. Subscriptions
    /// that fail to resolve a provider identity are skipped; validation
    /// happened at configuration time.
    pub fn build<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a Arc<Sink>, &'a [Subscription])>,
    {
        let mut providers: HashMap<Uuid, ProviderRoutes> = HashMap::new();

        for (sink, subscriptions) in entries {
            for subscription in subscriptions {
                let provider_id = match subscription.resolved_id() {
                    Ok(id) => id,
                    Err(_) => continue,
                };
                let routes = providers.entry(provider_id).or_insert(ProviderRoutes {
                    targets: Vec::new(),
                    max_level: Level::Critical,
                    keyword_union: 0,
                    admits_all_keywords: false,
                });
                routes.max_level = routes.max_level.max(subscription.min_level);
                routes.keyword_union |= subscription.keywords;
                routes.admits_all_keywords |= subscription.keywords == 0;
                routes.targets.push(RouteTarget {
                    sink: Arc::clone(sink),
                    subscription: subscription.clone(),
                });
            }
        }

        Self { providers }
    }

    /// Provider-side early-out: whether any subscription on this provider
    /// could admit an event at the given level and keywords.
    pub fn is_provider_enabled(&self, provider_id: Uuid, level: Level, keywords: u64) -> bool {
        match self.providers.get(&provider_id) {
            Some(routes) => {
                level <= routes.max_level
                    && (routes.admits_all_keywords || (routes.keyword_union & keywords) != 0)
            }
            None => false,
        }
    }

    /// The sinks admitting this event, deduplicated: a sink with several
    /// admitting subscriptions still receives the event once.
    pub fn route<'a>(&'a self, event: &TraceEvent) -> Vec<&'a Arc<Sink>> {
        let routes = match self.providers.get(&event.provider_id()) {
            Some(routes) => routes,
            None => return Vec::new(),
        };

        let mut admitted: Vec<&Arc<Sink>> = Vec::new();
        for target in &routes.targets {
            if !target.subscription.admits(event.level(), event.keywords()) {
                continue;
            }
            let sink_ptr = Arc::as_ptr(&target.sink);
            if admitted.iter().any(|s| Arc::as_ptr(s) == sink_ptr) {
                continue;
            }
            admitted.push(&target.sink);
        }
        admitted
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for RoutingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingTable")
            .field("providers", &self.providers.len())
            .finish()
    }
}
