//! Source routing.
//!
//! The router owns every destination and, per source address, the list of
//! destinations its records go to. Each record first passes the source's own
//! interval gate and field rules, then every destination gets its own copy.

use crate::config::{ConfigError, GatewayConfig, SourceConfig};
use crate::mac_address::WILDCARD;
use crate::record::{FIELD_TIMESTAMP, Record};
use crate::sink::drop::DropSink;
use crate::sink::scan::ScanSink;
use crate::sink::{DROP, Destination, SCAN};
use crate::throttle::{IntervalGate, seconds};
use crate::transform::FieldTransformer;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default)]
struct Route {
    destinations: Vec<String>,
    interval: Duration,
    transformer: FieldTransformer,
}

/// Routing counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub routed: u64,
    pub throttled: u64,
    pub unrouted: u64,
}

pub struct Router {
    routes: HashMap<String, Route>,
    wildcard: Option<Route>,
    destinations: BTreeMap<String, Destination>,
    unconfigured: Vec<String>,
    gate: IntervalGate,
    stats: RouterStats,
}

fn key(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl Router {
    /// Build routes and destinations from `config`.
    ///
    /// In scan mode every address is routed to the built-in `SCAN`
    /// inventory. Otherwise only destinations some source refers to are
    /// configured; a destination that fails to configure is logged and
    /// reported by [`Router::failed_sinks`].
    pub fn new(config: &GatewayConfig) -> Result<Self, ConfigError> {
        let mut router = Self::empty();

        if config.common.scan {
            router.insert_destination(Destination::builtin(
                SCAN,
                Box::new(ScanSink::new(Box::new(io::stdout()))),
            ));
            router.wildcard = Some(Route {
                destinations: vec![key(SCAN)],
                interval: seconds(config.common.interval),
                transformer: FieldTransformer::default(),
            });
            return Ok(router);
        }

        for (mac, source) in &config.sources {
            let route = Self::route(config, mac, source)?;
            if mac == WILDCARD {
                router.wildcard = Some(route);
            } else {
                router.routes.insert(mac.clone(), route);
            }
        }

        let referenced: BTreeSet<String> = router
            .routes
            .values()
            .chain(router.wildcard.iter())
            .flat_map(|route| route.destinations.iter().cloned())
            .collect();

        for name in referenced {
            if router.destinations.contains_key(&name) {
                continue;
            }
            let Some(dest_config) = config.destinations.get(&name) else {
                warn!(destination = %name, "destination is not configured, records for it are dropped");
                continue;
            };
            match Destination::from_config(&name, dest_config) {
                Ok(dest) => {
                    info!(destination = %name, kind = dest.kind(), "destination configured");
                    router.insert_destination(dest);
                }
                Err(e) => {
                    error!(destination = %name, error = %e, "failed to configure destination");
                    router.unconfigured.push(name);
                }
            }
        }

        Ok(router)
    }

    /// A router with no routes and only the `DROP` destination.
    pub fn empty() -> Self {
        let mut destinations = BTreeMap::new();
        destinations.insert(key(DROP), Destination::builtin(DROP, Box::new(DropSink)));
        Self {
            routes: HashMap::new(),
            wildcard: None,
            destinations,
            unconfigured: Vec::new(),
            gate: IntervalGate::new(),
            stats: RouterStats::default(),
        }
    }

    fn route(config: &GatewayConfig, mac: &str, source: &SourceConfig) -> Result<Route, ConfigError> {
        let transformer = source
            .fields
            .transformer()
            .map_err(|message| ConfigError::invalid(format!("sources.{mac}"), message))?;
        Ok(Route {
            destinations: source.destinations.iter().map(|name| key(name)).collect(),
            interval: config.source_interval(source),
            transformer,
        })
    }

    /// Add or replace a destination, looked up by its lower-cased name.
    pub fn insert_destination(&mut self, dest: Destination) {
        self.destinations.insert(key(dest.name()), dest);
    }

    pub fn destination(&self, name: &str) -> Option<&Destination> {
        self.destinations.get(&key(name))
    }

    /// Destination names for `mac`, falling back to the wildcard route.
    pub fn destinations_for(&self, mac: &str) -> &[String] {
        self.routes
            .get(mac)
            .or(self.wildcard.as_ref())
            .map(|route| route.destinations.as_slice())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    /// Route one enriched record. Returns the number of destinations that
    /// accepted a copy.
    pub fn send(&mut self, mut record: Record, now: Instant) -> usize {
        let Some(mac) = record.mac().map(str::to_string) else {
            self.stats.unrouted += 1;
            return 0;
        };
        let Some(route) = self.routes.get(&mac).or(self.wildcard.as_ref()) else {
            debug!(%mac, "no route for source");
            self.stats.unrouted += 1;
            return 0;
        };
        if !self.gate.is_wait_over(&mac, route.interval, now) {
            self.stats.throttled += 1;
            return 0;
        }

        if !record.contains(FIELD_TIMESTAMP) {
            record.set_timestamp(SystemTime::now());
        }
        route.transformer.apply(&mut record);

        let mut accepted = 0;
        for name in &route.destinations {
            if let Some(dest) = self.destinations.get_mut(name)
                && dest.send(record.clone(), now)
            {
                accepted += 1;
            }
        }
        self.stats.routed += 1;
        accepted
    }

    /// Close every destination. Idempotent.
    pub fn close(&mut self) {
        for dest in self.destinations.values_mut() {
            dest.close();
        }
        debug!(
            routed = self.stats.routed,
            throttled = self.stats.throttled,
            unrouted = self.stats.unrouted,
            "router closed"
        );
    }

    /// Names of destinations that failed to configure or to deliver.
    pub fn failed_sinks(&self) -> Vec<String> {
        let mut failed = self.unconfigured.clone();
        failed.extend(
            self.destinations
                .values()
                .filter(|dest| dest.is_failed())
                .map(|dest| dest.name().to_string()),
        );
        failed
    }
}
