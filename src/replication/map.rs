//! # Versioned Map-Location Cache
//!
//! Large location collections are bucketed by region and split across three
//! independently versioned tiers: static (cities, buildings), dynamic
//! (camps, grids), persistent (player structures, vendors). Each tier keeps
//! one monotonically increasing version counter, bumped exactly once per
//! mutating batch - never per entry - and strictly after the entries become
//! visible, so a reader can never see a version without its data.
//!
//! A client presents the version it last received per tier; a tier's full
//! region list is returned only when the presented version differs from the
//! current one. Rarely-changing tiers therefore cost nothing to poll, while
//! frequently-changing tiers use the same protocol.
//!
//! Entry ids are dense, 1-based, and scoped to the (tier, region) pair,
//! assigned at append time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use bytes::{Buf, BufMut, BytesMut};
use tracing::{debug, trace};

use crate::core::packet::{application_body, packet_crc, GamePacket};

/// The three location tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapTier {
    Static,
    Dynamic,
    Persistent,
}

impl MapTier {
    pub const ALL: [MapTier; 3] = [MapTier::Static, MapTier::Dynamic, MapTier::Persistent];

    fn index(self) -> usize {
        match self {
            MapTier::Static => 0,
            MapTier::Dynamic => 1,
            MapTier::Persistent => 2,
        }
    }
}

/// One replicated location entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MapLocation {
    /// Dense 1-based id within the (tier, region) bucket.
    pub id: u32,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub category: u8,
    pub subcategory: u8,
    pub active: bool,
}

/// A location before the cache assigns its id.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationSpec {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub category: u8,
    pub subcategory: u8,
    pub active: bool,
}

/// Per-tier versions a client has already seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TierVersions {
    pub static_version: u32,
    pub dynamic_version: u32,
    pub persistent_version: u32,
}

/// Classification of an object template into a tier and category.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingTemplate {
    pub name: String,
    pub tier: MapTier,
    pub category: u8,
    pub subcategory: u8,
}

/// External collaborator mapping template identifiers to map categories.
///
/// A lookup miss means the object is simply not replicated onto the map.
pub trait TemplateCatalog: Send + Sync {
    fn lookup(&self, template: &str) -> Option<MappingTemplate>;
}

type RegionBuckets = RwLock<HashMap<String, Arc<RwLock<Vec<MapLocation>>>>>;

struct TierCache {
    version: AtomicU32,
    regions: RegionBuckets,
}

impl TierCache {
    fn new() -> Self {
        Self {
            version: AtomicU32::new(1),
            regions: RwLock::new(HashMap::new()),
        }
    }

    fn bucket(&self, region: &str) -> Arc<RwLock<Vec<MapLocation>>> {
        if let Ok(regions) = self.regions.read() {
            if let Some(bucket) = regions.get(region) {
                return bucket.clone();
            }
        }
        let mut regions = match self.regions.write() {
            Ok(regions) => regions,
            Err(poisoned) => poisoned.into_inner(),
        };
        regions
            .entry(region.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(Vec::new())))
            .clone()
    }

    fn snapshot(&self, region: &str) -> Vec<MapLocation> {
        let bucket = match self.regions.read() {
            Ok(regions) => regions.get(region).cloned(),
            Err(_) => None,
        };
        match bucket.and_then(|b| b.read().ok().map(|entries| entries.clone())) {
            Some(entries) => entries,
            None => Vec::new(),
        }
    }
}

/// The three-tier versioned location cache.
pub struct MapLocationCache {
    tiers: [TierCache; 3],
}

impl Default for MapLocationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MapLocationCache {
    pub fn new() -> Self {
        Self {
            tiers: [TierCache::new(), TierCache::new(), TierCache::new()],
        }
    }

    /// Append one batch of entries to a (tier, region) bucket.
    ///
    /// Ids are assigned densely from the current bucket length; the tier
    /// version bumps once for the whole batch, after the entries are visible.
    /// Returns the new tier version.
    pub fn append(
        &self,
        tier: MapTier,
        region: &str,
        batch: impl IntoIterator<Item = LocationSpec>,
    ) -> u32 {
        let cache = &self.tiers[tier.index()];
        let bucket = cache.bucket(region);
        {
            let mut entries = match bucket.write() {
                Ok(entries) => entries,
                Err(poisoned) => poisoned.into_inner(),
            };
            for item in batch {
                let id = entries.len() as u32 + 1;
                entries.push(MapLocation {
                    id,
                    name: item.name,
                    x: item.x,
                    y: item.y,
                    category: item.category,
                    subcategory: item.subcategory,
                    active: item.active,
                });
            }
        }
        // Bump strictly after the entries are visible.
        let version = cache.version.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(?tier, region, version, "map tier version bumped");
        version
    }

    /// Current version of one tier.
    pub fn version(&self, tier: MapTier) -> u32 {
        self.tiers[tier.index()].version.load(Ordering::Acquire)
    }

    /// Answer a location request for one region.
    ///
    /// Each tier's entry list is included only when the presented version
    /// differs from the current one; a tier the client is current on is
    /// omitted even if it holds entries.
    pub fn query(&self, region: &str, seen: TierVersions) -> MapLocationsResponse {
        let versions = TierVersions {
            static_version: self.version(MapTier::Static),
            dynamic_version: self.version(MapTier::Dynamic),
            persistent_version: self.version(MapTier::Persistent),
        };

        let tier_if_stale = |tier: MapTier, seen: u32, current: u32| {
            if seen != current {
                Some(self.tiers[tier.index()].snapshot(region))
            } else {
                None
            }
        };

        MapLocationsResponse {
            region: region.to_string(),
            static_locations: tier_if_stale(
                MapTier::Static,
                seen.static_version,
                versions.static_version,
            ),
            dynamic_locations: tier_if_stale(
                MapTier::Dynamic,
                seen.dynamic_version,
                versions.dynamic_version,
            ),
            persistent_locations: tier_if_stale(
                MapTier::Persistent,
                seen.persistent_version,
                versions.persistent_version,
            ),
            versions,
        }
    }

    /// Classify a newly created object and merge it into the right bucket.
    ///
    /// Objects whose template the catalog does not know are not replicated;
    /// that is a data gap, not an error. Returns the new tier version when
    /// the object was recorded.
    pub fn record_object(
        &self,
        template: &str,
        region: &str,
        x: f32,
        y: f32,
        catalog: &dyn TemplateCatalog,
    ) -> Option<u32> {
        let mapping = match catalog.lookup(template) {
            Some(mapping) => mapping,
            None => {
                trace!(template, "no mapping template, object not replicated");
                return None;
            }
        };
        let version = self.append(
            mapping.tier,
            region,
            [LocationSpec {
                name: mapping.name,
                x,
                y,
                category: mapping.category,
                subcategory: mapping.subcategory,
                active: false,
            }],
        );
        Some(version)
    }

    /// Seed the static tier from bootstrap data, one batch per region.
    pub fn seed_static_points(
        &self,
        category: u8,
        points: impl IntoIterator<Item = (String, String, f32, f32)>,
    ) {
        let mut by_region: HashMap<String, Vec<LocationSpec>> = HashMap::new();
        for (region, name, x, y) in points {
            by_region.entry(region).or_default().push(LocationSpec {
                name,
                x,
                y,
                category,
                subcategory: 0,
                active: false,
            });
        }
        for (region, batch) in by_region {
            let count = batch.len();
            self.append(MapTier::Static, &region, batch);
            debug!(region = %region, count, "static map points seeded");
        }
    }
}

// ---------------------------------------------------------------------------
// Wire packets
// ---------------------------------------------------------------------------

/// Inbound request: one region plus the versions the client last saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapLocationsRequest {
    pub region: String,
    pub seen: TierVersions,
}

impl MapLocationsRequest {
    pub const NAME: &'static str = "MapLocationsRequest";

    /// Decoder suitable for [`crate::core::registry::PacketRegistry`].
    pub fn decode(body: &[u8]) -> Option<Box<dyn GamePacket>> {
        let mut rest = body.get(crate::core::packet::MIN_BODY_LEN..)?;
        let region = get_ascii(&mut rest)?;
        if rest.remaining() < 12 {
            return None;
        }
        let seen = TierVersions {
            static_version: rest.get_u32_le(),
            dynamic_version: rest.get_u32_le(),
            persistent_version: rest.get_u32_le(),
        };
        Some(Box::new(MapLocationsRequest { region, seen }))
    }

    /// Encode into a full application body.
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = BytesMut::new();
        put_ascii(&mut payload, &self.region);
        payload.put_u32_le(self.seen.static_version);
        payload.put_u32_le(self.seen.dynamic_version);
        payload.put_u32_le(self.seen.persistent_version);
        application_body(packet_crc(Self::NAME), &payload)
    }
}

impl GamePacket for MapLocationsRequest {
    fn crc(&self) -> u32 {
        packet_crc(Self::NAME)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Outbound response: per-tier entry lists for the tiers that advanced,
/// plus the current versions.
#[derive(Debug, Clone, PartialEq)]
pub struct MapLocationsResponse {
    pub region: String,
    pub static_locations: Option<Vec<MapLocation>>,
    pub dynamic_locations: Option<Vec<MapLocation>>,
    pub persistent_locations: Option<Vec<MapLocation>>,
    pub versions: TierVersions,
}

impl MapLocationsResponse {
    pub const NAME: &'static str = "MapLocationsResponse";

    /// Encode into a full application body.
    ///
    /// An omitted tier ("no update") encodes as an absence flag, not as an
    /// empty list - the client must distinguish "unchanged" from "empty".
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = BytesMut::new();
        put_ascii(&mut payload, &self.region);
        for locations in [
            &self.static_locations,
            &self.dynamic_locations,
            &self.persistent_locations,
        ] {
            match locations {
                Some(entries) => {
                    payload.put_u8(1);
                    payload.put_u32_le(entries.len() as u32);
                    for entry in entries {
                        put_location(&mut payload, entry);
                    }
                }
                None => payload.put_u8(0),
            }
        }
        payload.put_u32_le(self.versions.static_version);
        payload.put_u32_le(self.versions.dynamic_version);
        payload.put_u32_le(self.versions.persistent_version);
        application_body(packet_crc(Self::NAME), &payload)
    }

    /// Decoder suitable for [`crate::core::registry::PacketRegistry`].
    pub fn decode(body: &[u8]) -> Option<Box<dyn GamePacket>> {
        let mut rest = body.get(crate::core::packet::MIN_BODY_LEN..)?;
        let region = get_ascii(&mut rest)?;

        let mut lists = [None, None, None];
        for slot in &mut lists {
            if rest.remaining() < 1 {
                return None;
            }
            if rest.get_u8() == 0 {
                continue;
            }
            if rest.remaining() < 4 {
                return None;
            }
            let count = rest.get_u32_le();
            let mut entries = Vec::with_capacity(count.min(1024) as usize);
            for _ in 0..count {
                entries.push(get_location(&mut rest)?);
            }
            *slot = Some(entries);
        }

        if rest.remaining() < 12 {
            return None;
        }
        let versions = TierVersions {
            static_version: rest.get_u32_le(),
            dynamic_version: rest.get_u32_le(),
            persistent_version: rest.get_u32_le(),
        };
        let [static_locations, dynamic_locations, persistent_locations] = lists;
        Some(Box::new(MapLocationsResponse {
            region,
            static_locations,
            dynamic_locations,
            persistent_locations,
            versions,
        }))
    }
}

impl GamePacket for MapLocationsResponse {
    fn crc(&self) -> u32 {
        packet_crc(Self::NAME)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn put_ascii(out: &mut BytesMut, value: &str) {
    out.put_u16_le(value.len() as u16);
    out.put_slice(value.as_bytes());
}

fn get_ascii(rest: &mut &[u8]) -> Option<String> {
    if rest.remaining() < 2 {
        return None;
    }
    let len = rest.get_u16_le() as usize;
    if rest.remaining() < len {
        return None;
    }
    let value = String::from_utf8(rest[..len].to_vec()).ok()?;
    rest.advance(len);
    Some(value)
}

fn put_location(out: &mut BytesMut, entry: &MapLocation) {
    out.put_u32_le(entry.id);
    put_ascii(out, &entry.name);
    out.put_f32_le(entry.x);
    out.put_f32_le(entry.y);
    out.put_u8(entry.category);
    out.put_u8(entry.subcategory);
    out.put_u8(u8::from(entry.active));
}

fn get_location(rest: &mut &[u8]) -> Option<MapLocation> {
    if rest.remaining() < 4 {
        return None;
    }
    let id = rest.get_u32_le();
    let name = get_ascii(rest)?;
    if rest.remaining() < 11 {
        return None;
    }
    let x = rest.get_f32_le();
    let y = rest.get_f32_le();
    let category = rest.get_u8();
    let subcategory = rest.get_u8();
    let active = rest.get_u8() != 0;
    Some(MapLocation {
        id,
        name,
        x,
        y,
        category,
        subcategory,
        active,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn loc(name: &str) -> LocationSpec {
        LocationSpec {
            name: name.to_string(),
            x: 10.0,
            y: -4.5,
            category: 3,
            subcategory: 0,
            active: false,
        }
    }

    #[test]
    fn batch_append_bumps_version_once() {
        let cache = MapLocationCache::new();
        assert_eq!(cache.version(MapTier::Static), 1);

        let version = cache.append(
            MapTier::Static,
            "tatooine",
            vec![loc("a"), loc("b"), loc("c")],
        );
        assert_eq!(version, 2, "one batch, one bump");
        assert_eq!(cache.version(MapTier::Static), 2);
    }

    #[test]
    fn stale_version_sees_all_entries_with_dense_ids() {
        let cache = MapLocationCache::new();
        cache.append(
            MapTier::Static,
            "tatooine",
            vec![loc("a"), loc("b"), loc("c")],
        );

        let response = cache.query("tatooine", TierVersions {
            static_version: 1,
            dynamic_version: 1,
            persistent_version: 1,
        });
        let entries = response.static_locations.expect("stale tier included");
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries.iter().map(|e| e.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        // Untouched tiers are current (version 1) and therefore omitted.
        assert!(response.dynamic_locations.is_none());
        assert!(response.persistent_locations.is_none());
    }

    #[test]
    fn current_version_sees_no_update() {
        let cache = MapLocationCache::new();
        cache.append(
            MapTier::Static,
            "tatooine",
            vec![loc("a"), loc("b"), loc("c")],
        );

        let response = cache.query("tatooine", TierVersions {
            static_version: 2,
            dynamic_version: 1,
            persistent_version: 1,
        });
        assert!(
            response.static_locations.is_none(),
            "entries exist but the client is current"
        );
        assert_eq!(response.versions.static_version, 2);
    }

    #[test]
    fn ids_are_scoped_per_tier_and_region() {
        let cache = MapLocationCache::new();
        cache.append(MapTier::Static, "naboo", vec![loc("a"), loc("b")]);
        cache.append(MapTier::Dynamic, "naboo", vec![loc("c")]);
        cache.append(MapTier::Static, "corellia", vec![loc("d")]);

        let naboo = cache.query("naboo", TierVersions::default());
        assert_eq!(
            naboo.static_locations.unwrap().last().unwrap().id,
            2
        );
        assert_eq!(naboo.dynamic_locations.unwrap()[0].id, 1);
        let corellia = cache.query("corellia", TierVersions::default());
        assert_eq!(corellia.static_locations.unwrap()[0].id, 1);
    }

    #[test]
    fn tier_versions_are_independent() {
        let cache = MapLocationCache::new();
        cache.append(MapTier::Dynamic, "naboo", vec![loc("camp")]);
        assert_eq!(cache.version(MapTier::Static), 1);
        assert_eq!(cache.version(MapTier::Dynamic), 2);
        assert_eq!(cache.version(MapTier::Persistent), 1);
    }

    #[test]
    fn unknown_region_with_stale_version_is_empty_list() {
        let cache = MapLocationCache::new();
        let response = cache.query("hoth", TierVersions {
            static_version: 99,
            dynamic_version: 1,
            persistent_version: 1,
        });
        assert_eq!(response.static_locations.unwrap().len(), 0);
    }

    struct FixedCatalog;

    impl TemplateCatalog for FixedCatalog {
        fn lookup(&self, template: &str) -> Option<MappingTemplate> {
            (template == "object/building/cantina").then(|| MappingTemplate {
                name: "Cantina".to_string(),
                tier: MapTier::Persistent,
                category: 7,
                subcategory: 2,
            })
        }
    }

    #[test]
    fn record_object_classifies_into_tier() {
        let cache = MapLocationCache::new();
        let version = cache
            .record_object("object/building/cantina", "tatooine", 3.0, 4.0, &FixedCatalog)
            .expect("known template replicates");
        assert_eq!(version, 2);

        let response = cache.query("tatooine", TierVersions::default());
        let entries = response.persistent_locations.unwrap();
        assert_eq!(entries[0].name, "Cantina");
        assert_eq!(entries[0].category, 7);
    }

    #[test]
    fn unknown_template_is_not_replicated() {
        let cache = MapLocationCache::new();
        let version =
            cache.record_object("object/unmapped", "tatooine", 0.0, 0.0, &FixedCatalog);
        assert!(version.is_none());
        assert_eq!(cache.version(MapTier::Static), 1);
        assert_eq!(cache.version(MapTier::Persistent), 1);
    }

    #[test]
    fn seed_groups_points_by_region() {
        let cache = MapLocationCache::new();
        cache.seed_static_points(
            5,
            vec![
                ("tatooine".to_string(), "Mos Eisley".to_string(), 1.0, 2.0),
                ("tatooine".to_string(), "Anchorhead".to_string(), 3.0, 4.0),
                ("naboo".to_string(), "Theed".to_string(), 5.0, 6.0),
            ],
        );

        let tatooine = cache.query("tatooine", TierVersions::default());
        assert_eq!(tatooine.static_locations.unwrap().len(), 2);
        let naboo = cache.query("naboo", TierVersions::default());
        assert_eq!(naboo.static_locations.unwrap().len(), 1);
        // Two regions, two batches.
        assert_eq!(cache.version(MapTier::Static), 3);
    }

    #[test]
    fn request_packet_roundtrip() {
        let request = MapLocationsRequest {
            region: "tatooine".to_string(),
            seen: TierVersions {
                static_version: 4,
                dynamic_version: 9,
                persistent_version: 2,
            },
        };
        let body = request.encode();
        let decoded = MapLocationsRequest::decode(&body).unwrap();
        let decoded = decoded
            .as_any()
            .downcast_ref::<MapLocationsRequest>()
            .unwrap();
        assert_eq!(decoded, &request);
    }

    #[test]
    fn response_packet_roundtrip_preserves_no_update() {
        let response = MapLocationsResponse {
            region: "naboo".to_string(),
            static_locations: Some(vec![MapLocation {
                id: 1,
                name: "Theed".to_string(),
                x: 1.5,
                y: -2.5,
                category: 5,
                subcategory: 0,
                active: true,
            }]),
            dynamic_locations: None,
            persistent_locations: Some(vec![]),
            versions: TierVersions {
                static_version: 2,
                dynamic_version: 1,
                persistent_version: 7,
            },
        };
        let body = response.encode();
        let decoded = MapLocationsResponse::decode(&body).unwrap();
        let decoded = decoded
            .as_any()
            .downcast_ref::<MapLocationsResponse>()
            .unwrap();
        assert_eq!(decoded, &response);
    }

    #[test]
    fn truncated_request_yields_none() {
        let request = MapLocationsRequest {
            region: "tatooine".to_string(),
            seen: TierVersions::default(),
        };
        let body = request.encode();
        assert!(MapLocationsRequest::decode(&body[..body.len() - 2]).is_none());
    }
}
