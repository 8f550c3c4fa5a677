use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::core::marker::MarkerSet;
use crate::core::profile::Profile;
use crate::core::types::KitId;
use crate::matching::haplogroup::{normalize_haplogroup, HaplogroupFilter};

/// A stored profile together with its parsed marker values
#[derive(Debug, Clone)]
pub struct IndexedProfile {
    pub profile: Profile,
    pub parsed: MarkerSet,
}

impl IndexedProfile {
    pub fn new(profile: Profile) -> Self {
        let parsed = MarkerSet::from_map(&profile.markers);
        Self { profile, parsed }
    }
}

/// The profile population with its lookup indexes
#[derive(Debug, Default)]
pub struct ProfileCatalog {
    /// Kit -> profile, ordered by kit for deterministic scans
    profiles: BTreeMap<KitId, IndexedProfile>,

    /// Index: normalized haplogroup -> kits carrying it
    haplogroup_to_kits: HashMap<String, BTreeSet<KitId>>,
}

impl ProfileCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_profiles(profiles: impl IntoIterator<Item = Profile>) -> Self {
        let mut catalog = Self::new();
        for profile in profiles {
            catalog.insert(profile);
        }
        catalog
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn get(&self, kit: &KitId) -> Option<&IndexedProfile> {
        self.profiles.get(kit)
    }

    pub fn contains(&self, kit: &KitId) -> bool {
        self.profiles.contains_key(kit)
    }

    /// All profiles in kit order
    pub fn iter(&self) -> impl Iterator<Item = &IndexedProfile> {
        self.profiles.values()
    }

    /// Insert or replace a profile, returning the one it replaced
    pub fn insert(&mut self, profile: Profile) -> Option<Profile> {
        let kit = profile.kit_number.clone();
        let previous = self.remove(&kit);

        let key = normalize_haplogroup(&profile.haplogroup);
        if !key.is_empty() {
            self.haplogroup_to_kits
                .entry(key)
                .or_default()
                .insert(kit.clone());
        }
        self.profiles.insert(kit, IndexedProfile::new(profile));

        previous
    }

    pub fn remove(&mut self, kit: &KitId) -> Option<Profile> {
        let removed = self.profiles.remove(kit)?;

        let key = normalize_haplogroup(&removed.profile.haplogroup);
        if let Some(kits) = self.haplogroup_to_kits.get_mut(&key) {
            kits.remove(kit);
            if kits.is_empty() {
                self.haplogroup_to_kits.remove(&key);
            }
        }

        Some(removed.profile)
    }

    /// Distinct normalized haplogroups present in the population
    pub fn haplogroups(&self) -> impl Iterator<Item = &String> {
        self.haplogroup_to_kits.keys()
    }
}

/// Narrows the population to profiles worth scoring for a query
pub struct CandidateFinder<'a> {
    catalog: &'a ProfileCatalog,
}

impl<'a> CandidateFinder<'a> {
    pub fn new(catalog: &'a ProfileCatalog) -> Self {
        Self { catalog }
    }

    /// Candidates admitted by an optional haplogroup filter, in kit order
    pub fn find(&self, filter: Option<&HaplogroupFilter>) -> Vec<&'a IndexedProfile> {
        let Some(filter) = filter else {
            return self.catalog.iter().collect();
        };

        let mut kits: BTreeSet<&KitId> = BTreeSet::new();
        for (haplogroup, members) in &self.catalog.haplogroup_to_kits {
            if filter.matches_normalized(haplogroup) {
                kits.extend(members.iter());
            }
        }

        kits.into_iter()
            .filter_map(|kit| self.catalog.get(kit))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::marker::MarkerMap;

    fn profile(kit: &str, haplogroup: &str) -> Profile {
        let mut markers = MarkerMap::new();
        markers.insert("DYS393".to_string(), "13".to_string());
        Profile::new(kit, markers).with_haplogroup(haplogroup)
    }

    fn kits(found: &[&IndexedProfile]) -> Vec<String> {
        found
            .iter()
            .map(|p| p.profile.kit_number.to_string())
            .collect()
    }

    fn sample_catalog() -> ProfileCatalog {
        ProfileCatalog::from_profiles([
            profile("K3", "R1b1a2"),
            profile("K1", "R1b"),
            profile("K2", "r1b"),
            profile("K4", "I2a"),
            profile("K5", ""),
            profile("K6", "R-M269"),
        ])
    }

    #[test]
    fn test_no_filter_returns_everything_in_kit_order() {
        let catalog = sample_catalog();
        let found = CandidateFinder::new(&catalog).find(None);
        assert_eq!(kits(&found), vec!["K1", "K2", "K3", "K4", "K5", "K6"]);
    }

    #[test]
    fn test_exact_haplogroup() {
        let catalog = sample_catalog();
        let filter = HaplogroupFilter::new("R1B", false).unwrap();
        let found = CandidateFinder::new(&catalog).find(Some(&filter));
        assert_eq!(kits(&found), vec!["K1", "K2"]);
    }

    #[test]
    fn test_subclades() {
        let catalog = sample_catalog();
        let filter = HaplogroupFilter::new("R1b", true).unwrap();
        let found = CandidateFinder::new(&catalog).find(Some(&filter));
        assert_eq!(kits(&found), vec!["K1", "K2", "K3"]);
    }

    #[test]
    fn test_replace_moves_haplogroup_index() {
        let mut catalog = sample_catalog();
        let previous = catalog.insert(profile("K1", "I2a"));
        assert_eq!(previous.unwrap().haplogroup, "R1b");

        let filter = HaplogroupFilter::new("I2a", false).unwrap();
        let found = CandidateFinder::new(&catalog).find(Some(&filter));
        assert_eq!(kits(&found), vec!["K1", "K4"]);
        assert_eq!(catalog.len(), 6);
    }

    #[test]
    fn test_remove_drops_empty_index_entries() {
        let mut catalog = sample_catalog();
        catalog.remove(&KitId::from("K6"));
        assert!(!catalog.haplogroups().any(|h| h == "R-M269"));
        assert!(catalog.remove(&KitId::from("K6")).is_none());
    }
}
