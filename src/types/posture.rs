//! Posture labels, body regions and the fixed-size per-region map

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ============================================================================
// Posture
// ============================================================================

/// Posture inferred from one heatmap
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PostureLabel {
    #[default]
    Unknown,
    Sitting,
    LeftSide,
    RightSide,
    Supine,
    Prone,
    /// Supine with the left leg raised (left heel unloaded)
    SupineLeftLegRaised,
    /// Supine with the right leg raised (right heel unloaded)
    SupineRightLegRaised,
}

impl PostureLabel {
    pub const ALL: [PostureLabel; 8] = [
        PostureLabel::Unknown,
        PostureLabel::Sitting,
        PostureLabel::LeftSide,
        PostureLabel::RightSide,
        PostureLabel::Supine,
        PostureLabel::Prone,
        PostureLabel::SupineLeftLegRaised,
        PostureLabel::SupineRightLegRaised,
    ];

    /// Stable numeric code stored in pressure logs
    pub fn code(self) -> u8 {
        match self {
            PostureLabel::Unknown => 0,
            PostureLabel::Sitting => 1,
            PostureLabel::LeftSide => 2,
            PostureLabel::RightSide => 3,
            PostureLabel::Supine => 4,
            PostureLabel::Prone => 5,
            PostureLabel::SupineLeftLegRaised => 6,
            PostureLabel::SupineRightLegRaised => 7,
        }
    }

    /// Inverse of [`PostureLabel::code`]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.code() == code)
    }

    /// Body regions expected to bear weight in this posture
    pub fn active_regions(self) -> &'static [BodyRegion] {
        use BodyRegion::*;
        match self {
            PostureLabel::Supine => &[Occiput, Scapula, Hip, RightHeel, LeftHeel],
            PostureLabel::SupineLeftLegRaised => &[Occiput, Scapula, Hip, RightHeel],
            PostureLabel::SupineRightLegRaised => &[Occiput, Scapula, Hip, LeftHeel],
            PostureLabel::Prone => &[Scapula, Hip],
            PostureLabel::LeftSide => &[Scapula, LeftElbow, Hip, LeftHeel],
            PostureLabel::RightSide => &[Scapula, RightElbow, Hip, RightHeel],
            PostureLabel::Sitting => &[Hip],
            PostureLabel::Unknown => &[],
        }
    }

    pub fn is_active(self, region: BodyRegion) -> bool {
        self.active_regions().contains(&region)
    }

    /// Get display name for logs
    pub fn display_name(self) -> &'static str {
        match self {
            PostureLabel::Unknown => "unknown",
            PostureLabel::Sitting => "sitting",
            PostureLabel::LeftSide => "left-side",
            PostureLabel::RightSide => "right-side",
            PostureLabel::Supine => "supine",
            PostureLabel::Prone => "prone",
            PostureLabel::SupineLeftLegRaised => "supine-left-leg-raised",
            PostureLabel::SupineRightLegRaised => "supine-right-leg-raised",
        }
    }
}

impl std::fmt::Display for PostureLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// ============================================================================
// Body regions
// ============================================================================

/// Anatomical region used for duration and threshold accounting
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BodyRegion {
    Occiput,
    Scapula,
    RightElbow,
    LeftElbow,
    Hip,
    RightHeel,
    LeftHeel,
}

impl BodyRegion {
    pub const COUNT: usize = 7;

    pub const ALL: [BodyRegion; Self::COUNT] = [
        BodyRegion::Occiput,
        BodyRegion::Scapula,
        BodyRegion::RightElbow,
        BodyRegion::LeftElbow,
        BodyRegion::Hip,
        BodyRegion::RightHeel,
        BodyRegion::LeftHeel,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Stable name used in logs, alerts and JSON keys
    pub fn name(self) -> &'static str {
        match self {
            BodyRegion::Occiput => "occiput",
            BodyRegion::Scapula => "scapula",
            BodyRegion::RightElbow => "right_elbow",
            BodyRegion::LeftElbow => "left_elbow",
            BodyRegion::Hip => "hip",
            BodyRegion::RightHeel => "right_heel",
            BodyRegion::LeftHeel => "left_heel",
        }
    }

    /// Column prefix used by the remote tables (`relbow`, `lheel`, ...)
    pub fn column_key(self) -> &'static str {
        match self {
            BodyRegion::Occiput => "occiput",
            BodyRegion::Scapula => "scapula",
            BodyRegion::RightElbow => "relbow",
            BodyRegion::LeftElbow => "lelbow",
            BodyRegion::Hip => "hip",
            BodyRegion::RightHeel => "rheel",
            BodyRegion::LeftHeel => "lheel",
        }
    }

    /// Actuation zone number on the relief mattress
    pub fn actuation_zone(self) -> u8 {
        self as u8 + 1
    }
}

impl std::fmt::Display for BodyRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// RegionMap
// ============================================================================

/// One value per body region, always complete
///
/// Serializes as a JSON object keyed by region name. Regions missing on
/// deserialization take `T::default()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionMap<T> {
    values: [T; BodyRegion::COUNT],
}

impl<T: Copy> RegionMap<T> {
    pub fn splat(value: T) -> Self {
        Self { values: [value; BodyRegion::COUNT] }
    }

    pub fn from_fn(mut f: impl FnMut(BodyRegion) -> T) -> Self {
        Self { values: BodyRegion::ALL.map(&mut f) }
    }

    pub fn get(&self, region: BodyRegion) -> T {
        self.values[region.index()]
    }

    pub fn set(&mut self, region: BodyRegion, value: T) {
        self.values[region.index()] = value;
    }

    pub fn iter(&self) -> impl Iterator<Item = (BodyRegion, T)> + '_ {
        BodyRegion::ALL.iter().map(move |&r| (r, self.values[r.index()]))
    }

    pub fn map<U: Copy>(&self, mut f: impl FnMut(BodyRegion, T) -> U) -> RegionMap<U> {
        RegionMap::from_fn(|r| f(r, self.get(r)))
    }
}

impl<T: Copy + Default> Default for RegionMap<T> {
    fn default() -> Self {
        Self::splat(T::default())
    }
}

impl<T: Copy> std::ops::Index<BodyRegion> for RegionMap<T> {
    type Output = T;

    fn index(&self, region: BodyRegion) -> &T {
        &self.values[region.index()]
    }
}

impl<T: Copy> std::ops::IndexMut<BodyRegion> for RegionMap<T> {
    fn index_mut(&mut self, region: BodyRegion) -> &mut T {
        &mut self.values[region.index()]
    }
}

impl<T: Copy + Serialize> Serialize for RegionMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter().map(|(r, v)| (r.name(), v)))
    }
}

impl<'de, T: Copy + Default + Deserialize<'de>> Deserialize<'de> for RegionMap<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<BodyRegion, T>::deserialize(deserializer)?;
        let mut map = Self::default();
        for (region, value) in raw {
            map.set(region, value);
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_posture_codes_round_trip() {
        for posture in PostureLabel::ALL {
            assert_eq!(PostureLabel::from_code(posture.code()), Some(posture));
        }
        assert_eq!(PostureLabel::from_code(42), None);
    }

    #[test]
    fn test_active_region_table() {
        assert!(PostureLabel::Unknown.active_regions().is_empty());
        assert_eq!(PostureLabel::Sitting.active_regions(), &[BodyRegion::Hip]);
        assert!(PostureLabel::Supine.is_active(BodyRegion::LeftHeel));
        assert!(!PostureLabel::SupineLeftLegRaised.is_active(BodyRegion::LeftHeel));
        assert!(!PostureLabel::SupineRightLegRaised.is_active(BodyRegion::RightHeel));
        assert!(PostureLabel::LeftSide.is_active(BodyRegion::LeftElbow));
        assert!(!PostureLabel::LeftSide.is_active(BodyRegion::RightElbow));
    }

    #[test]
    fn test_actuation_zones() {
        let zones: Vec<u8> = BodyRegion::ALL.iter().map(|r| r.actuation_zone()).collect();
        assert_eq!(zones, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_region_map_json_uses_region_names() {
        let mut map = RegionMap::<u64>::default();
        map[BodyRegion::Hip] = 42;
        let json = serde_json::to_value(map).unwrap();
        assert_eq!(json["hip"], 42);
        assert_eq!(json["right_heel"], 0);

        let partial: RegionMap<u64> = serde_json::from_str(r#"{"scapula": 7}"#).unwrap();
        assert_eq!(partial[BodyRegion::Scapula], 7);
        assert_eq!(partial[BodyRegion::Occiput], 0);
    }
}
