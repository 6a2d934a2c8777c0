//! Weighted detail-level profiles for multi-resolution sphere queries
//!
//! A profile such as `"L1=1,L2=2"` splits a query radius across levels: each level
//! is queried out to the radius reached by the running total of weights so far,
//! so the spheres are nested rather than disjoint bands.

/// One `name=weight` segment of a profile
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfileEntry {
    pub name: String,
    pub weight: i32,
}

/// Parse a comma separated `name=weight` list. Segments without `=`, with an
/// empty name or a non-integer weight are skipped.
pub fn parse_profile(profile: &str) -> Vec<ProfileEntry> {
    profile
        .split(',')
        .filter_map(|segment| {
            let (name, weight) = segment.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let weight = weight.trim().parse().ok()?;
            Some(ProfileEntry { name: name.to_string(), weight })
        })
        .collect()
}

/// Radius allotted to each entry: `radius * (w1 + .. + wi) / sum(w)`.
/// Empty when the weights do not sum to a positive total.
pub fn allocate_radii(entries: &[ProfileEntry], radius: f32) -> Vec<(&str, f32)> {
    let total: i64 = entries.iter().map(|e| e.weight as i64).sum();
    if total <= 0 {
        return Vec::new();
    }

    let unit = radius / total as f32;
    let mut running = 0i64;
    entries
        .iter()
        .map(|entry| {
            running += entry.weight as i64;
            (entry.name.as_str(), running as f32 * unit)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, weight: i32) -> ProfileEntry {
        ProfileEntry { name: name.to_string(), weight }
    }

    #[test]
    fn test_parse() {
        assert_eq!(parse_profile("L1=1,L2=2"), vec![entry("L1", 1), entry("L2", 2)]);
        assert_eq!(parse_profile(" L0 = 3 "), vec![entry("L0", 3)]);
    }

    #[test]
    fn test_malformed_segments_skipped() {
        let parsed = parse_profile("L1=1,L2,L3=x,=4,L4=2.5,,L5=-1");
        assert_eq!(parsed, vec![entry("L1", 1), entry("L5", -1)]);
        assert!(parse_profile("").is_empty());
    }

    #[test]
    fn test_cumulative_radii() {
        let entries = parse_profile("L1=1,L2=2");
        let radii = allocate_radii(&entries, 30.0);
        assert_eq!(radii, vec![("L1", 10.0), ("L2", 30.0)]);
    }

    #[test]
    fn test_non_positive_total() {
        assert!(allocate_radii(&parse_profile("L1=0,L2=0"), 30.0).is_empty());
        assert!(allocate_radii(&parse_profile("L1=1,L2=-3"), 30.0).is_empty());
        assert!(allocate_radii(&[], 30.0).is_empty());
    }
}
