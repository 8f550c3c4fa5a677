//! Haplogroup filtering.
//!
//! Labels compare case-insensitively after trimming. Longhand labels
//! (`R1b1a2`) encode their ancestry in their prefix, so with subclades enabled
//! `R1b` also admits `R1b1a2`. SNP-style labels (`R-M269`) carry no such
//! structure and only ever match themselves.

/// Normalized form used for comparison and indexing
#[must_use]
pub fn normalize_haplogroup(label: &str) -> String {
    label.trim().to_ascii_uppercase()
}

/// Whether a haplogroup label uses the SNP-style `<letter>-<snp>` notation
fn is_snp_style(normalized: &str) -> bool {
    normalized.contains('-')
}

/// A resolved haplogroup restriction for one query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaplogroupFilter {
    label: String,
    include_subclades: bool,
}

impl HaplogroupFilter {
    /// Build a filter; blank labels mean "no filter"
    #[must_use]
    pub fn new(label: &str, include_subclades: bool) -> Option<Self> {
        let label = normalize_haplogroup(label);
        if label.is_empty() {
            return None;
        }
        Some(Self {
            label,
            include_subclades,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Test an already-normalized candidate label
    pub fn matches_normalized(&self, candidate: &str) -> bool {
        if candidate == self.label {
            return true;
        }
        self.include_subclades && !is_snp_style(&self.label) && candidate.starts_with(&self.label)
    }

    /// Test a raw candidate label
    pub fn matches(&self, candidate: &str) -> bool {
        self.matches_normalized(&normalize_haplogroup(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_is_case_insensitive() {
        let filter = HaplogroupFilter::new(" r1b ", false).unwrap();
        assert!(filter.matches("R1b"));
        assert!(!filter.matches("R1b1a2"));
    }

    #[test]
    fn test_subclades_by_prefix() {
        let filter = HaplogroupFilter::new("R1b", true).unwrap();
        assert!(filter.matches("R1b"));
        assert!(filter.matches("R1b1a2a1"));
        assert!(!filter.matches("R1a1"));
        assert!(!filter.matches("I2"));
    }

    #[test]
    fn test_snp_style_only_matches_itself() {
        let filter = HaplogroupFilter::new("R-M269", true).unwrap();
        assert!(filter.matches("r-m269"));
        assert!(!filter.matches("R-M2691"));
    }

    #[test]
    fn test_blank_label_is_no_filter() {
        assert!(HaplogroupFilter::new("   ", true).is_none());
    }
}
