//! Package selection as a pure function
//!
//! The prompt itself lives in the CLI; these helpers only map between the
//! candidate list, the stored overrides and the user's picks.

use super::PreferenceRecord;
use std::collections::BTreeSet;

/// Candidates that should start out checked in a selection prompt
pub fn initial_selection(
    candidates: &BTreeSet<String>,
    defaults: &BTreeSet<String>,
    current: &PreferenceRecord,
) -> BTreeSet<String> {
    current
        .packages_to_include(defaults)
        .intersection(candidates)
        .cloned()
        .collect()
}

/// Turn the user's picks into a replacement record.
///
/// Picked candidates are included, unpicked candidates excluded. Overrides
/// for names outside the candidate list are carried over untouched.
pub fn choose(
    candidates: &BTreeSet<String>,
    current: &PreferenceRecord,
    picked: &BTreeSet<String>,
) -> PreferenceRecord {
    let mut next = PreferenceRecord {
        include: current.include.difference(candidates).cloned().collect(),
        exclude: current.exclude.difference(candidates).cloned().collect(),
    };

    for name in candidates {
        if picked.contains(name) {
            next.include.insert(name.clone());
        } else {
            next.exclude.insert(name.clone());
        }
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn initial_selection_reflects_resolved_set() {
        let candidates = names(&["A", "B", "C"]);
        let defaults = names(&["A", "B"]);
        let mut current = PreferenceRecord::default();
        current.remove("B");
        current.add("C");

        assert_eq!(
            initial_selection(&candidates, &defaults, &current),
            names(&["A", "C"])
        );
    }

    #[test]
    fn choose_partitions_candidates() {
        let candidates = names(&["A", "B", "C"]);
        let next = choose(&candidates, &PreferenceRecord::default(), &names(&["A", "C"]));

        assert_eq!(next.include, names(&["A", "C"]));
        assert_eq!(next.exclude, names(&["B"]));
    }

    #[test]
    fn choose_keeps_foreign_overrides() {
        let candidates = names(&["A", "B"]);
        let mut current = PreferenceRecord::default();
        current.add("Extra");
        current.remove("Gone");
        current.add("A");

        let next = choose(&candidates, &current, &names(&["B"]));

        assert_eq!(next.include, names(&["B", "Extra"]));
        assert_eq!(next.exclude, names(&["A", "Gone"]));
        assert!(next.include.is_disjoint(&next.exclude));
    }

    #[test]
    fn choose_ignores_picks_outside_candidates() {
        let candidates = names(&["A"]);
        let next = choose(&candidates, &PreferenceRecord::default(), &names(&["A", "Z"]));
        assert_eq!(next.include, names(&["A"]));
        assert!(next.exclude.is_empty());
    }
}
