use std::collections::HashSet;

use crate::pubchem::Candidate;
use crate::text::normalize_name;
use crate::types::{ChemicalRecord, ResolutionEntry, ResolutionSource};

/// Merge candidates from several search modes, keeping the first record seen
/// for each identifier.
pub(crate) fn merge_candidates(batches: Vec<Vec<Candidate>>) -> Vec<ChemicalRecord> {
    let mut seen = HashSet::new();
    batches
        .into_iter()
        .flatten()
        .filter(|candidate| seen.insert(candidate.record.identifier.clone()))
        .map(|candidate| candidate.record)
        .collect()
}

/// Turn a candidate list into a resolution.
///
/// One candidate resolves. Among several, the single candidate whose
/// normalized canonical name equals `query` wins; zero or multiple exact
/// matches leave the query ambiguous with every identifier listed.
pub(crate) fn decide(
    query: &str,
    candidates: &[ChemicalRecord],
    source: ResolutionSource,
) -> ResolutionEntry {
    match candidates {
        [] => ResolutionEntry::unresolved(query, source),
        [only] => ResolutionEntry::resolved(query, only, source),
        _ => {
            let mut exact = candidates
                .iter()
                .filter(|candidate| normalize_name(&candidate.canonical_name) == query);
            match (exact.next(), exact.next()) {
                (Some(winner), None) => ResolutionEntry::resolved(query, winner, source),
                _ => ResolutionEntry::ambiguous(
                    query,
                    candidates.iter().map(|c| c.identifier.clone()).collect(),
                    source,
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ResolutionStatus, SearchMode};

    fn record(id: &str, name: &str) -> ChemicalRecord {
        ChemicalRecord::new(id, name)
    }

    #[test]
    fn single_candidate_resolves() {
        let entry = decide("zno", &[record("14806", "Zinc oxide")], ResolutionSource::ExternalApi);
        assert_eq!(entry.status, ResolutionStatus::Resolved);
        assert_eq!(entry.identifier.as_deref(), Some("14806"));
        assert_eq!(entry.canonical_name.as_deref(), Some("Zinc oxide"));
    }

    #[test]
    fn exact_name_breaks_the_tie() {
        let candidates = [
            record("IGZO-LONG", "Indium Gallium Zinc Oxide"),
            record("IGZO-1", "IGZO"),
        ];
        let entry = decide("igzo", &candidates, ResolutionSource::ExternalApi);
        assert_eq!(entry.status, ResolutionStatus::Resolved);
        assert_eq!(entry.identifier.as_deref(), Some("IGZO-1"));
    }

    #[test]
    fn two_exact_matches_stay_ambiguous() {
        let candidates = [record("A", "TMA"), record("B", "tma"), record("C", "trimethylamine")];
        let entry = decide("tma", &candidates, ResolutionSource::ExternalApi);
        assert_eq!(entry.status, ResolutionStatus::Ambiguous);
        assert!(entry.identifier.is_none());
        assert_eq!(entry.candidates, vec!["A", "B", "C"]);
    }

    #[test]
    fn no_exact_match_is_ambiguous() {
        let candidates = [record("A", "alpha"), record("B", "beta")];
        let entry = decide("gamma", &candidates, ResolutionSource::Curated);
        assert_eq!(entry.status, ResolutionStatus::Ambiguous);
        assert_eq!(entry.source, ResolutionSource::Curated);
    }

    #[test]
    fn empty_list_is_unresolved() {
        let entry = decide("water", &[], ResolutionSource::ExternalApi);
        assert_eq!(entry.status, ResolutionStatus::Unresolved);
        assert!(entry.candidates.is_empty());
    }

    #[test]
    fn merge_keeps_first_record_per_identifier() {
        let merged = merge_candidates(vec![
            vec![Candidate::new(record("1", "from name"), SearchMode::Name)],
            vec![
                Candidate::new(record("1", "from formula"), SearchMode::Formula),
                Candidate::new(record("2", "other"), SearchMode::Formula),
            ],
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].canonical_name, "from name");
        assert_eq!(merged[1].identifier, "2");
    }
}
