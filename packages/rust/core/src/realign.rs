//! URL-keyed join of the stage outputs.
//!
//! Stages filter independently, so the same row position means different
//! URLs in different stages. The merge keeps exactly the URLs present in all
//! four stage outputs and looks each column up by URL.

use std::collections::HashSet;

use linkdigest_shared::{
    ClusterAssignment, MergedRecord, ParsedText, RecordSet, Summary, Vector,
};

/// Join the four stage outputs on URL.
///
/// Output rows follow `parsed` order. A URL that appears more than once in
/// any input contributes its first occurrence only.
pub fn realign(
    parsed: &RecordSet<ParsedText>,
    summaries: &RecordSet<Summary>,
    vectors: &RecordSet<Vector>,
    clusters: &RecordSet<ClusterAssignment>,
) -> RecordSet<MergedRecord> {
    let summary_index = summaries.index_by_url();
    let vector_index = vectors.index_by_url();
    let cluster_index = clusters.index_by_url();

    let mut seen: HashSet<&str> = HashSet::with_capacity(parsed.len());

    parsed
        .iter()
        .filter(|p| seen.insert(p.url.as_str()))
        .filter_map(|p| {
            let summary = &summaries.records()[*summary_index.get(p.url.as_str())?];
            let vector = &vectors.records()[*vector_index.get(p.url.as_str())?];
            let cluster = &clusters.records()[*cluster_index.get(p.url.as_str())?];

            Some(MergedRecord {
                url: p.url.clone(),
                text: p.text.clone(),
                summary: summary.summary.clone(),
                vector: vector.vector.clone(),
                label: cluster.label,
                topic: cluster.topic.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkdigest_shared::NOISE_LABEL;

    fn parsed(urls: &[&str]) -> RecordSet<ParsedText> {
        urls.iter()
            .map(|u| ParsedText {
                url: u.to_string(),
                text: format!("text {u}"),
            })
            .collect()
    }

    fn summaries(urls: &[&str]) -> RecordSet<Summary> {
        urls.iter()
            .map(|u| Summary {
                url: u.to_string(),
                summary: format!("summary {u}"),
            })
            .collect()
    }

    fn vectors(urls: &[&str]) -> RecordSet<Vector> {
        urls.iter()
            .enumerate()
            .map(|(i, u)| Vector {
                url: u.to_string(),
                vector: vec![i as f64, 1.0],
            })
            .collect()
    }

    fn clusters(pairs: &[(&str, i32)]) -> RecordSet<ClusterAssignment> {
        pairs
            .iter()
            .map(|(u, label)| ClusterAssignment {
                url: u.to_string(),
                label: *label,
                topic: format!("topic {label}"),
            })
            .collect()
    }

    #[test]
    fn joins_by_url_not_position() {
        let p = parsed(&["a", "b", "c", "d"]);
        // "b" filtered out at summarization; later stages are shifted by one.
        let s = summaries(&["c", "a", "d"]);
        let v = vectors(&["d", "c", "a"]);
        let c = clusters(&[("a", 1), ("d", NOISE_LABEL), ("c", 0)]);

        let merged = realign(&p, &s, &v, &c);
        let urls: Vec<&str> = merged.urls().collect();
        assert_eq!(urls, ["a", "c", "d"]);

        let a = merged.get("a").unwrap();
        assert_eq!(a.text, "text a");
        assert_eq!(a.summary, "summary a");
        assert_eq!(a.vector, vec![2.0, 1.0]);
        assert_eq!(a.label, 1);
        assert_eq!(a.topic, "topic 1");

        let d = merged.get("d").unwrap();
        assert_eq!(d.label, NOISE_LABEL);
        assert_eq!(d.vector, vec![0.0, 1.0]);
    }

    #[test]
    fn output_is_within_every_key_set() {
        let p = parsed(&["a", "b", "c"]);
        let s = summaries(&["a", "b"]);
        let v = vectors(&["a", "b"]);
        let c = clusters(&[("b", 0)]);

        let merged = realign(&p, &s, &v, &c);
        assert_eq!(merged.len(), 1);
        assert!(merged.is_subset_of(&p));
        assert!(merged.is_subset_of(&s));
        assert!(merged.is_subset_of(&v));
        assert!(merged.is_subset_of(&c));
    }

    #[test]
    fn every_row_is_built_from_one_url() {
        let p = parsed(&["a", "b", "c", "d", "e"]);
        // Summaries derived from the texts, each stage in its own order.
        let s: RecordSet<Summary> = ["e", "c", "a", "d"]
            .iter()
            .map(|u| Summary {
                url: u.to_string(),
                summary: format!("summary of {}", p.get(u).unwrap().text),
            })
            .collect();
        let v = vectors(&["d", "a", "e", "c"]);
        let c = clusters(&[("c", 2), ("e", 0), ("a", 1), ("d", NOISE_LABEL)]);

        let merged = realign(&p, &s, &v, &c);
        assert_eq!(merged.len(), 4);
        for row in merged.iter() {
            assert_eq!(row.text, format!("text {}", row.url));
            assert_eq!(row.summary, format!("summary of {}", row.text));
            assert_eq!(row.vector, v.get(&row.url).unwrap().vector);
            assert_eq!(row.label, c.get(&row.url).unwrap().label);
        }
    }

    #[test]
    fn empty_stage_yields_empty_merge() {
        let merged = realign(
            &parsed(&["a"]),
            &RecordSet::default(),
            &vectors(&["a"]),
            &clusters(&[("a", 0)]),
        );
        assert!(merged.is_empty());
    }
}
