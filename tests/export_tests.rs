//! Rarity report contract: top-N listing, ordering, and rarity codes.

use std::sync::Arc;

use ystr_matcher::report::export::{write_json, write_tsv, ExportOptions};
use ystr_matcher::{
    AppConfig, ErrorKind, InMemoryProfileStore, KitId, MarkerMap, PanelSize, Profile, YstrService,
};

fn markers(pairs: &[(&str, String)]) -> MarkerMap {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

/// Query kit Q (R1b) plus 40 subclade relatives and one unrelated I2 kit
fn population() -> Vec<Profile> {
    let mut profiles = vec![Profile::new(
        "Q",
        markers(&[
            ("DYS393", "13".to_string()),
            ("DYS390", "24".to_string()),
            ("DYS531", "11".to_string()),
        ]),
    )
    .with_name("Query")
    .with_haplogroup("R1b")];

    for i in 0..40 {
        profiles.push(
            Profile::new(
                format!("M{i:02}"),
                markers(&[
                    ("DYS393", "14".to_string()),
                    ("DYS390", (24 + i % 3).to_string()),
                ]),
            )
            .with_haplogroup("R1b1a2"),
        );
    }

    profiles.push(
        Profile::new(
            "OTHER",
            markers(&[("DYS393", "13".to_string()), ("DYS390", "24".to_string())]),
        )
        .with_haplogroup("I2"),
    );
    profiles
}

fn service() -> YstrService {
    let store = Arc::new(InMemoryProfileStore::with_profiles(population()));
    YstrService::from_config(store, &AppConfig::default())
}

#[tokio::test]
async fn test_report_lists_top_matches_in_order() {
    let service = service();
    let report = service
        .export(&KitId::from("Q"), &ExportOptions::default())
        .await
        .unwrap();

    assert_eq!(report.meta.query_identifier, KitId::from("Q"));
    assert_eq!(report.meta.panel_label, "Y37");
    assert_eq!(report.meta.total_matches_found, 41);
    assert_eq!(report.meta.matches_included, 30);
    assert_eq!(report.matches.len(), 30);

    // The query kit is part of its own match context
    assert_eq!(report.matches[0].identifier, KitId::from("Q"));
    assert_eq!(report.matches[0].genetic_distance, 0);
    assert!(report
        .matches
        .windows(2)
        .all(|w| w[0].genetic_distance <= w[1].genetic_distance));
    assert!(report.matches.iter().all(|m| m.identifier.as_str() != "OTHER"));

    // DYS531 is outside the 37-marker panel
    assert_eq!(report.markers, vec!["DYS393", "DYS390"]);
    assert!(!report.query_values.contains_key("DYS531"));
}

#[tokio::test]
async fn test_rarity_codes_follow_context_frequency() {
    let service = service();
    let report = service
        .export(&KitId::from("Q"), &ExportOptions::default())
        .await
        .unwrap();

    // 1 of 41 share DYS393=13; 15 of 41 share DYS390=24
    assert_eq!(report.rarity_scores["DYS393"], 4);
    assert_eq!(report.rarity_scores["DYS390"], 0);

    let relative = report
        .matches
        .iter()
        .find(|m| m.identifier.as_str() == "M01")
        .unwrap();
    assert_eq!(relative.genetic_distance, 2);
    assert!((relative.diffs["DYS393"] - 1.0).abs() < f64::EPSILON);
    assert!((relative.diffs["DYS390"] - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_larger_panel_and_smaller_listing() {
    let service = service();
    let options = ExportOptions {
        panel: Some(PanelSize::Y67),
        top_matches: 5,
        ..ExportOptions::default()
    };
    let report = service.export(&KitId::from("Q"), &options).await.unwrap();

    assert_eq!(report.meta.panel_label, "Y67");
    assert_eq!(report.matches.len(), 5);
    assert_eq!(report.markers, vec!["DYS393", "DYS390", "DYS531"]);

    let mut tsv = Vec::new();
    write_tsv(&report, &mut tsv).unwrap();
    let tsv = String::from_utf8(tsv).unwrap();
    let lines: Vec<&str> = tsv.lines().collect();
    assert_eq!(lines.len(), 3 + 5);
    assert!(lines[0].ends_with("DYS393\tDYS390\tDYS531"));
    assert!(lines[1].starts_with("Q\tQuery"));

    let mut json = Vec::new();
    write_json(&report, &mut json).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
    assert_eq!(value["matches"].as_array().map(Vec::len), Some(5));
}

#[tokio::test]
async fn test_unknown_kit_is_not_found() {
    let err = service()
        .export(&KitId::from("NOPE"), &ExportOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
