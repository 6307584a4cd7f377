mod support;

use pbir_report::{
    remove_measures, sanitize_report, CollectSink, MeasureRemoval, NoProgress, PbirError,
    ProgressEvent, SanitizeAction,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use support::{card, hidden, navigator, Fixture};

fn run(fixture: &Fixture, action: SanitizeAction) -> pbir_report::ActionReport {
    action
        .run(fixture.root(), false, &mut NoProgress)
        .expect("action runs")
}

fn measure_names(fixture: &Fixture) -> Vec<String> {
    fixture.read("reportExtensions.json")["entities"][0]["measures"]
        .as_array()
        .map(|measures| {
            measures
                .iter()
                .filter_map(|m| m["name"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// A report exercising every sanitize action at once.
fn messy_report() -> Fixture {
    let fixture = Fixture::new();
    fixture.write(
        "report.json",
        &json!({"publicCustomVisuals": ["chordChart", "sankey"]}),
    );
    fixture.measures(
        "Sales",
        &[
            ("Base", "SUM(Sales[Amount])"),
            ("Double", "[Base] * 2"),
            ("Orphan", "COUNTROWS(Sales)"),
        ],
    );
    fixture.pages(&["Overview", "Tip", "Blank"], "Tip");
    fixture.page("Overview", json!({"name": "Overview", "displayName": "Overview"}));
    fixture.visual("Overview", "c1", card("c1", "Sales", "Double"));
    fixture.visual(
        "Overview",
        "s1",
        json!({"name": "s1", "visual": {"visualType": "sankey", "query": {"showAll": true}}}),
    );
    fixture.visual("Overview", "h1", hidden(card("h1", "Sales", "Base")));
    fixture.page(
        "Tip",
        json!({"name": "Tip", "displayName": "Tip", "pageBinding": {"type": "Tooltip"}}),
    );
    fixture.visual("Tip", "t1", card("t1", "Sales", "Base"));
    fixture.empty_page("Blank");
    fixture.write(
        "bookmarks/bookmarks.json",
        &json!({"items": [{"name": "Kept"}, {"name": "Gone"}]}),
    );
    fixture.bookmark("Kept", "Overview", json!({"c1": {}}));
    fixture.bookmark("Gone", "Missing", json!({}));
    fixture.visual(
        "Overview",
        "link",
        json!({"name": "link", "visual": {
            "visualType": "actionButton",
            "visualContainerObjects": {"visualLink": [{"properties": {
                "bookmark": {"expr": {"Literal": {"Value": "'Kept'"}}}
            }}]}
        }}),
    );
    fixture
}

#[test]
fn measures_used_through_dependents_are_retained() {
    let fixture = Fixture::new();
    fixture.measures(
        "Sales",
        &[
            ("MeasureA", "SUM(Sales[Amount])"),
            ("MeasureB", "[MeasureA] * 2"),
            ("MeasureC", "COUNTROWS(Sales)"),
        ],
    );
    fixture.visual("Page1", "card1", card("card1", "Sales", "MeasureB"));

    let report = run(&fixture, SanitizeAction::RemoveUnusedMeasures);
    assert!(report.changed);
    assert_eq!(report.details, vec!["Removed measure: MeasureC".to_string()]);
    assert_eq!(measure_names(&fixture), vec!["MeasureA", "MeasureB"]);
}

#[test]
fn named_measure_removal_can_skip_usage_checks() {
    let fixture = Fixture::new();
    fixture.measures("Sales", &[("Used", "1"), ("Other", "2")]);
    fixture.visual("Page1", "card1", card("card1", "Sales", "Used"));

    let guarded = MeasureRemoval {
        names: Some(vec!["Used".to_string()]),
        check_visual_usage: true,
    };
    assert!(!remove_measures(fixture.root(), &guarded, false).unwrap().changed);

    let forced = MeasureRemoval {
        check_visual_usage: false,
        ..guarded
    };
    assert!(remove_measures(fixture.root(), &forced, false).unwrap().changed);
    assert_eq!(measure_names(&fixture), vec!["Other"]);
}

#[test]
fn empty_bookmark_group_literal_exposes_every_bookmark() {
    for literal in [Some("''"), None] {
        let fixture = Fixture::new();
        fixture.visual("Page1", "nav", navigator("nav", literal));
        fixture.write(
            "bookmarks/bookmarks.json",
            &json!({"items": [{"name": "A"}, {"name": "G", "children": ["B"]}]}),
        );
        fixture.bookmark("A", "Page1", json!({}));
        fixture.bookmark("B", "Page1", json!({}));

        let report = run(&fixture, SanitizeAction::RemoveUnusedBookmarks);
        assert!(!report.changed, "literal {literal:?}: {:?}", report.details);
        assert!(fixture.exists("bookmarks/A.bookmark.json"));
        assert!(fixture.exists("bookmarks/B.bookmark.json"));
    }
}

#[test]
fn navigator_with_an_empty_bookmarks_list_exposes_every_bookmark() {
    let fixture = Fixture::new();
    fixture.visual(
        "Page1",
        "nav",
        json!({
            "name": "nav",
            "visual": {"visualType": "bookmarkNavigator", "objects": {"bookmarks": []}}
        }),
    );
    fixture.write(
        "bookmarks/bookmarks.json",
        &json!({"items": [{"name": "A"}, {"name": "B"}]}),
    );
    fixture.bookmark("A", "Page1", json!({}));
    fixture.bookmark("B", "Page1", json!({}));

    let report = run(&fixture, SanitizeAction::RemoveUnusedBookmarks);
    assert!(!report.changed, "{:?}", report.details);
    assert!(fixture.exists("bookmarks/A.bookmark.json"));
    assert!(fixture.exists("bookmarks/B.bookmark.json"));
}

#[test]
fn navigator_bound_to_a_group_keeps_only_that_group() {
    let fixture = Fixture::new();
    fixture.visual("Page1", "nav", navigator("nav", Some("'G'")));
    fixture.write(
        "bookmarks/bookmarks.json",
        &json!({"items": [{"name": "A"}, {"name": "G", "children": ["B", "C"]}]}),
    );
    for name in ["A", "B", "C"] {
        fixture.bookmark(name, "Page1", json!({}));
    }

    let report = run(&fixture, SanitizeAction::RemoveUnusedBookmarks);
    assert!(report.changed);
    assert_eq!(
        fixture.read("bookmarks/bookmarks.json")["items"],
        json!([{"name": "G", "children": ["B", "C"]}])
    );
    assert!(!fixture.exists("bookmarks/A.bookmark.json"));
    assert!(fixture.exists("bookmarks/C.bookmark.json"));
}

#[test]
fn unused_bookmarks_folder_is_removed_entirely() {
    let fixture = Fixture::new();
    fixture.visual("Page1", "c1", card("c1", "Sales", "Total"));
    fixture.write("bookmarks/bookmarks.json", &json!({"items": [{"name": "A"}]}));
    fixture.bookmark("A", "Page1", json!({}));

    assert!(run(&fixture, SanitizeAction::RemoveUnusedBookmarks).changed);
    assert!(!fixture.exists("bookmarks"));
}

#[test]
fn empty_pages_and_rogue_folders_are_removed() {
    let fixture = Fixture::new();
    fixture.pages(&["Page1", "Page2"], "Page2");
    fixture.page("Page1", json!({"name": "Page1"}));
    fixture.visual("Page1", "v1", card("v1", "Sales", "Total"));
    fixture.empty_page("Page2");
    fixture.empty_page("Rogue");

    let report = run(&fixture, SanitizeAction::RemoveEmptyPages);
    assert!(report.changed);
    assert_eq!(
        fixture.read("pages/pages.json"),
        json!({"pageOrder": ["Page1"], "activePageName": "Page1"})
    );
    assert!(!fixture.exists("pages/Page2"));
    assert!(!fixture.exists("pages/Rogue"));
    assert!(fixture.exists("pages/Page1/visuals/v1/visual.json"));
}

#[test]
fn hidden_visual_and_its_interactions_are_removed() {
    let fixture = Fixture::new();
    fixture.page(
        "Page1",
        json!({
            "name": "Page1",
            "visualInteractions": [
                {"source": "V", "target": "W", "type": "NoFilter"},
                {"source": "W", "target": "V", "type": "NoFilter"},
                {"source": "W", "target": "X", "type": "NoFilter"}
            ]
        }),
    );
    fixture.visual("Page1", "V", hidden(card("V", "Sales", "Total")));
    fixture.visual("Page1", "W", card("W", "Sales", "Total"));
    fixture.visual("Page1", "X", hidden(card("X", "Sales", "Total")));
    fixture.bookmark("Show X", "Page1", json!({"X": {}, "V": {"singleVisual": {"display": {"mode": "hidden"}}}}));

    let report = run(&fixture, SanitizeAction::RemoveHiddenVisualsNeverShown);
    assert!(report.changed);
    assert!(!fixture.exists("pages/Page1/visuals/V"));
    assert!(fixture.exists("pages/Page1/visuals/X/visual.json"));
    assert_eq!(
        fixture.read("pages/Page1/page.json")["visualInteractions"],
        json!([{"source": "W", "target": "X", "type": "NoFilter"}])
    );
    assert_eq!(
        fixture.read("bookmarks/Show X.bookmark.json")
            .pointer("/explorationState/sections/Page1/visualContainers"),
        Some(&json!({"X": {}}))
    );
}

#[test]
fn every_action_is_idempotent() {
    let fixture = messy_report();
    for action in SanitizeAction::ALL {
        run(&fixture, action);
        let second = run(&fixture, action);
        assert!(
            !second.changed,
            "{action} changed the report twice: {:?}",
            second.details
        );
    }
}

#[test]
fn full_sanitize_then_dry_run_reports_nothing() {
    let fixture = messy_report();
    let all: Vec<&str> = SanitizeAction::ALL.iter().map(|a| a.as_str()).collect();

    let summary = sanitize_report(fixture.root(), &all, false, &mut NoProgress).unwrap();
    assert!(summary.changed());
    assert!(summary.failed.is_empty());

    let pages = fixture.read("pages/pages.json");
    assert_eq!(pages["pageOrder"], json!(["Overview", "Tip"]));
    assert_eq!(pages["activePageName"], json!("Overview"));
    assert_eq!(
        fixture.read("pages/Tip/page.json")["visibility"],
        json!("HiddenInViewMode")
    );
    assert_eq!(
        fixture.read("report.json")["publicCustomVisuals"],
        json!(["sankey"])
    );
    assert_eq!(
        fixture.read("pages/Overview/visuals/s1/visual.json")
            .pointer("/visual/query"),
        Some(&json!({}))
    );
    assert!(!fixture.exists("pages/Overview/visuals/h1"));
    assert!(!fixture.exists("bookmarks/Gone.bookmark.json"));
    assert_eq!(measure_names(&fixture), vec!["Base", "Double"]);

    let again = sanitize_report(fixture.root(), &all, true, &mut NoProgress).unwrap();
    assert!(!again.changed(), "{:?}", again.reports);
}

#[test]
fn dry_run_leaves_every_file_untouched() {
    let fixture = messy_report();
    let before = fixture.snapshot();
    let all: Vec<&str> = SanitizeAction::ALL.iter().map(|a| a.as_str()).collect();

    let summary = sanitize_report(fixture.root(), &all, true, &mut NoProgress).unwrap();
    assert!(summary.dry_run);
    assert!(summary.changed());
    assert!(summary
        .reports
        .iter()
        .flat_map(|report| &report.details)
        .any(|detail| detail.starts_with("Would remove")));
    assert_eq!(fixture.snapshot(), before);
}

#[test]
fn unknown_actions_are_skipped_and_the_rest_still_run() {
    let fixture = Fixture::new();
    fixture.pages(&["Page1", "Page2"], "Page2");
    fixture.visual("Page1", "v1", card("v1", "Sales", "Total"));
    fixture.visual("Page2", "v2", card("v2", "Sales", "Total"));

    let mut sink = CollectSink::new();
    let summary = sanitize_report(
        fixture.root(),
        &["polish_everything", "set_first_page_as_active"],
        false,
        &mut sink,
    )
    .unwrap();

    assert_eq!(summary.skipped, vec!["polish_everything".to_string()]);
    assert!(summary
        .report(SanitizeAction::SetFirstPageAsActive)
        .is_some_and(|report| report.changed));
    assert_eq!(fixture.read("pages/pages.json")["activePageName"], json!("Page1"));
    assert!(sink.events().iter().any(|event| matches!(
        event,
        ProgressEvent::Skipped { action, .. } if action == "polish_everything"
    )));
}

#[test]
fn malformed_visual_is_skipped_not_fatal() {
    let fixture = Fixture::new();
    fixture.visual("Page1", "ok", json!({"name": "ok", "visual": {"showAll": true}}));
    let broken = fixture.path("pages/Page1/visuals/broken/visual.json");
    std::fs::create_dir_all(broken.parent().unwrap()).unwrap();
    std::fs::write(&broken, "{ not json").unwrap();

    let report = run(&fixture, SanitizeAction::DisableShowItemsWithNoData);
    assert!(report.changed);
    assert_eq!(
        fixture.read("pages/Page1/visuals/ok/visual.json"),
        json!({"name": "ok", "visual": {}})
    );
    assert_eq!(std::fs::read_to_string(&broken).unwrap(), "{ not json");
}

#[test]
fn sanitizing_a_plain_folder_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = sanitize_report(dir.path(), &["remove_empty_pages"], false, &mut NoProgress)
        .unwrap_err();
    assert!(matches!(err, PbirError::NotAReport { .. }));
}

#[test]
fn bookmark_cleanup_prunes_dangling_references() {
    let fixture = Fixture::new();
    fixture.visual("Page1", "v1", card("v1", "Sales", "Total"));
    fixture.write(
        "bookmarks/bookmarks.json",
        &json!({"items": [
            {"name": "Good"},
            {"name": "Group", "children": ["Stale"]}
        ]}),
    );
    fixture.bookmark("Good", "Page1", json!({"v1": {}, "ghost": {}}));
    fixture.bookmark("Stale", "Deleted", json!({}));

    let report = run(&fixture, SanitizeAction::CleanupInvalidBookmarks);
    assert!(report.changed);
    assert!(!fixture.exists("bookmarks/Stale.bookmark.json"));
    assert_eq!(
        fixture.read("bookmarks/bookmarks.json")["items"],
        json!([{"name": "Good"}])
    );
    let good: Value = fixture.read("bookmarks/Good.bookmark.json");
    assert_eq!(
        good.pointer("/explorationState/sections/Page1/visualContainers"),
        Some(&json!({"v1": {}}))
    );
}
