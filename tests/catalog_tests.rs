use chrono::NaiveDate;
use frostline::catalog::CatalogError;
use frostline::calendar::SeasonalAnchor;
use frostline::{Priority, Recurrence, SystemCategory, TaskCatalog};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

#[test]
fn json_catalog_skips_bad_entries_and_keeps_the_rest() {
    let json = r#"[
        {
            "id": "chimney-sweep",
            "title": "Chimney Sweep",
            "category": "heating",
            "recurrence": { "kind": "seasonal", "anchor": "second saturday of september" },
            "default_priority": "high"
        },
        {
            "id": "roof-snow-check",
            "title": "Roof Snow Load Check",
            "category": "envelope",
            "recurrence": { "kind": "seasonal", "anchor": "fifth blursday of smarch" },
            "default_priority": "medium"
        },
        {
            "id": "sump-test",
            "version": 2,
            "title": "Sump Pump Test",
            "category": "water",
            "recurrence": { "kind": "interval", "days": -30 },
            "default_priority": "low"
        },
        {
            "id": "glycol-check",
            "title": "Glycol Loop Check",
            "category": "heating",
            "recurrence": { "kind": "interval", "days": 365 },
            "default_priority": "medium",
            "grace": { "due_soon_days": 14 }
        }
    ]"#;

    let (catalog, rejected) = TaskCatalog::from_json_str(json).unwrap();
    assert_eq!(catalog.len(), 2);
    assert_eq!(rejected.len(), 2);
    assert!(rejected.iter().any(|err| matches!(
        err,
        CatalogError::InvalidDefinition { id, .. } if id == "roof-snow-check"
    )));
    assert!(rejected.iter().any(|err| matches!(
        err,
        CatalogError::InvalidDefinition { id, version: 2, .. } if id == "sump-test"
    )));

    let sweep = catalog.current("chimney-sweep").unwrap();
    assert_eq!(sweep.default_priority, Priority::High);
    assert_eq!(sweep.version, 1);
    let glycol = catalog.current("glycol-check").unwrap();
    assert_eq!(glycol.grace.due_soon_days, 14);
    assert_eq!(glycol.grace.critical_after_days, 14);
    assert_eq!(catalog.for_category(SystemCategory::Heating).len(), 2);
}

#[test]
fn anchors_round_trip_through_their_text_form() {
    for text in [
        "first week of october",
        "last sunday of march",
        "second saturday of november",
        "last week of february",
    ] {
        let anchor: SeasonalAnchor = text.parse().unwrap();
        assert_eq!(anchor.to_string(), text);
    }
    assert!("zeroth week of june".parse::<SeasonalAnchor>().is_err());
}

#[test]
fn anchor_rolls_into_next_year_once_passed() {
    let anchor: SeasonalAnchor = "last sunday of march".parse().unwrap();
    assert_eq!(anchor.next_on_or_after(d(2025, 1, 1)), Some(d(2025, 3, 30)));
    assert_eq!(anchor.next_on_or_after(d(2025, 3, 30)), Some(d(2025, 3, 30)));
    assert_eq!(anchor.next_on_or_after(d(2025, 3, 31)), Some(d(2026, 3, 29)));
}

#[test]
fn built_in_catalog_covers_every_category() {
    let catalog = TaskCatalog::cold_climate_defaults();
    for category in SystemCategory::ALL {
        assert!(
            !catalog.for_category(category).is_empty(),
            "no definitions for {category}"
        );
    }
    assert!(matches!(
        catalog.current("furnace-inspection").unwrap().recurrence,
        Recurrence::Seasonal { .. }
    ));
}
