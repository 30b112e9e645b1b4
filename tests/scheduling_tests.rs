use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use frostline::catalog::GraceWindow;
use frostline::recurrence::{DataQualityIssue, ensure_scheduled, next_due_date};
use frostline::weather::NoWeather;
use frostline::{
    CompletionRecord, EngineConfig, Home, InMemoryStore, MaintenanceEngine, MaintenanceStore,
    Priority, Recurrence, System, SystemCategory, TaskCatalog, TaskDefinition, TaskStatus,
    classify,
};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn at(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(9, 0, 0).unwrap())
}

fn filter_definition() -> TaskDefinition {
    TaskDefinition::new(
        "furnace-filter",
        "Furnace Filter Replacement",
        SystemCategory::Heating,
        Recurrence::every_days(90),
        Priority::High,
    )
}

fn single_definition_engine(definition: TaskDefinition) -> MaintenanceEngine<InMemoryStore> {
    let (catalog, rejected) = TaskCatalog::load(vec![definition]);
    assert!(rejected.is_empty());
    MaintenanceEngine::new(InMemoryStore::new(), catalog, EngineConfig::default())
}

fn seed_home(engine: &MaintenanceEngine<InMemoryStore>, system: &System) {
    engine
        .store()
        .save_home(&Home::new("h1", "Lakeside Cabin", "yellowknife"))
        .unwrap();
    engine.store().save_system(system).unwrap();
}

#[test]
fn install_plus_interval_is_overdue_five_days_later() {
    let install = d(2024, 10, 1);
    let system = System::new("furnace", "h1", "Furnace", SystemCategory::Heating).installed_on(install);
    let definition = filter_definition();
    let as_of = install + Duration::days(95);

    let outcome = ensure_scheduled(&system, &[&definition], &[], at(as_of));
    assert_eq!(outcome.created.len(), 1);
    assert!(outcome.issues.is_empty());
    let instance = &outcome.created[0];
    assert_eq!(instance.due_date, install + Duration::days(90));
    assert_eq!(instance.status(7, as_of), TaskStatus::Overdue);
}

#[test]
fn ensure_scheduled_is_idempotent() {
    let system = System::new("furnace", "h1", "Furnace", SystemCategory::Heating)
        .serviced_on(d(2025, 1, 1));
    let catalog = TaskCatalog::cold_climate_defaults();
    let definitions = catalog.for_category(SystemCategory::Heating);
    let as_of = at(d(2025, 2, 1));

    let first = ensure_scheduled(&system, &definitions, &[], as_of);
    assert_eq!(first.created.len(), definitions.len());

    let second = ensure_scheduled(&system, &definitions, &first.created, as_of);
    assert!(second.created.is_empty());
    assert_eq!(second.existing, first.created);

    let replay = ensure_scheduled(&system, &definitions, &[], as_of);
    assert_eq!(replay.created, first.created);
}

#[test]
fn missing_history_defaults_to_as_of_and_is_flagged() {
    let system = System::new("furnace", "h1", "Furnace", SystemCategory::Heating);
    let definition = filter_definition();
    let as_of = d(2025, 1, 15);

    let outcome = ensure_scheduled(&system, &[&definition], &[], at(as_of));
    assert_eq!(outcome.created[0].due_date, as_of + Duration::days(90));
    assert_eq!(
        outcome.issues,
        vec![DataQualityIssue::MissingHistory {
            system_id: "furnace".into(),
            definition_id: "furnace-filter".into(),
        }]
    );
}

#[test]
fn definitions_for_other_categories_are_ignored() {
    let system = System::new("well-pump", "h1", "Well Pump", SystemCategory::Water)
        .installed_on(d(2024, 1, 1));
    let definition = filter_definition();
    let outcome = ensure_scheduled(&system, &[&definition], &[], at(d(2025, 1, 1)));
    assert!(outcome.created.is_empty());
    assert!(outcome.existing.is_empty());
}

#[test]
fn seasonal_rule_picks_next_anchor_and_never_repeats_a_season() {
    let definition = TaskDefinition::new(
        "furnace-inspection",
        "Annual Furnace Inspection",
        SystemCategory::Heating,
        Recurrence::seasonal("first week of october").unwrap(),
        Priority::High,
    );
    let due = next_due_date(&definition, d(2025, 1, 1), None, d(2025, 3, 1)).unwrap();
    assert_eq!(due, d(2025, 10, 1));

    // Work done early in September must not land the next one in the same October.
    let next = next_due_date(&definition, d(2025, 9, 20), Some(d(2025, 10, 1)), d(2025, 9, 20)).unwrap();
    assert_eq!(next, d(2026, 10, 1));
}

#[test]
fn invalid_definition_is_rejected_without_blocking_others() {
    let broken = TaskDefinition::new(
        "broken",
        "Broken Rule",
        SystemCategory::Heating,
        Recurrence::every_days(0),
        Priority::Low,
    );
    let (catalog, rejected) = TaskCatalog::load(vec![broken, filter_definition()]);
    assert_eq!(rejected.len(), 1);
    assert_eq!(catalog.len(), 1);
    assert!(catalog.current("furnace-filter").is_some());
    assert!(catalog.current("broken").is_none());
}

#[test]
fn completion_schedules_next_from_completion_date() {
    let engine = single_definition_engine(filter_definition());
    let system = System::new("furnace", "h1", "Furnace", SystemCategory::Heating).installed_on(d(2024, 10, 1));
    seed_home(&engine, &system);

    let report = engine.recompute_home("h1", &NoWeather, at(d(2025, 1, 4))).unwrap();
    let open = &report.instances[0].instance;
    assert_eq!(open.due_date, d(2024, 12, 30));

    let outcome = engine
        .complete_instance(open.id, CompletionRecord::completed(at(d(2025, 1, 5))).costing(42.5))
        .unwrap();
    assert_eq!(outcome.scheduled.len(), 1);
    assert_eq!(outcome.scheduled[0].due_date, d(2025, 1, 5) + Duration::days(90));

    let systems = engine.store().load_systems("h1").unwrap();
    assert_eq!(systems[0].last_service_date, Some(d(2025, 1, 5)));

    let again = engine.complete_instance(open.id, CompletionRecord::completed(at(d(2025, 1, 6))));
    assert!(matches!(
        again,
        Err(frostline::EngineError::InstanceAlreadyClosed(_))
    ));
}

#[test]
fn completing_on_the_install_day_schedules_a_distinct_instance() {
    let engine = single_definition_engine(filter_definition());
    let system = System::new("furnace", "h1", "Furnace", SystemCategory::Heating).installed_on(d(2025, 1, 1));
    seed_home(&engine, &system);

    let report = engine.recompute_home("h1", &NoWeather, at(d(2025, 1, 1))).unwrap();
    let first = report.instances[0].instance.clone();
    assert_eq!(first.due_date, d(2025, 4, 1));
    assert_eq!(first.occurrence, 1);

    let completed_at = Utc.with_ymd_and_hms(2025, 1, 1, 15, 0, 0).unwrap();
    let outcome = engine
        .complete_instance(first.id, CompletionRecord::completed(completed_at))
        .unwrap();
    let next = &outcome.scheduled[0];
    assert_eq!(next.due_date, first.due_date);
    assert_eq!(next.occurrence, 2);
    assert_ne!(next.id, first.id);

    let report = engine.recompute_home("h1", &NoWeather, at(d(2025, 1, 2))).unwrap();
    assert_eq!(report.instances.len(), 1);
    assert_eq!(report.instances[0].instance.id, next.id);
    assert_eq!(engine.store().load_instance_history("h1").unwrap().len(), 1);
}

#[test]
fn interval_beyond_a_century_is_rejected_at_load() {
    let mut runaway = filter_definition();
    runaway.id = "runaway".to_string();
    runaway.recurrence = Recurrence::every_days(1_000_000_000);
    let (catalog, rejected) = TaskCatalog::load(vec![runaway.clone(), filter_definition()]);
    assert_eq!(catalog.len(), 1);
    assert!(matches!(
        rejected.as_slice(),
        [frostline::catalog::CatalogError::InvalidDefinition { id, .. }] if id == "runaway"
    ));

    let system = System::new("furnace", "h1", "Furnace", SystemCategory::Heating).installed_on(d(2025, 1, 1));
    let outcome = ensure_scheduled(&system, &[&runaway], &[], at(d(2025, 1, 2)));
    assert!(outcome.created.is_empty());
    assert_eq!(outcome.rejected.len(), 1);
    assert!(next_due_date(&runaway, d(2025, 1, 1), None, d(2025, 1, 1)).is_err());
}

#[test]
fn skip_keeps_cadence_and_leaves_service_date_alone() {
    let engine = single_definition_engine(filter_definition());
    let system = System::new("furnace", "h1", "Furnace", SystemCategory::Heating).serviced_on(d(2024, 10, 1));
    seed_home(&engine, &system);

    let report = engine.recompute_home("h1", &NoWeather, at(d(2025, 1, 4))).unwrap();
    let open = report.instances[0].instance.clone();

    let outcome = engine
        .skip_instance(open.id, at(d(2025, 1, 10)), Some("filter out of stock".into()))
        .unwrap();
    assert_eq!(outcome.scheduled[0].due_date, open.due_date + Duration::days(90));

    let systems = engine.store().load_systems("h1").unwrap();
    assert_eq!(systems[0].last_service_date, Some(d(2024, 10, 1)));

    let timeline = engine.timeline("h1").unwrap();
    assert_eq!(timeline.len(), 1);
    let record = timeline[0].completion.as_ref().unwrap();
    assert_eq!(record.notes.as_deref(), Some("filter out of stock"));
}

#[test]
fn old_instances_keep_their_definition_version() {
    let original = filter_definition().with_grace(GraceWindow {
        due_soon_days: 7,
        critical_after_days: 30,
    });
    let mut catalog = TaskCatalog::default();
    catalog.publish(original.clone()).unwrap();

    let system = System::new("furnace", "h1", "Furnace", SystemCategory::Heating).installed_on(d(2024, 10, 1));
    let outcome = ensure_scheduled(&system, &catalog.for_category(SystemCategory::Heating), &[], at(d(2024, 11, 1)));
    let instance = outcome.created[0].clone();

    let mut revised = original.revised();
    revised.grace.critical_after_days = 3;
    catalog.publish(revised).unwrap();

    let config = EngineConfig::default();
    assert_eq!(catalog.current("furnace-filter").unwrap().version, 2);
    assert_eq!(instance.definition_version, 1);
    assert_eq!(config.critical_window(&catalog, &instance), 30);
}

#[test]
fn recompute_twice_creates_nothing_new() {
    let engine = MaintenanceEngine::new(
        InMemoryStore::new(),
        TaskCatalog::cold_climate_defaults(),
        EngineConfig::default(),
    );
    engine
        .store()
        .save_home(&Home::new("h1", "Cabin", "whitehorse"))
        .unwrap();
    for (id, category) in [
        ("furnace", SystemCategory::Heating),
        ("hrv", SystemCategory::Ventilation),
        ("water-heater", SystemCategory::Water),
    ] {
        let system = System::new(id, "h1", id, category).installed_on(d(2023, 6, 1));
        engine.store().save_system(&system).unwrap();
    }

    let as_of = at(d(2025, 2, 1));
    let first = engine.recompute_home("h1", &NoWeather, as_of).unwrap();
    let count = engine.store().instance_count();
    let second = engine.recompute_home("h1", &NoWeather, as_of).unwrap();

    assert_eq!(engine.store().instance_count(), count);
    let ids = |report: &frostline::HomeReport| {
        report.instances.iter().map(|v| v.instance.id).collect::<Vec<_>>()
    };
    assert_eq!(ids(&first), ids(&second));
}

#[test]
fn status_cache_is_written_back_only_on_change() {
    let engine = single_definition_engine(filter_definition());
    let system = System::new("furnace", "h1", "Furnace", SystemCategory::Heating).installed_on(d(2024, 10, 1));
    seed_home(&engine, &system);

    let report = engine.recompute_home("h1", &NoWeather, at(d(2024, 11, 1))).unwrap();
    let id = report.instances[0].instance.id;
    let stored = engine.store().load_instance(id).unwrap().unwrap();
    assert_eq!(stored.cached_status, Some(TaskStatus::Upcoming));
    let revision = stored.revision;

    engine.recompute_home("h1", &NoWeather, at(d(2024, 11, 2))).unwrap();
    assert_eq!(engine.store().load_instance(id).unwrap().unwrap().revision, revision);

    engine.recompute_home("h1", &NoWeather, at(d(2025, 1, 4))).unwrap();
    let refreshed = engine.store().load_instance(id).unwrap().unwrap();
    assert_eq!(refreshed.cached_status, Some(TaskStatus::Overdue));
    assert_eq!(refreshed.revision, revision + 1);
    assert_eq!(classify(refreshed.due_date, 7, d(2025, 1, 4)), TaskStatus::Overdue);
}

#[test]
fn unknown_home_is_reported() {
    let engine = single_definition_engine(filter_definition());
    let err = engine.recompute_home("nope", &NoWeather, Utc::now()).unwrap_err();
    assert!(matches!(err, frostline::EngineError::HomeNotFound(_)));
    assert!(!err.is_retryable());
}
