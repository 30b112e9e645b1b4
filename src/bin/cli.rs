use std::io::{self, BufRead, Write};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use frostline::engine::HomeReport;
use frostline::persistence::{export_timeline_csv, load_store_from_json, save_store_to_json};
use frostline::{
    CompletionRecord, EngineConfig, Home, InMemoryStore, InspectionOutcome, InspectionRecord,
    MaintenanceEngine, MaintenanceStore, StaticWeather, System, SystemCategory, TaskCatalog,
    WeatherReading,
};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

type Engine = MaintenanceEngine<InMemoryStore>;

fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (ci, cell) in row.iter().enumerate() {
            if cell.chars().count() > widths[ci] {
                widths[ci] = cell.chars().count();
            }
        }
    }

    let mut sep = String::from("+");
    for w in &widths {
        sep.push_str(&"-".repeat(*w + 2));
        sep.push('+');
    }

    let render_row = |cells: Vec<&str>| {
        let mut line = String::from("|");
        for (ci, cell) in cells.iter().enumerate() {
            let pad = widths[ci] - cell.chars().count();
            line.push(' ');
            line.push_str(cell);
            line.push_str(&" ".repeat(pad));
            line.push_str(" |");
        }
        line
    };

    let mut out = String::new();
    out.push_str(&sep);
    out.push('\n');
    out.push_str(&render_row(headers.to_vec()));
    out.push('\n');
    out.push_str(&sep);
    out.push('\n');
    for row in rows {
        out.push_str(&render_row(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out.push_str(&sep);
    out
}

fn render_report(report: &HomeReport) -> String {
    let instances: Vec<Vec<String>> = report
        .instances
        .iter()
        .map(|view| {
            vec![
                view.instance.id.to_string(),
                view.instance.system_id.clone(),
                view.instance.title.clone(),
                view.instance.due_date.to_string(),
                view.instance.priority.to_string(),
                view.status.to_string(),
            ]
        })
        .collect();
    let scores: Vec<Vec<String>> = report
        .system_scores
        .iter()
        .map(|entry| {
            vec![
                entry.system_id.clone(),
                entry.category.to_string(),
                entry
                    .score
                    .map(|score| format!("{score:.1}"))
                    .unwrap_or_else(|| "n/a".to_string()),
                entry.overdue_count.to_string(),
                entry.due_soon_count.to_string(),
            ]
        })
        .collect();
    let alerts: Vec<Vec<String>> = report
        .alerts
        .iter()
        .map(|alert| {
            vec![
                alert.priority.to_string(),
                alert.title.clone(),
                alert.dedup_key.clone(),
            ]
        })
        .collect();

    let home_score = report
        .home_score
        .map(|score| format!("{score:.1}"))
        .unwrap_or_else(|| "n/a".to_string());
    let mut out = format!(
        "Home {} ({}) as of {}\nHome score: {home_score}\n",
        report.home.name,
        report.home.id,
        report.as_of.date_naive()
    );
    out.push_str(&render_table(
        &["id", "system", "task", "due", "priority", "status"],
        &instances,
    ));
    out.push('\n');
    out.push_str(&render_table(
        &["system", "category", "score", "overdue", "due_soon"],
        &scores,
    ));
    out.push('\n');
    out.push_str(&render_table(&["priority", "alert", "dedup_key"], &alerts));
    for issue in &report.data_quality {
        out.push_str(&format!("\nData quality: {issue:?}"));
    }
    out
}

fn print_help() {
    println!(
        "Commands:\n  help                                         Show this help\n  asof <YYYY-MM-DD>                            Set the evaluation date (default: now)\n  home <id> <region> <name...>                 Register a home\n  system <home> <id> <category> <install|-> <service|-> <name...>\n                                               Register a system\n  inspect <home> <system> <YYYY-MM-DD> <pass|needs_attention|fail> [notes...]\n                                               Record an inspection\n  weather <region> <temp_c> [feels_like_c]     Record a reading at the evaluation time\n  report <home>                                Recompute and show a home\n  complete <instance> [cost] [performer...]    Complete an instance\n  skip <instance> [reason...]                  Skip an instance\n  dismiss <home> <dedup_key>                   Dismiss an alert\n  timeline <home>                              Show closed instances\n  export <home> <path.csv>                     Write the timeline as CSV\n  save <path.json>                             Save a JSON snapshot\n  load <path.json>                             Load a JSON snapshot\n  quit|exit                                    Exit"
    );
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn parse_optional_date(s: &str) -> Result<Option<NaiveDate>, String> {
    if s == "-" {
        return Ok(None);
    }
    parse_date(s)
        .map(Some)
        .ok_or_else(|| format!("Invalid date '{s}' (YYYY-MM-DD or -)"))
}

fn midday(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(12, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn load_catalog() -> TaskCatalog {
    let Ok(path) = std::env::var("FROSTLINE_CATALOG") else {
        return TaskCatalog::cold_climate_defaults();
    };
    match std::fs::read_to_string(&path)
        .map_err(|e| e.to_string())
        .and_then(|json| TaskCatalog::from_json_str(&json).map_err(|e| e.to_string()))
    {
        Ok((catalog, rejected)) => {
            if !rejected.is_empty() {
                eprintln!("Skipped {} invalid definition(s) from {path}", rejected.len());
            }
            catalog
        }
        Err(e) => {
            eprintln!("Could not read catalog {path}: {e}; using built-in catalog");
            TaskCatalog::cold_climate_defaults()
        }
    }
}

fn load_config() -> EngineConfig {
    match std::env::var("FROSTLINE_CONFIG") {
        Ok(path) => EngineConfig::from_json_file(&path).unwrap_or_else(|e| {
            eprintln!("Could not read config {path}: {e}; using defaults");
            EngineConfig::default()
        }),
        Err(_) => EngineConfig::default(),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("frostline=info")),
        )
        .init();

    let mut engine: Engine =
        MaintenanceEngine::new(InMemoryStore::new(), load_catalog(), load_config());
    let weather = StaticWeather::new();
    let mut fixed_as_of: Option<DateTime<Utc>> = None;

    println!("Frostline maintenance (CLI) - type 'help' for commands\n");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        let Some(Ok(line)) = lines.next() else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let cmd = parts.next().unwrap_or("");
        let as_of = fixed_as_of.unwrap_or_else(Utc::now);

        match cmd {
            "help" => print_help(),
            "quit" | "exit" => break,
            "asof" => match parts.next().and_then(parse_date).and_then(midday) {
                Some(at) => {
                    fixed_as_of = Some(at);
                    println!("Evaluation date set to {}", at.date_naive());
                }
                None => println!("Usage: asof <YYYY-MM-DD>"),
            },
            "home" => {
                let (Some(id), Some(region)) = (parts.next(), parts.next()) else {
                    println!("Usage: home <id> <region> <name...>");
                    continue;
                };
                let name = parts.collect::<Vec<_>>().join(" ");
                let name = if name.is_empty() { id.to_string() } else { name };
                match engine.store().save_home(&Home::new(id, name, region)) {
                    Ok(()) => println!("Home {id} registered."),
                    Err(e) => println!("Error: {e}"),
                }
            }
            "system" => {
                let (Some(home), Some(id), Some(category), Some(install), Some(service)) = (
                    parts.next(),
                    parts.next(),
                    parts.next(),
                    parts.next(),
                    parts.next(),
                ) else {
                    println!("Usage: system <home> <id> <category> <install|-> <service|-> <name...>");
                    continue;
                };
                let category: SystemCategory = match category.parse() {
                    Ok(c) => c,
                    Err(e) => {
                        println!("{e}");
                        continue;
                    }
                };
                let (install, service) =
                    match (parse_optional_date(install), parse_optional_date(service)) {
                        (Ok(install), Ok(service)) => (install, service),
                        (Err(e), _) | (_, Err(e)) => {
                            println!("{e}");
                            continue;
                        }
                    };
                let name = parts.collect::<Vec<_>>().join(" ");
                let name = if name.is_empty() { id.to_string() } else { name };
                let mut system = System::new(id, home, name, category);
                system.install_date = install;
                system.last_service_date = service;
                match engine.store().save_system(&system) {
                    Ok(()) => println!("System {id} registered."),
                    Err(e) => println!("Error: {e}"),
                }
            }
            "inspect" => {
                let (Some(home), Some(system), Some(date), Some(outcome)) =
                    (parts.next(), parts.next(), parts.next(), parts.next())
                else {
                    println!("Usage: inspect <home> <system> <YYYY-MM-DD> <pass|needs_attention|fail> [notes...]");
                    continue;
                };
                let Some(date) = parse_date(date) else {
                    println!("Invalid date (YYYY-MM-DD)");
                    continue;
                };
                let outcome: InspectionOutcome = match outcome.parse() {
                    Ok(o) => o,
                    Err(e) => {
                        println!("{e}");
                        continue;
                    }
                };
                let notes = parts.collect::<Vec<_>>().join(" ");
                let mut record = InspectionRecord::new(date, outcome);
                if !notes.is_empty() {
                    record.notes = Some(notes);
                }
                match engine.record_inspection(home, system, record) {
                    Ok(_) => println!("Inspection recorded."),
                    Err(e) => println!("Error: {e}"),
                }
            }
            "weather" => {
                let (Some(region), Some(temp)) = (parts.next(), parts.next()) else {
                    println!("Usage: weather <region> <temp_c> [feels_like_c]");
                    continue;
                };
                let Ok(temp) = temp.parse::<f64>() else {
                    println!("Invalid temperature");
                    continue;
                };
                let mut reading = WeatherReading::new(temp, as_of);
                if let Some(feels) = parts.next().and_then(|s| s.parse::<f64>().ok()) {
                    reading = reading.with_feels_like(feels);
                }
                weather.record(region, reading);
                println!("Reading recorded for {region}.");
            }
            "report" => {
                let Some(home) = parts.next() else {
                    println!("Usage: report <home>");
                    continue;
                };
                match engine.recompute_home(home, &weather, as_of) {
                    Ok(report) => println!("{}", render_report(&report)),
                    Err(e) => println!("Error: {e}"),
                }
            }
            "complete" => {
                let Some(Ok(id)) = parts.next().map(Uuid::parse_str) else {
                    println!("Usage: complete <instance> [cost] [performer...]");
                    continue;
                };
                let mut record = CompletionRecord::completed(as_of);
                if let Some(cost) = parts.next() {
                    match cost.parse::<f64>() {
                        Ok(cost) => record = record.costing(cost),
                        Err(_) => {
                            println!("Invalid cost");
                            continue;
                        }
                    }
                }
                let performer = parts.collect::<Vec<_>>().join(" ");
                if !performer.is_empty() {
                    record = record.by(performer);
                }
                match engine.complete_instance(id, record) {
                    Ok(outcome) => {
                        println!("Completed {}.", outcome.closed.title);
                        for next in &outcome.scheduled {
                            println!("Next {} due {} ({})", next.title, next.due_date, next.id);
                        }
                    }
                    Err(e) => println!("Error: {e}"),
                }
            }
            "skip" => {
                let Some(Ok(id)) = parts.next().map(Uuid::parse_str) else {
                    println!("Usage: skip <instance> [reason...]");
                    continue;
                };
                let reason = parts.collect::<Vec<_>>().join(" ");
                let reason = (!reason.is_empty()).then_some(reason);
                match engine.skip_instance(id, as_of, reason) {
                    Ok(outcome) => {
                        println!("Skipped {}.", outcome.closed.title);
                        for next in &outcome.scheduled {
                            println!("Next {} due {} ({})", next.title, next.due_date, next.id);
                        }
                    }
                    Err(e) => println!("Error: {e}"),
                }
            }
            "dismiss" => {
                let (Some(home), Some(key)) = (parts.next(), parts.next()) else {
                    println!("Usage: dismiss <home> <dedup_key>");
                    continue;
                };
                match engine.dismiss_alert(home, key, as_of) {
                    Ok(()) => println!("Dismissed {key}."),
                    Err(e) => println!("Error: {e}"),
                }
            }
            "timeline" => {
                let Some(home) = parts.next() else {
                    println!("Usage: timeline <home>");
                    continue;
                };
                match engine.timeline(home) {
                    Ok(history) => {
                        let rows: Vec<Vec<String>> = history
                            .iter()
                            .filter_map(|instance| {
                                let record = instance.completion.as_ref()?;
                                Some(vec![
                                    record.closed_at.date_naive().to_string(),
                                    instance.system_id.clone(),
                                    instance.title.clone(),
                                    format!("{:?}", record.kind).to_lowercase(),
                                    record.cost.map(|c| format!("{c:.2}")).unwrap_or_default(),
                                ])
                            })
                            .collect();
                        println!(
                            "{}",
                            render_table(&["closed", "system", "task", "outcome", "cost"], &rows)
                        );
                    }
                    Err(e) => println!("Error: {e}"),
                }
            }
            "export" => {
                let (Some(home), Some(path)) = (parts.next(), parts.next()) else {
                    println!("Usage: export <home> <path.csv>");
                    continue;
                };
                match engine
                    .timeline(home)
                    .map_err(|e| e.to_string())
                    .and_then(|history| {
                        export_timeline_csv(&history, path).map_err(|e| e.to_string())
                    }) {
                    Ok(rows) => println!("Exported {rows} row(s) to {path}."),
                    Err(e) => println!("Error: {e}"),
                }
            }
            "save" => {
                let Some(path) = parts.next() else {
                    println!("Usage: save <path.json>");
                    continue;
                };
                match save_store_to_json(engine.store(), path) {
                    Ok(()) => println!("Saved to {path}."),
                    Err(e) => println!("Error: {e}"),
                }
            }
            "load" => {
                let Some(path) = parts.next() else {
                    println!("Usage: load <path.json>");
                    continue;
                };
                match load_store_from_json(path) {
                    Ok(store) => {
                        let catalog = engine.catalog().clone();
                        let config = engine.config().clone();
                        engine = MaintenanceEngine::new(store, catalog, config);
                        println!("Loaded {path}.");
                    }
                    Err(e) => println!("Error: {e}"),
                }
            }
            _ => println!("Unknown command. Type 'help'."),
        }
    }
}
