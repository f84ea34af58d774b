use super::*;
use crate::bulk::SetColumnAction;
use pretty_assertions::assert_eq;
use serde_json::json;
use tabula_core::{ColumnFilter, ColumnSpec, FieldKind, FilterDetail, Record, Value};

fn engine() -> GridEngine {
    let options = GridOptions::new("Invoice")
        .fallback_sorts(["id"])
        .bulk_action(Arc::new(SetColumnAction::new("Close", "status")));
    let schema = Schema::new().with_table(
        "Invoice",
        [
            ("name", FieldKind::Text),
            ("total", FieldKind::Money),
            ("status", FieldKind::enumeration(["open", "closed"])),
        ],
    );
    GridEngine::new(options, schema)
}

fn view() -> Arc<ViewSpec> {
    Arc::new(
        ViewSpec::new("v1", "Open invoices", "Invoice")
            .with_column(ColumnSpec::new("name", "Name", 150.0))
            .with_column(ColumnSpec::new("total", "Total", 90.0)),
    )
}

fn start(engine: &GridEngine) -> GridState {
    engine.initialize(view(), GridSeed::default()).state
}

fn only_query(effects: &[Effect]) -> (RequestId, QueryRequest) {
    match effects {
        [Effect::Query {
            request_id,
            request,
        }] => (*request_id, request.clone()),
        other => panic!("expected a single query, got {:?}", other),
    }
}

fn response(rows: Vec<Row>) -> QueryResponse {
    let full_count = rows.len();
    QueryResponse { rows, full_count }
}

fn record(id: &str, name: &str, total: i64) -> Record {
    let mut record = Record::new();
    record.insert("id".into(), id.into());
    record.insert("name".into(), name.into());
    record.insert("total".into(), Value::Int(total));
    record.insert("status".into(), "open".into());
    record
}

#[test]
fn test_initialize_issues_first_query() {
    let engine = engine();
    let update = engine.initialize(view(), GridSeed::default());
    let (request_id, request) = only_query(&update.effects);

    assert_eq!(request_id, 1);
    assert_eq!(update.state.latest_request_id(), 1);
    assert!(update.state.fetched_rows.is_none());
    assert_eq!(request.columns, vec!["name", "total", "null", "null", "id"]);
    assert_eq!(request.limit, Some(100));
    assert_eq!(update.state.column_widths.get("name"), Some(&150.0));
}

#[test]
fn test_seed_widths_override_view_widths() {
    let engine = engine();
    let mut seed = GridSeed::default();
    seed.widths.insert("total".into(), 120.0);
    seed.widths.insert("gone".into(), 10.0);
    let state = engine.initialize(view(), seed).state;

    assert_eq!(state.column_widths.get("total"), Some(&120.0));
    assert_eq!(state.column_widths.get("name"), Some(&150.0));
    assert_eq!(state.column_widths.get("gone"), None);
}

#[test]
fn test_typed_filters_compile_into_query() {
    let engine = engine();
    let state = start(&engine);
    let state = engine
        .reduce(state, GridEvent::update_filter("total", ">100"))
        .state;
    let update = engine.reduce(state, GridEvent::update_filter("name", "abc"));
    let (_, request) = only_query(&update.effects);

    assert_eq!(
        request.filters,
        vec![
            FilterDetail::column("total", ColumnFilter::greater(100i64)),
            FilterDetail::column("name", ColumnFilter::like("%abc%")),
        ]
    );
    assert_eq!(request.sorts, vec!["id"]);
}

#[test]
fn test_every_changing_event_issues_one_query_with_increasing_id() {
    let engine = engine();
    let update = engine.initialize(view(), GridSeed::default());
    let mut state = update.state;
    let mut ids = vec![only_query(&update.effects).0];

    let events = vec![
        GridEvent::update_filter("name", "a"),
        GridEvent::click_header("total"),
        GridEvent::click_header("total"),
        GridEvent::Refresh,
        GridEvent::update_filter("name", ""),
        GridEvent::SetAddingColumn(true),
        GridEvent::ResizeColumn {
            column: "name".into(),
            width: 40.0,
        },
    ];
    let mut changing = 1;
    for event in events {
        let alters = matches!(
            event,
            GridEvent::UpdateFilter { .. } | GridEvent::ClickHeader { .. } | GridEvent::Refresh
        );
        let update = engine.reduce(state, event);
        let queries: Vec<RequestId> = update
            .effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Query { request_id, .. } => Some(*request_id),
                _ => None,
            })
            .collect();
        if alters {
            changing += 1;
            assert_eq!(queries.len(), 1);
            ids.extend(queries);
        } else {
            assert!(queries.is_empty());
        }
        state = update.state;
    }

    assert_eq!(ids.len(), changing);
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(state.latest_request_id(), *ids.last().unwrap());
}

#[test]
fn test_stale_response_is_ignored() {
    let engine = engine();
    let mut state = start(&engine);
    for text in ["a", "ab", "abc", "abcd"] {
        state = engine
            .reduce(state, GridEvent::update_filter("name", text))
            .state;
    }
    assert_eq!(state.latest_request_id(), 5);

    let fresh = vec![vec![Value::from("abcd")]];
    state = engine
        .reduce(
            state,
            GridEvent::DataFetched {
                request_id: 5,
                response: response(fresh.clone()),
            },
        )
        .state;
    assert_eq!(state.rows(), fresh.as_slice());

    let update = engine.reduce(
        state,
        GridEvent::DataFetched {
            request_id: 3,
            response: response(vec![vec![Value::from("stale")], vec![Value::from("x")]]),
        },
    );
    assert!(update.effects.is_empty());
    assert_eq!(update.state.rows(), fresh.as_slice());
    assert_eq!(update.state.total_row_count, 1);
}

#[test]
fn test_superseded_response_arriving_first_is_dropped() {
    let engine = engine();
    let state = start(&engine);
    let state = engine
        .reduce(state, GridEvent::update_filter("name", "a"))
        .state;

    let state = engine
        .reduce(
            state,
            GridEvent::DataFetched {
                request_id: 1,
                response: response(vec![vec![Value::from("old")]]),
            },
        )
        .state;
    assert!(state.fetched_rows.is_none());
}

#[test]
fn test_query_failure_is_recorded_for_latest_only() {
    let engine = engine();
    let state = start(&engine);
    let state = engine
        .reduce(
            state,
            GridEvent::QueryFailed {
                request_id: 0,
                error: "old".into(),
            },
        )
        .state;
    assert_eq!(state.last_error, None);

    let state = engine
        .reduce(
            state,
            GridEvent::QueryFailed {
                request_id: 1,
                error: "store unavailable".into(),
            },
        )
        .state;
    assert_eq!(state.last_error.as_deref(), Some("store unavailable"));
    assert!(state.fetched_rows.is_none());
    assert!(!state.is_loading());
}

#[test]
fn test_row_access_schedules_one_debounced_increase() {
    let engine = engine();
    let state = start(&engine);

    let update = engine.reduce(state, GridEvent::RowAccessed { index: 50 });
    assert!(update.effects.is_empty());

    let update = engine.reduce(update.state, GridEvent::RowAccessed { index: 85 });
    let generation = match update.effects.as_slice() {
        [Effect::ScheduleFetchIncrease { generation, delay }] => {
            assert_eq!(*delay, engine.fetch_config().debounce);
            *generation
        }
        other => panic!("expected a scheduled increase, got {:?}", other),
    };

    let update = engine.reduce(update.state, GridEvent::RowAccessed { index: 90 });
    assert!(update.effects.is_empty());

    let update = engine.reduce(update.state, GridEvent::IncreaseFetch { generation });
    let (request_id, request) = only_query(&update.effects);
    assert_eq!(request_id, 2);
    assert_eq!(request.limit, Some(200));
    assert_eq!(update.state.fetch_row_limit(), 200);
}

#[test]
fn test_fetch_limit_resets_on_filter_sort_change() {
    let engine = engine();
    let state = start(&engine);
    let update = engine.reduce(state, GridEvent::RowAccessed { index: 95 });
    let generation = update.state.fetch.generation();
    let state = engine
        .reduce(update.state, GridEvent::IncreaseFetch { generation })
        .state;
    assert_eq!(state.fetch_row_limit(), 200);

    let state = engine.reduce(state, GridEvent::Refresh).state;
    assert_eq!(state.fetch_row_limit(), 200);

    let state = engine
        .reduce(state, GridEvent::click_header("name"))
        .state;
    assert_eq!(state.fetch_row_limit(), 100);

    let update = engine.reduce(state, GridEvent::IncreaseFetch { generation });
    assert!(update.effects.is_empty());
    assert_eq!(update.state.fetch_row_limit(), 100);
}

#[test]
fn test_click_header_toggles_same_column() {
    let engine = engine();
    let state = start(&engine);
    let update = engine.reduce(state, GridEvent::click_header("total"));
    assert_eq!(only_query(&update.effects).1.sorts, vec!["total", "id"]);

    let update = engine.reduce(update.state, GridEvent::click_header("total"));
    assert_eq!(only_query(&update.effects).1.sorts, vec!["-total", "id"]);

    let update = engine.reduce(update.state, GridEvent::click_header("name"));
    assert_eq!(only_query(&update.effects).1.sorts, vec!["name", "id"]);
}

#[test]
fn test_widths_are_persisted() {
    let engine = engine();
    let state = start(&engine);
    let update = engine.reduce(
        state,
        GridEvent::ResizeColumn {
            column: "name".into(),
            width: 222.0,
        },
    );
    match update.effects.as_slice() {
        [Effect::PersistWidths { view_id, widths }] => {
            assert_eq!(view_id, "v1");
            assert_eq!(widths.get("name"), Some(&222.0));
        }
        other => panic!("expected width persistence, got {:?}", other),
    }

    let update = engine.reduce(update.state, GridEvent::ResetWidths);
    assert_eq!(update.state.column_widths.get("name"), Some(&150.0));
    assert_eq!(update.effects.len(), 1);

    let update = engine.reduce(
        update.state,
        GridEvent::ResizeColumn {
            column: "missing".into(),
            width: 10.0,
        },
    );
    assert!(update.effects.is_empty());
}

fn selecting(engine: &GridEngine, ids: &[&str]) -> GridState {
    let state = start(engine);
    let update = engine.reduce(state, GridEvent::StartBulkAction { index: 0 });
    let (_, request) = only_query(&update.effects);
    assert_eq!(request.limit, None);

    let mut state = update.state;
    for id in ids {
        state = engine.reduce(state, GridEvent::set_selected(*id, true)).state;
    }
    engine
        .reduce(state, GridEvent::BulkFormAction(json!({"set": "closed"})))
        .state
}

#[test]
fn test_selection_survives_filter_change() {
    let engine = engine();
    let state = selecting(&engine, &["x"]);
    let update = engine.reduce(state, GridEvent::update_filter("name", "zzz"));
    let (_, request) = only_query(&update.effects);

    assert_eq!(request.limit, None);
    assert_eq!(
        request.filters,
        vec![FilterDetail::or(vec![
            FilterDetail::and(vec![FilterDetail::column(
                "name",
                ColumnFilter::like("%zzz%")
            )]),
            FilterDetail::column("id", ColumnFilter::one_of(["x"])),
        ])]
    );

    let selected = record("x", "Acme", 10);
    let other = record("y", "Acme", 10);
    assert!(request.filters.iter().all(|filter| filter.matches(&selected)));
    assert!(!request.filters.iter().all(|filter| filter.matches(&other)));
}

#[test]
fn test_bulk_commits_in_any_order_return_to_browsing() {
    let engine = engine();
    let ids = ["a", "b", "c"];
    let state = selecting(&engine, &ids);
    assert!(engine.can_apply_bulk(&state));

    let update = engine.reduce(state, GridEvent::ApplyBulk);
    let request = match update.effects.as_slice() {
        [Effect::BulkQuery { request }] => request.clone(),
        other => panic!("expected bulk query, got {:?}", other),
    };
    assert_eq!(request.columns, vec!["."]);
    assert_eq!(
        request.filters,
        vec![FilterDetail::column("id", ColumnFilter::one_of(ids))]
    );
    assert_eq!(update.state.bulk_phase(), Some(BulkPhase::Applying));

    let rows = ids
        .iter()
        .map(|id| vec![Value::Json(tabula_core::record_to_json(&record(id, "n", 1)))])
        .collect();
    let update = engine.reduce(update.state, GridEvent::BulkFetched { response: response(rows) });
    assert_eq!(update.effects.len(), 3);
    for effect in &update.effects {
        match effect {
            Effect::Commit { request, .. } => {
                assert_eq!(request.form, "Bulk Close");
                assert_eq!(request.record.get("status"), Some(&Value::from("closed")));
            }
            other => panic!("expected commit, got {:?}", other),
        }
    }
    let mut state = update.state;
    assert_eq!(state.bulk.as_ref().unwrap().pending_commit_count, 3);

    for (i, id) in ["c", "a", "b"].iter().enumerate() {
        let update = engine.reduce(
            state,
            GridEvent::BulkCommitted {
                record_id: Some(id.to_string()),
                result: if *id == "a" { Err("conflict".into()) } else { Ok(()) },
            },
        );
        state = update.state;
        if i < 2 {
            assert_eq!(state.bulk.as_ref().unwrap().pending_commit_count, 2 - i);
            assert!(update.effects.is_empty());
        } else {
            let (_, request) = only_query(&update.effects);
            assert_eq!(request.limit, Some(100));
        }
    }

    assert!(state.bulk.is_none());
    let report = state.last_bulk_report.unwrap();
    assert_eq!(report.committed, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].record_id.as_deref(), Some("a"));
}

#[test]
fn test_close_bulk_discards_selection() {
    let engine = engine();
    let state = selecting(&engine, &["a"]);
    let update = engine.reduce(state, GridEvent::CloseBulk);
    assert!(update.state.bulk.is_none());
    let (_, request) = only_query(&update.effects);
    assert_eq!(request.limit, Some(100));
    assert!(update.state.last_bulk_report.is_none());
}

#[test]
fn test_apply_requires_valid_form_and_selection() {
    let engine = engine();
    let state = start(&engine);
    let state = engine
        .reduce(state, GridEvent::StartBulkAction { index: 0 })
        .state;
    let state = engine.reduce(state, GridEvent::set_selected("a", true)).state;

    let update = engine.reduce(state, GridEvent::ApplyBulk);
    assert!(update.effects.is_empty());
    assert_eq!(update.state.bulk_phase(), Some(BulkPhase::Selecting));

    let update = engine.reduce(update.state, GridEvent::StartBulkAction { index: 7 });
    assert!(update.effects.is_empty());
}

#[test]
fn test_bulk_events_outside_bulk_are_ignored() {
    let engine = engine();
    let state = start(&engine);
    let latest = state.latest_request_id();
    for event in [
        GridEvent::ApplyBulk,
        GridEvent::CloseBulk,
        GridEvent::set_selected("a", true),
        GridEvent::BulkCommitted {
            record_id: None,
            result: Ok(()),
        },
        GridEvent::BulkFetched {
            response: response(vec![]),
        },
    ] {
        let update = engine.reduce(state.clone(), event);
        assert!(update.effects.is_empty());
        assert!(update.state.bulk.is_none());
        assert_eq!(update.state.latest_request_id(), latest);
    }
}

#[test]
fn test_bulk_with_no_fetched_records_finishes_immediately() {
    let engine = engine();
    let state = selecting(&engine, &["gone"]);
    let state = engine.reduce(state, GridEvent::ApplyBulk).state;
    let update = engine.reduce(state, GridEvent::BulkFetched { response: response(vec![]) });

    assert!(update.state.bulk.is_none());
    only_query(&update.effects);
}

#[test]
fn test_bulk_query_failure_returns_to_selecting() {
    let engine = engine();
    let state = selecting(&engine, &["a"]);
    let state = engine.reduce(state, GridEvent::ApplyBulk).state;
    let state = engine
        .reduce(
            state,
            GridEvent::BulkQueryFailed {
                error: "timeout".into(),
            },
        )
        .state;
    assert_eq!(state.bulk_phase(), Some(BulkPhase::Selecting));
    assert_eq!(state.last_error.as_deref(), Some("timeout"));
}

#[test]
fn test_export_flow() {
    let engine = engine();
    let state = start(&engine);
    let state = engine
        .reduce(state, GridEvent::update_filter("total", ">100"))
        .state;
    let update = engine.reduce(state, GridEvent::ExportRequested);
    let request = match update.effects.as_slice() {
        [Effect::ExportQuery { request }] => request.clone(),
        other => panic!("expected export query, got {:?}", other),
    };
    assert_eq!(request.limit, None);
    assert_eq!(request.columns, vec!["name", "total"]);
    assert_eq!(request.filters.len(), 1);
    assert_eq!(update.state.latest_request_id(), 2);

    let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    let update = engine.reduce(
        update.state,
        GridEvent::ExportFetched {
            response: response(vec![vec!["Acme".into(), Value::Int(150)]]),
            date,
        },
    );
    match update.effects.as_slice() {
        [Effect::WriteWorkbook { sheet }] => {
            assert_eq!(sheet.file_name, "2024-05-01 - Open invoices.xlsx");
            assert_eq!(sheet.rows.len(), 1);
        }
        other => panic!("expected workbook, got {:?}", other),
    }
}

#[test]
fn test_format_cell_uses_column_kind() {
    let engine = engine();
    let state = start(&engine);
    let row: Row = vec!["Acme".into(), Value::Float(1234.5)];
    assert_eq!(engine.format_cell(&state, &row, 0), "Acme");
    assert_eq!(engine.format_cell(&state, &row, 1), "$1,234.50");
    assert_eq!(engine.format_cell(&state, &row, 5), "");
}

#[test]
fn test_filter_reports_flag_invalid_input() {
    let engine = engine();
    let state = start(&engine);
    let state = engine
        .reduce(state, GridEvent::update_filter("total", ">lots"))
        .state;
    let reports = engine.filter_reports(&state);
    assert_eq!(reports.len(), 1);
    assert!(reports[0].is_invalid());
    assert!(engine.query_for(&state, QueryPurpose::Display).filters.is_empty());
}

fn loaded(engine: &GridEngine, count: usize) -> GridState {
    let rows: Vec<Row> = (0..count)
        .map(|index| vec![Value::from(format!("row {}", index))])
        .collect();
    engine
        .reduce(
            start(engine),
            GridEvent::DataFetched {
                request_id: 1,
                response: response(rows),
            },
        )
        .state
}

#[test]
fn test_growing_fetch_window_keeps_visible_rows() {
    let engine = engine();
    let state = loaded(&engine, 100);

    let update = engine.reduce(state, GridEvent::RowAccessed { index: 95 });
    let generation = update.state.fetch.generation();
    let update = engine.reduce(update.state, GridEvent::IncreaseFetch { generation });
    let (request_id, request) = only_query(&update.effects);

    assert_eq!(request.limit, Some(200));
    assert_eq!(update.state.rows().len(), 100);
    assert!(!update.state.is_loading());

    let more: Vec<Row> = (0..150).map(|index| vec![Value::from(index as i64)]).collect();
    let state = engine
        .reduce(
            update.state,
            GridEvent::DataFetched {
                request_id,
                response: response(more),
            },
        )
        .state;
    assert_eq!(state.rows().len(), 150);
}

#[test]
fn test_bulk_start_keeps_rows_while_requerying() {
    let engine = engine();
    let state = loaded(&engine, 3);

    let update = engine.reduce(state, GridEvent::StartBulkAction { index: 0 });
    assert_eq!(only_query(&update.effects).0, 2);
    assert_eq!(update.state.rows().len(), 3);

    let update = engine.reduce(update.state, GridEvent::CloseBulk);
    assert_eq!(only_query(&update.effects).0, 3);
    assert_eq!(update.state.rows().len(), 3);
}

#[test]
fn test_refresh_and_filter_change_clear_rows() {
    let engine = engine();
    let state = loaded(&engine, 3);
    let state = engine.reduce(state, GridEvent::Refresh).state;
    assert!(state.is_loading());

    let state = loaded(&engine, 3);
    let state = engine
        .reduce(state, GridEvent::update_filter("name", "acme"))
        .state;
    assert!(state.fetched_rows.is_none());
}
