use super::*;
use crate::assembler::GridOptions;
use pretty_assertions::assert_eq;
use serde_json::json;
use tabula_core::{ColumnSpec, FieldKind, Schema};

fn engine() -> PageEngine {
    let options = GridOptions::new("Invoice").fallback_sorts(["id"]);
    let schema = Schema::new().with_table(
        "Invoice",
        [("name", FieldKind::Text), ("total", FieldKind::Money)],
    );
    PageEngine::new(GridEngine::new(options, schema), Some("u1".into()))
}

fn view_row(id: &str, name: &str, is_default: bool) -> Vec<Value> {
    let view = ViewSpec {
        is_default,
        default_sort_column: Some("total".into()),
        default_sort_descending: true,
        ..ViewSpec::new(id, name, "Invoice")
            .with_column(ColumnSpec::new("name", "Name", 150.0).with_filter("acme"))
            .with_column(ColumnSpec::new("total", "Total", 90.0))
    };
    vec![Value::Json(record_to_json(&view.to_record().unwrap()))]
}

fn filter_spec(id: &str, view: &str, name: &str, is_default: bool) -> SavedFilterSpec {
    SavedFilterSpec {
        id: id.into(),
        record_version: None,
        table: "Invoice".into(),
        view: Some(view.into()),
        user: Some("u1".into()),
        name: name.into(),
        columns: vec![FilterColumnSpec {
            column: "total".into(),
            filter: ">100".into(),
        }],
        is_default,
    }
}

fn filter_row(spec: &SavedFilterSpec) -> Vec<Value> {
    vec![Value::Json(record_to_json(&spec.to_record().unwrap()))]
}

fn loaded(
    engine: &PageEngine,
    request: PageRequest,
    remembered: RememberedPreferences,
    views: Vec<Vec<Value>>,
    filters: Vec<Vec<Value>>,
) -> PageUpdate {
    let state = engine.initialize(request, remembered).state;
    let state = engine
        .reduce(
            state,
            PageEvent::ViewsLoaded {
                response: QueryResponse {
                    full_count: views.len(),
                    rows: views,
                },
            },
        )
        .state;
    engine.reduce(
        state,
        PageEvent::FiltersLoaded {
            response: QueryResponse {
                full_count: filters.len(),
                rows: filters,
            },
        },
    )
}

fn two_views() -> Vec<Vec<Value>> {
    vec![view_row("v1", "All", false), view_row("v2", "Mine", true)]
}

fn grid_query(effects: &[PageEffect]) -> QueryRequest {
    effects
        .iter()
        .find_map(|effect| match effect {
            PageEffect::Grid(Effect::Query { request, .. }) => Some(request.clone()),
            _ => None,
        })
        .expect("grid query")
}

#[test]
fn test_initialize_loads_views_and_filters() {
    let engine = engine();
    let update = engine.initialize(PageRequest::default(), RememberedPreferences::default());
    assert!(update.state.grid.is_none());

    let [PageEffect::LoadViews { request: views }, PageEffect::LoadFilters { request: filters }] =
        update.effects.as_slice()
    else {
        panic!("unexpected effects {:?}", update.effects);
    };
    assert_eq!(views.table_name, "View");
    assert_eq!(views.columns, vec!["."]);
    assert_eq!(views.sorts, vec!["name"]);
    assert_eq!(
        views.filters,
        vec![FilterDetail::column("table", ColumnFilter::equal("Invoice"))]
    );
    assert_eq!(filters.table_name, "Filter");
    assert_eq!(
        filters.filters[1],
        FilterDetail::column("user", ColumnFilter::equal("u1"))
    );
}

#[test]
fn test_grid_waits_for_both_lists() {
    let engine = engine();
    let state = engine
        .initialize(PageRequest::default(), RememberedPreferences::default())
        .state;
    let update = engine.reduce(
        state,
        PageEvent::ViewsLoaded {
            response: QueryResponse {
                rows: two_views(),
                full_count: 2,
            },
        },
    );
    assert!(update.state.grid.is_none());
    assert!(update.effects.is_empty());
}

#[test]
fn test_default_view_is_selected_with_its_column_filters() {
    let engine = engine();
    let update = loaded(
        &engine,
        PageRequest::default(),
        RememberedPreferences::default(),
        two_views(),
        vec![],
    );

    assert_eq!(update.state.view_id.as_deref(), Some("v2"));
    let request = grid_query(&update.effects);
    assert_eq!(
        request.filters,
        vec![FilterDetail::column("name", ColumnFilter::like("%acme%"))]
    );
    assert_eq!(request.sorts, vec!["-total", "id"]);
}

#[test]
fn test_view_selection_order() {
    let engine = engine();
    let mut remembered = RememberedPreferences::default();
    remembered
        .selected_views
        .insert("Invoice".into(), "v1".into());

    let update = loaded(
        &engine,
        PageRequest::default(),
        remembered.clone(),
        two_views(),
        vec![],
    );
    assert_eq!(update.state.view_id.as_deref(), Some("v1"));

    let update = loaded(
        &engine,
        PageRequest::default().view("v2"),
        remembered,
        two_views(),
        vec![],
    );
    assert_eq!(update.state.view_id.as_deref(), Some("v2"));

    let update = loaded(
        &engine,
        PageRequest::default().view("nope"),
        RememberedPreferences::default(),
        two_views(),
        vec![],
    );
    assert_eq!(update.state.view_id.as_deref(), Some("v1"));
}

#[test]
fn test_no_views_leaves_page_idle() {
    let engine = engine();
    let update = loaded(
        &engine,
        PageRequest::default(),
        RememberedPreferences::default(),
        vec![],
        vec![],
    );
    assert!(update.state.grid.is_none());
    assert!(update.effects.is_empty());

    let update = engine.reduce(update.state, PageEvent::PageActivated);
    assert!(update.effects.is_empty());
}

#[test]
fn test_default_saved_filter_replaces_column_filters() {
    let engine = engine();
    let saved = filter_spec("f1", "v2", "Big", true);
    let update = loaded(
        &engine,
        PageRequest::default(),
        RememberedPreferences::default(),
        two_views(),
        vec![filter_row(&saved)],
    );

    assert_eq!(update.state.filter_id.as_deref(), Some("f1"));
    let request = grid_query(&update.effects);
    assert_eq!(
        request.filters,
        vec![FilterDetail::column("total", ColumnFilter::greater(100i64))]
    );
}

#[test]
fn test_parameters_override_filters_and_sort() {
    let engine = engine();
    let request = PageRequest::default()
        .parameter("sort", "name")
        .parameter("sort_reversed", "false")
        .parameter("total", "<5");
    let update = loaded(
        &engine,
        request,
        RememberedPreferences::default(),
        two_views(),
        vec![],
    );

    let grid = update.state.grid.as_ref().unwrap();
    assert_eq!(grid.sort_column.as_deref(), Some("name"));
    assert!(!grid.sort_descending);
    assert_eq!(grid.filter_texts.get("total").map(String::as_str), Some("<5"));
    assert_eq!(grid.filter_texts.get("name").map(String::as_str), Some("acme"));
    assert!(update.state.parameters.is_none());
}

#[test]
fn test_remembered_widths_seed_grid() {
    let engine = engine();
    let mut remembered = RememberedPreferences::default();
    let mut widths = IndexMap::new();
    widths.insert("total".to_string(), 300.0);
    remembered.widths.insert("v2".into(), widths);

    let update = loaded(
        &engine,
        PageRequest::default(),
        remembered,
        two_views(),
        vec![],
    );
    let grid = update.state.grid.unwrap();
    assert_eq!(grid.column_widths.get("total"), Some(&300.0));
    assert_eq!(grid.column_widths.get("name"), Some(&150.0));
}

#[test]
fn test_resize_is_remembered() {
    let engine = engine();
    let state = loaded(
        &engine,
        PageRequest::default(),
        RememberedPreferences::default(),
        two_views(),
        vec![],
    )
    .state;
    let update = engine.reduce(
        state,
        PageEvent::Grid(GridEvent::ResizeColumn {
            column: "name".into(),
            width: 42.0,
        }),
    );
    assert!(matches!(
        update.effects.as_slice(),
        [PageEffect::Grid(Effect::PersistWidths { .. })]
    ));
    assert_eq!(
        update.state.remembered.widths["v2"].get("name"),
        Some(&42.0)
    );
}

#[test]
fn test_select_view_resets_grid_and_remembers() {
    let engine = engine();
    let state = loaded(
        &engine,
        PageRequest::default(),
        RememberedPreferences::default(),
        two_views(),
        vec![],
    )
    .state;
    let update = engine.reduce(state, PageEvent::SelectView { view: "v1".into() });

    assert_eq!(update.state.view_id.as_deref(), Some("v1"));
    assert_eq!(
        update.effects[0],
        PageEffect::RememberView {
            table: "Invoice".into(),
            view_id: "v1".into()
        }
    );
    assert_eq!(grid_query(&update.effects).columns[..2], ["name", "total"]);
    assert_eq!(
        update.state.remembered.selected_views.get("Invoice").map(String::as_str),
        Some("v1")
    );
}

#[test]
fn test_save_filter_dialog() {
    let engine = engine();
    let state = loaded(
        &engine,
        PageRequest::default(),
        RememberedPreferences::default(),
        two_views(),
        vec![],
    )
    .state;
    let state = engine.reduce(state, PageEvent::SaveFilter).state;
    assert!(state.saving_filter);
    let state = engine
        .reduce(state, PageEvent::SaveFilterName("Acme only".into()))
        .state;
    let update = engine.reduce(state, PageEvent::SaveFilterConfirm);

    assert!(!update.state.saving_filter);
    let filters = update.state.filters.as_ref().unwrap();
    assert_eq!(filters.len(), 1);
    assert_eq!(update.state.filter_id.as_ref(), Some(&filters[0].id));

    let [PageEffect::StoreFilter { request }] = update.effects.as_slice() else {
        panic!("unexpected effects {:?}", update.effects);
    };
    assert_eq!(request.table_name, "Filter");
    assert_eq!(request.form, "Invoice");
    let stored = SavedFilterSpec::from_value(&Value::Json(record_to_json(&request.record))).unwrap();
    assert_eq!(stored.name, "Acme only");
    assert_eq!(stored.view.as_deref(), Some("v2"));
    assert!(!stored.is_default);
    assert_eq!(
        stored.columns,
        vec![
            FilterColumnSpec {
                column: "name".into(),
                filter: "acme".into()
            },
            FilterColumnSpec {
                column: "total".into(),
                filter: "".into()
            },
        ]
    );

    let mut echoed = request.record.clone();
    echoed.insert("recordVersion".into(), Value::Int(1));
    let state = engine
        .reduce(update.state, PageEvent::FilterSaved { record: echoed })
        .state;
    let filters = state.filters.unwrap();
    assert_eq!(filters.len(), 1);
    assert_eq!(filters[0].record_version, Some(1));
}

#[test]
fn test_save_filter_cancel() {
    let engine = engine();
    let state = loaded(
        &engine,
        PageRequest::default(),
        RememberedPreferences::default(),
        two_views(),
        vec![],
    )
    .state;
    let state = engine.reduce(state, PageEvent::SaveFilter).state;
    let update = engine.reduce(state, PageEvent::SaveFilterCancel);
    assert!(!update.state.saving_filter);
    assert!(update.effects.is_empty());
}

#[test]
fn test_filter_saved_keeps_name_order() {
    let engine = engine();
    let state = loaded(
        &engine,
        PageRequest::default(),
        RememberedPreferences::default(),
        two_views(),
        vec![filter_row(&filter_spec("f1", "v2", "beta", false))],
    )
    .state;
    let record = filter_spec("f2", "v2", "Alpha", false).to_record().unwrap();
    let state = engine.reduce(state, PageEvent::FilterSaved { record }).state;
    let names: Vec<_> = state
        .filters
        .unwrap()
        .into_iter()
        .map(|filter| filter.name)
        .collect();
    assert_eq!(names, vec!["Alpha", "beta"]);
}

#[test]
fn test_delete_selected_filter() {
    let engine = engine();
    let saved = filter_spec("f1", "v2", "Big", true);
    let state = loaded(
        &engine,
        PageRequest::default(),
        RememberedPreferences::default(),
        two_views(),
        vec![filter_row(&saved)],
    )
    .state;
    let update = engine.reduce(state, PageEvent::DeleteFilter);

    assert_eq!(update.state.filter_id, None);
    assert!(update.state.filters.as_ref().unwrap().is_empty());
    assert_eq!(
        update.effects,
        vec![PageEffect::DeleteFilter {
            request: DeleteRequest {
                table_name: "Filter".into(),
                form: "Invoice".into(),
                record_id: "f1".into(),
            }
        }]
    );

    let update = engine.reduce(update.state, PageEvent::DeleteFilter);
    assert!(update.effects.is_empty());
}

#[test]
fn test_manage_filters_saves_changes() {
    let engine = engine();
    let rows = vec![
        filter_row(&filter_spec("f1", "v2", "Big", true)),
        filter_row(&filter_spec("f2", "v2", "Small", false)),
        filter_row(&filter_spec("f3", "v2", "Keep", false)),
        filter_row(&filter_spec("f4", "v1", "Other view", false)),
    ];
    let state = loaded(
        &engine,
        PageRequest::default().parameter("filter", "f3"),
        RememberedPreferences::default(),
        two_views(),
        rows,
    )
    .state;

    let state = engine.reduce(state, PageEvent::ManageFilters).state;
    let managing = state.managing_filters.as_ref().unwrap();
    assert_eq!(managing.names.len(), 3);
    assert_eq!(managing.default.as_deref(), Some("f1"));

    let mut state = state;
    for event in [
        PageEvent::ManageFilterDelete {
            filter: "f1".into(),
        },
        PageEvent::ManageFilterRename {
            filter: "f2".into(),
            name: "Tiny".into(),
        },
        PageEvent::ManageFilterSetDefault {
            filter: Some("f2".into()),
        },
    ] {
        state = engine.reduce(state, event).state;
    }
    let update = engine.reduce(state, PageEvent::SaveManageFilters);
    assert!(update.state.managing_filters.is_none());
    assert_eq!(update.effects.len(), 2);

    match &update.effects[0] {
        PageEffect::DeleteFilter { request } => assert_eq!(request.record_id, "f1"),
        other => panic!("expected delete, got {:?}", other),
    }
    match &update.effects[1] {
        PageEffect::StoreFilter { request } => {
            assert_eq!(request.record.get("name"), Some(&Value::from("Tiny")));
            assert_eq!(request.record.get("default"), Some(&Value::Bool(true)));
        }
        other => panic!("expected store, got {:?}", other),
    }
}

#[test]
fn test_hide_manage_filters_discards_edits() {
    let engine = engine();
    let state = loaded(
        &engine,
        PageRequest::default(),
        RememberedPreferences::default(),
        two_views(),
        vec![filter_row(&filter_spec("f1", "v2", "Big", false))],
    )
    .state;
    let state = engine.reduce(state, PageEvent::ManageFilters).state;
    let state = engine
        .reduce(
            state,
            PageEvent::ManageFilterDelete {
                filter: "f1".into(),
            },
        )
        .state;
    let update = engine.reduce(state, PageEvent::HideManageFilters);
    assert!(update.state.managing_filters.is_none());
    let update = engine.reduce(update.state, PageEvent::SaveManageFilters);
    assert!(update.effects.is_empty());
}

#[test]
fn test_page_activated_refreshes_grid() {
    let engine = engine();
    let state = loaded(
        &engine,
        PageRequest::default(),
        RememberedPreferences::default(),
        two_views(),
        vec![],
    )
    .state;
    let before = state.grid.as_ref().unwrap().latest_request_id();
    let update = engine.reduce(state, PageEvent::PageActivated);
    assert_eq!(
        update.state.grid.unwrap().latest_request_id(),
        before + 1
    );
}

#[test]
fn test_undecodable_rows_are_skipped() {
    let engine = engine();
    let update = loaded(
        &engine,
        PageRequest::default(),
        RememberedPreferences::default(),
        vec![vec![Value::Json(json!({"id": "broken"}))], view_row("v1", "All", false)],
        vec![],
    );
    assert_eq!(update.state.views.as_ref().unwrap().len(), 1);
    assert_eq!(update.state.view_id.as_deref(), Some("v1"));
}
