//! Integration test: load a collapsed stack file and run every query of the
//! engine against it, checking that tree, rows and tooltips agree.

use std::sync::Arc;

use flame_tree_core::differential::DifferentialProvider;
use flame_tree_core::metrics::{DataType, MetricType, MetricValue};
use flame_tree_core::parsers::collapsed::{CollapsedOptions, parse_collapsed};
use flame_tree_core::{
    CancellationToken, FlameGraphConfig, FlameGraphEngine, SimpleTreeProvider, Symbol,
    WeightedTreeSet,
};
use flame_tree_protocol::{EntryType, FetchParameters, QueryBuilder, Status, TreeModel};

type Provider = SimpleTreeProvider<Symbol, Symbol>;

fn load() -> WeightedTreeSet<Symbol, Symbol> {
    let data = include_bytes!("fixtures/sample.folded");
    let options = CollapsedOptions {
        group_by_first_frame: true,
    };
    parse_collapsed(data, &options).expect("failed to parse fixture")
}

fn engine() -> FlameGraphEngine<Provider> {
    let provider = SimpleTreeProvider::new("sample", load())
        .with_weight_type(MetricType::new("Samples", DataType::Number))
        .with_metric(MetricType::new("Self", DataType::Number), |t| {
            MetricValue::Integer(t.self_weight())
        });
    FlameGraphEngine::new(Arc::new(provider), FlameGraphConfig::default())
}

fn tree(engine: &FlameGraphEngine<Provider>, params: &FetchParameters) -> TreeModel {
    let response = engine.fetch_tree(params, &CancellationToken::new());
    assert!(response.is_completed(), "{}", response.message);
    response.model.expect("completed tree has a model")
}

#[test]
fn tree_matches_the_fixture() {
    let engine = engine();
    let model = tree(&engine, &FetchParameters::new());

    let trace: Vec<_> = model.of_type(EntryType::Trace).collect();
    assert_eq!(trace.len(), 1);
    assert_eq!(trace[0].parent_id, -1);
    assert_eq!(trace[0].name, "trace");
    assert_eq!(trace[0].end_time, 65);

    let levels: Vec<(&str, i64)> = model
        .of_type(EntryType::Level)
        .map(|e| (e.name.as_str(), e.end_time))
        .collect();
    assert_eq!(levels, vec![("worker-1", 65), ("worker-2", 19)]);

    let depths: Vec<usize> = model
        .of_type(EntryType::Function)
        .filter_map(|e| e.depth)
        .collect();
    assert_eq!(depths, vec![0, 1, 2, 0, 1, 2, 3]);
}

#[test]
fn repeated_builds_are_identical() {
    let engine = engine();
    let params = FetchParameters::new();
    let first = tree(&engine, &params);
    let second = tree(&engine, &params);
    assert_eq!(first, second);

    // A different request in between does not disturb the ids either.
    tree(&engine, &QueryBuilder::new().group_by(0).build());
    assert_eq!(tree(&engine, &params), first);
}

#[test]
fn rows_tile_each_element() {
    let engine = engine();
    let model = tree(&engine, &FetchParameters::new());
    let times: Vec<i64> = (0..=65).collect();
    let rows = engine
        .fetch_rows(&QueryBuilder::new().times(times).build(), &CancellationToken::new())
        .model
        .expect("rows");

    for entry in model.of_type(EntryType::Function) {
        let level = model.entry(entry.parent_id).expect("level entry");
        let row = rows.row(entry.id).expect("row for every function entry");
        let mut cursor = 0;
        for state in &row.states {
            assert_eq!(state.start_time, cursor, "gap in row {}", entry.id);
            cursor = state.end_time();
        }
        assert_eq!(cursor, level.end_time, "row {} ends early", entry.id);
    }

    // Trace and level entries have no states.
    assert!(rows.row(0).expect("trace row").states.is_empty());
}

#[test]
fn tooltips_agree_with_rows() {
    let engine = engine();
    let model = tree(&engine, &FetchParameters::new());
    let cancel = CancellationToken::new();
    let times: Vec<i64> = (0..=65).collect();
    let rows = engine
        .fetch_rows(&QueryBuilder::new().times(times).build(), &cancel)
        .model
        .expect("rows");

    let mut checked = 0;
    for entry in model.of_type(EntryType::Function) {
        for state in &rows.row(entry.id).expect("row").states {
            let query = QueryBuilder::new()
                .times([state.start_time])
                .items([entry.id])
                .build();
            let tooltip = engine.fetch_tooltip(&query, &cancel).model.expect("tooltip");
            match &state.label {
                Some(label) => {
                    let node = engine
                        .find_node_at(entry.id, state.start_time)
                        .expect("node under a labelled state");
                    assert_eq!(node.object().as_str(), label);
                    assert_eq!(tooltip.get("Samples"), Some(state.duration.to_string().as_str()));
                    checked += 1;
                }
                None => assert!(tooltip.is_empty()),
            }
        }
    }
    assert!(checked > 10);
}

#[test]
fn cancelled_rows_have_no_model() {
    let engine = engine();
    tree(&engine, &FetchParameters::new());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let response = engine.fetch_rows(&QueryBuilder::new().times([0, 10]).build(), &cancel);
    assert_eq!(response.status, Status::Cancelled);
    assert!(response.model.is_none());
}

#[test]
fn group_by_all_merges_threads() {
    let engine = engine();
    let model = tree(&engine, &QueryBuilder::new().group_by(0).build());
    let levels: Vec<(&str, i64)> = model
        .of_type(EntryType::Level)
        .map(|e| (e.name.as_str(), e.end_time))
        .collect();
    assert_eq!(levels, vec![("All", 84)]);
    assert_eq!(model.of_type(EntryType::Function).count(), 4);

    // main merged from both threads: 60 + 10 samples.
    let depth0 = model
        .of_type(EntryType::Function)
        .find(|e| e.depth == Some(0))
        .expect("depth 0 entry");
    let node = engine.find_node_at(depth0.id, 0).expect("heaviest root");
    assert_eq!(node.object().as_str(), "main");
    assert_eq!(node.weight(), 70);
}

#[test]
fn malformed_parameters_fail() {
    let engine = engine();
    let cancel = CancellationToken::new();

    let mut bad_group = FetchParameters::new();
    bad_group.insert("group_by", -2);
    let response = engine.fetch_tree(&bad_group, &cancel);
    assert_eq!(response.status, Status::Failed);
    assert_eq!(response.message, "Incorrect query parameters");

    tree(&engine, &FetchParameters::new());
    let mut bad_times = FetchParameters::new();
    bad_times.insert("requested_times", "soon");
    let response = engine.fetch_rows(&bad_times, &cancel);
    assert_eq!(response.status, Status::Failed);
    assert!(response.model.is_none());
}

#[test]
fn readers_run_alongside_rebuilds() {
    let engine = engine();
    tree(&engine, &FetchParameters::new());
    let grouped = QueryBuilder::new().group_by(0).build();
    let ungrouped = FetchParameters::new();

    std::thread::scope(|scope| {
        scope.spawn(|| {
            for i in 0..50 {
                let params = if i % 2 == 0 { &grouped } else { &ungrouped };
                let response = engine.fetch_tree(params, &CancellationToken::new());
                assert_eq!(response.status, Status::Completed);
            }
        });
        for _ in 0..4 {
            scope.spawn(|| {
                for t in 0..50 {
                    let query = QueryBuilder::new().times([t]).build();
                    let response = engine.fetch_rows(&query, &CancellationToken::new());
                    assert_eq!(response.status, Status::Completed);
                    let query = QueryBuilder::new().times([t]).items([2]).build();
                    let response = engine.fetch_tooltip(&query, &CancellationToken::new());
                    assert_eq!(response.status, Status::Completed);
                }
            });
        }
    });
}

#[test]
fn profile_against_itself_is_all_equal() {
    let set = load();
    let provider = DifferentialProvider::new("self", &set, &set);
    let engine = FlameGraphEngine::new(Arc::new(provider), FlameGraphConfig::default());
    let cancel = CancellationToken::new();
    let response = engine.fetch_tree(&FetchParameters::new(), &cancel);
    assert_eq!(response.status, Status::Completed);

    let times: Vec<i64> = (0..=84).collect();
    let rows = engine
        .fetch_rows(&QueryBuilder::new().times(times).build(), &cancel)
        .model
        .expect("rows");
    let styled: Vec<_> = rows
        .rows
        .iter()
        .flat_map(|r| &r.states)
        .filter_map(|s| s.style.as_ref())
        .collect();
    assert!(!styled.is_empty());
    assert!(styled.iter().all(|s| s.parent_key.as_deref() == Some("equal")));
}
