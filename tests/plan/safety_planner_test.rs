//! Planner integration: estimation probe in, bucket grid out.

use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;

use facet::error::EngineError;
use facet::ir::QueryIR;
use facet::model::{
    Dataset, Dimension, HighCardinality, HighCardinalityPolicy, Measure, SemanticModel,
};
use facet::plan::{PlannerOptions, SafetyPlanner, MAX_BUCKETS, MIN_FORCED_BUCKETS};
use facet::registry::Registry;
use facet::run::{BatchStream, Connection, RowBatch, Scalar, Table};

struct Rows(usize);

impl RowBatch for Rows {
    fn row_count(&self) -> usize {
        self.0
    }
}

/// Connection that answers every materialized query with one fixed table
/// and records the SQL it saw.
struct ProbeConn {
    table: Table,
    queries: Mutex<Vec<String>>,
}

impl ProbeConn {
    fn new(table: Table) -> Self {
        Self {
            table,
            queries: Mutex::new(vec![]),
        }
    }

    fn estimation(columns: &[(&str, u64)]) -> Self {
        Self::new(Table::new(
            columns.iter().map(|(n, _)| n.to_string()).collect(),
            vec![columns.iter().map(|(_, v)| Scalar::UInt(*v)).collect()],
        ))
    }
}

#[async_trait]
impl Connection for ProbeConn {
    type Batch = Rows;

    async fn send(&self, _sql: &str) -> Result<BatchStream<Rows>, EngineError> {
        Ok(Box::pin(stream::empty()))
    }

    async fn query(&self, sql: &str) -> Result<Table, EngineError> {
        self.queries.lock().unwrap().push(sql.to_string());
        Ok(self.table.clone())
    }

    fn cancel(&self) {}
}

fn registry() -> Registry {
    Registry::new()
        .with_dataset(Dataset::relation("vendas_ds", "vendas"))
        .with_model(
            SemanticModel::new("vendas", "vendas_ds")
                .with_alias("v")
                .with_dimension(Dimension::new("uf", "v.uf"))
                .with_dimension(Dimension::new("pedido_id", "v.pedido_id"))
                .with_measure(Measure::sum("receita", "v.valor")),
        )
}

fn query() -> QueryIR {
    QueryIR::semantic("vendas")
        .with_dimension("uf")
        .with_dimension("pedido_id")
        .with_measure("receita")
}

#[tokio::test]
async fn test_wide_estimate_partitions() {
    let registry = registry();
    let conn = ProbeConn::estimation(&[
        ("estimated_groups", 500_000),
        ("uf", 27),
        ("pedido_id", 480_000),
    ]);

    let plan = SafetyPlanner::new(&registry)
        .plan_execution(&conn, &query(), false)
        .await
        .unwrap();

    assert!(plan.enabled);
    assert_eq!(plan.bucket_count, 7); // ceil(500_000 / 75_000)
    assert_eq!(plan.bucket_keys[0], "pedido_id");
    assert_eq!(plan.estimated_groups, 500_000);

    let queries = conn.queries.lock().unwrap();
    assert_eq!(queries.len(), 1);
    assert!(queries[0].contains("APPROX_COUNT_DISTINCT"));
    assert!(queries[0].contains("\"estimated_groups\""));
}

#[tokio::test]
async fn test_narrow_estimate_declines() {
    let registry = registry();
    let conn = ProbeConn::estimation(&[
        ("estimated_groups", 5_000),
        ("uf", 27),
        ("pedido_id", 4_900),
    ]);

    let plan = SafetyPlanner::new(&registry)
        .plan_execution(&conn, &query(), false)
        .await
        .unwrap();
    assert!(!plan.enabled);
}

#[tokio::test]
async fn test_forced_plan_has_minimum_buckets() {
    let registry = registry();
    let conn = ProbeConn::estimation(&[
        ("estimated_groups", 5_000),
        ("uf", 27),
        ("pedido_id", 4_900),
    ]);

    let plan = SafetyPlanner::new(&registry)
        .plan_execution(&conn, &query(), true)
        .await
        .unwrap();
    assert!(plan.enabled);
    assert_eq!(plan.bucket_count, MIN_FORCED_BUCKETS);
}

#[tokio::test]
async fn test_bucket_count_capped() {
    let registry = registry();
    let conn = ProbeConn::estimation(&[
        ("estimated_groups", 2_000_000_000),
        ("uf", 27),
        ("pedido_id", 1_900_000_000),
    ]);

    let plan = SafetyPlanner::new(&registry)
        .plan_execution(&conn, &query(), false)
        .await
        .unwrap();
    assert_eq!(plan.bucket_count, MAX_BUCKETS);
}

#[tokio::test]
async fn test_no_dimensions_never_partitions() {
    let registry = registry();
    let conn = ProbeConn::estimation(&[("estimated_groups", 500_000)]);
    let ir = QueryIR::semantic("vendas").with_measure("receita");

    let plan = SafetyPlanner::new(&registry)
        .plan_execution(&conn, &ir, true)
        .await
        .unwrap();
    assert!(!plan.enabled);
    // No probe either: the decision needs no engine round trip.
    assert!(conn.queries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_raw_queries_never_partition() {
    let registry = registry();
    let conn = ProbeConn::estimation(&[("estimated_groups", 500_000)]);
    let ir = QueryIR::raw("vendas_ds");

    let plan = SafetyPlanner::new(&registry)
        .plan_execution(&conn, &ir, true)
        .await
        .unwrap();
    assert!(!plan.enabled);
}

#[tokio::test]
async fn test_model_policy_overrides_thresholds() {
    let registry = Registry::new()
        .with_dataset(Dataset::relation("vendas_ds", "vendas"))
        .with_model(
            SemanticModel::new("vendas", "vendas_ds")
                .with_alias("v")
                .with_dimension(Dimension::new("uf", "v.uf"))
                .with_dimension(Dimension::new("pedido_id", "v.pedido_id"))
                .with_measure(Measure::sum("receita", "v.valor"))
                .with_high_cardinality(HighCardinality::Policy(HighCardinalityPolicy {
                    enabled: Some(true),
                    target_per_bucket: Some(10_000),
                    threshold: Some(50_000),
                    limit_multiplier: None,
                })),
        );
    let conn = ProbeConn::estimation(&[
        ("estimated_groups", 60_000),
        ("uf", 27),
        ("pedido_id", 59_000),
    ]);

    let plan = SafetyPlanner::new(&registry)
        .plan_execution(&conn, &query(), false)
        .await
        .unwrap();
    assert!(plan.enabled);
    assert_eq!(plan.bucket_count, 6); // ceil(60_000 / 10_000)
}

#[tokio::test]
async fn test_limit_raises_the_bar() {
    let registry = registry();
    let conn = ProbeConn::estimation(&[
        ("estimated_groups", 300_000),
        ("uf", 27),
        ("pedido_id", 290_000),
    ]);

    // 300k groups would partition unlimited, but LIMIT 50_000 replaces the
    // threshold with 500k.
    let plan = SafetyPlanner::new(&registry)
        .plan_execution(&conn, &query().with_limit(50_000), false)
        .await
        .unwrap();
    assert!(!plan.enabled);
}

#[tokio::test]
async fn test_small_limit_partitions_eagerly() {
    let registry = registry();
    let conn = ProbeConn::estimation(&[
        ("estimated_groups", 50_000),
        ("uf", 27),
        ("pedido_id", 49_000),
    ]);

    // 50k groups run direct unlimited, but LIMIT 100 lowers the threshold
    // to 1_000 and caps each bucket at 400 groups.
    let plan = SafetyPlanner::new(&registry)
        .plan_execution(&conn, &query().with_limit(100), false)
        .await
        .unwrap();
    assert!(plan.enabled);
    assert_eq!(plan.bucket_count, 125);
    assert_eq!(plan.bucket_keys[0], "pedido_id");
}

#[tokio::test]
async fn test_missing_estimation_column_is_engine_error() {
    let registry = registry();
    let conn = ProbeConn::new(Table::new(vec!["something_else".into()], vec![vec![]]));

    let err = SafetyPlanner::new(&registry)
        .plan_execution(&conn, &query(), false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("estimated_groups"), "got {err}");
}

#[tokio::test]
async fn test_custom_options() {
    let registry = registry();
    let conn = ProbeConn::estimation(&[
        ("estimated_groups", 30_000),
        ("uf", 27),
        ("pedido_id", 29_000),
    ]);

    let options = PlannerOptions {
        group_threshold: 20_000,
        target_per_bucket: 5_000,
        ..PlannerOptions::default()
    };
    let plan = SafetyPlanner::new(&registry)
        .with_options(options)
        .plan_execution(&conn, &query(), false)
        .await
        .unwrap();
    assert!(plan.enabled);
    assert_eq!(plan.bucket_count, 6); // ceil(30_000 / 5_000)
}
