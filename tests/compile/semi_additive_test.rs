//! Semi-additive measures: when the non-additive dimension is absent from
//! the output, aggregation is restricted to one boundary slice per group
//! through an INNER JOIN against a boundary CTE.

use facet::compile::SqlBuilder;
use facet::error::CompileError;
use facet::ir::{FilterCondition, QueryIR};
use facet::model::{
    Dataset, Dimension, Measure, NonAdditiveDimension, SemanticModel, WindowChoice,
};
use facet::registry::Registry;

fn snapshot(dimension: &str, choice: WindowChoice, groupings: &[&str]) -> NonAdditiveDimension {
    NonAdditiveDimension {
        dimension: dimension.into(),
        window_choice: choice,
        window_groupings: groupings.iter().map(|g| g.to_string()).collect(),
    }
}

fn registry() -> Registry {
    Registry::new()
        .with_dataset(Dataset::relation("saldos_ds", "saldos"))
        .with_model(
            SemanticModel::new("saldos", "saldos_ds")
                .with_alias("s")
                .with_dimension(Dimension::new("conta", "s.conta"))
                .with_dimension(Dimension::new("agencia", "s.agencia"))
                .with_dimension(Dimension::time("data_snapshot", "s.data_snapshot"))
                .with_dimension(Dimension::time("data_carga", "s.data_carga"))
                .with_measure(
                    Measure::sum("saldo", "s.saldo")
                        .with_non_additive(snapshot("data_snapshot", WindowChoice::Max, &[])),
                )
                .with_measure(
                    Measure::sum("saldo_inicial", "s.saldo")
                        .with_non_additive(snapshot("data_snapshot", WindowChoice::Min, &[])),
                )
                .with_measure(
                    Measure::sum("carga", "s.quantidade")
                        .with_non_additive(snapshot("data_carga", WindowChoice::Max, &[])),
                )
                .with_measure(
                    Measure::sum("saldo_por_conta", "s.saldo")
                        .with_non_additive(snapshot("data_snapshot", WindowChoice::Max, &["conta"])),
                )
                .with_measure(Measure::sum("movimentos", "s.movimentos")),
        )
}

#[test]
fn test_boundary_rewrite_when_dimension_absent() {
    let registry = registry();
    let sql = SqlBuilder::new(&registry)
        .build(
            &QueryIR::semantic("saldos")
                .with_dimension("conta")
                .with_measure("saldo"),
        )
        .unwrap();

    assert!(sql.contains("\"boundary\" AS ("), "sql was:\n{sql}");
    assert!(sql.contains("MAX(s.data_snapshot) AS \"data_snapshot\""));
    assert!(sql.contains("s.conta AS \"conta\""));
    assert!(
        sql.contains("INNER JOIN \"boundary\" ON s.data_snapshot = \"boundary\".\"data_snapshot\" AND s.conta = \"boundary\".\"conta\""),
        "sql was:\n{sql}"
    );
}

#[test]
fn test_no_rewrite_when_dimension_requested() {
    let registry = registry();
    let sql = SqlBuilder::new(&registry)
        .build(
            &QueryIR::semantic("saldos")
                .with_dimension("conta")
                .with_dimension("data_snapshot")
                .with_measure("saldo"),
        )
        .unwrap();

    assert!(!sql.contains("boundary"), "sql was:\n{sql}");
}

#[test]
fn test_min_window_choice() {
    let registry = registry();
    let sql = SqlBuilder::new(&registry)
        .build(
            &QueryIR::semantic("saldos")
                .with_dimension("conta")
                .with_measure("saldo_inicial"),
        )
        .unwrap();
    assert!(sql.contains("MIN(s.data_snapshot) AS \"data_snapshot\""), "sql was:\n{sql}");
}

#[test]
fn test_explicit_window_groupings() {
    // The spec's own grouping keys win over the query's dimensions.
    let registry = registry();
    let sql = SqlBuilder::new(&registry)
        .build(
            &QueryIR::semantic("saldos")
                .with_dimension("agencia")
                .with_measure("saldo_por_conta"),
        )
        .unwrap();

    let boundary = sql.split("INNER JOIN").next().unwrap();
    assert!(boundary.contains("s.conta AS \"conta\""), "sql was:\n{sql}");
    assert!(!boundary.contains("s.agencia AS \"agencia\"") || boundary.matches("s.agencia").count() == 1);
    assert!(
        sql.contains("ON s.data_snapshot = \"boundary\".\"data_snapshot\" AND s.conta = \"boundary\".\"conta\""),
        "sql was:\n{sql}"
    );
}

#[test]
fn test_global_boundary_without_groupings() {
    // No dimensions at all: one global boundary row, no GROUP BY in the
    // boundary CTE.
    let registry = registry();
    let sql = SqlBuilder::new(&registry)
        .build(&QueryIR::semantic("saldos").with_measure("saldo"))
        .unwrap();

    let boundary = sql.split("INNER JOIN").next().unwrap();
    assert!(boundary.contains("MAX(s.data_snapshot)"), "sql was:\n{sql}");
    assert!(!boundary.contains("GROUP BY"));
    assert!(
        sql.contains("INNER JOIN \"boundary\" ON s.data_snapshot = \"boundary\".\"data_snapshot\""),
        "sql was:\n{sql}"
    );
}

#[test]
fn test_row_filters_reach_boundary() {
    // The boundary must be computed over the same filtered row set,
    // otherwise a filtered-out slice could be chosen as the boundary.
    let registry = registry();
    let sql = SqlBuilder::new(&registry)
        .build(
            &QueryIR::semantic("saldos")
                .with_dimension("conta")
                .with_measure("saldo")
                .with_filter(FilterCondition::eq("agencia", "0001")),
        )
        .unwrap();

    let boundary = sql.split("INNER JOIN").next().unwrap();
    assert!(
        boundary.contains("WHERE s.agencia = '0001'"),
        "sql was:\n{sql}"
    );
}

#[test]
fn test_bucket_predicate_stays_out_of_boundary() {
    // Every bucket must agree on the boundary, so the hash predicate only
    // applies to the aggregation layer.
    let registry = registry();
    let ir = QueryIR::semantic("saldos")
        .with_dimension("conta")
        .with_measure("saldo");
    let sql = SqlBuilder::new(&registry)
        .build_partitioned_query(&ir, &["conta".into()], 4, 2, None)
        .unwrap();

    let boundary = sql.split("INNER JOIN").next().unwrap();
    assert!(!boundary.contains("HASH("), "sql was:\n{sql}");
    assert!(sql.contains("HASH(s.conta) % 4 = 2"));
    assert_eq!(sql.matches("HASH(").count(), 1);
}

#[test]
fn test_additive_measure_alongside_semi_additive() {
    // An additive measure in the same query aggregates over the same
    // restricted row set; there is exactly one aggregation layer.
    let registry = registry();
    let sql = SqlBuilder::new(&registry)
        .build(
            &QueryIR::semantic("saldos")
                .with_dimension("conta")
                .with_measure("saldo")
                .with_measure("movimentos"),
        )
        .unwrap();

    assert!(sql.contains("SUM(s.saldo) AS \"saldo\""), "sql was:\n{sql}");
    assert!(sql.contains("SUM(s.movimentos) AS \"movimentos\""));
    assert_eq!(sql.matches("GROUP BY ALL").count(), 2); // boundary + base
}

#[test]
fn test_explicit_groupings_rewrite_even_when_dimension_requested() {
    // Declared groupings force the rewrite: with the snapshot date in the
    // output, only each conta's boundary slice survives.
    let registry = registry();
    let sql = SqlBuilder::new(&registry)
        .build(
            &QueryIR::semantic("saldos")
                .with_dimension("conta")
                .with_dimension("data_snapshot")
                .with_measure("saldo_por_conta"),
        )
        .unwrap();

    assert!(sql.contains("\"boundary\" AS ("), "sql was:\n{sql}");
    assert!(
        sql.contains("ON s.data_snapshot = \"boundary\".\"data_snapshot\" AND s.conta = \"boundary\".\"conta\""),
        "sql was:\n{sql}"
    );
}

#[test]
fn test_conflicting_dimensions_rejected() {
    let registry = registry();
    let err = SqlBuilder::new(&registry)
        .build(
            &QueryIR::semantic("saldos")
                .with_dimension("conta")
                .with_measure("saldo")
                .with_measure("carga"),
        )
        .unwrap_err();
    assert_eq!(
        err,
        CompileError::ConflictingNonAdditive {
            first: "saldo".into(),
            second: "carga".into()
        }
    );
}

#[test]
fn test_conflicting_window_choices_rejected() {
    let registry = registry();
    let err = SqlBuilder::new(&registry)
        .build(
            &QueryIR::semantic("saldos")
                .with_dimension("conta")
                .with_measure("saldo")
                .with_measure("saldo_inicial"),
        )
        .unwrap_err();
    assert!(
        matches!(err, CompileError::ConflictingNonAdditive { .. }),
        "got {err:?}"
    );
}

#[test]
fn test_agreeing_specs_share_one_boundary() {
    let registry = registry();
    let sql = SqlBuilder::new(&registry)
        .build(
            &QueryIR::semantic("saldos")
                .with_dimension("conta")
                .with_measure("saldo")
                .with_measure("saldo_por_conta"),
        )
        .unwrap();
    assert_eq!(sql.matches("\"boundary\" AS (").count(), 1, "sql was:\n{sql}");
}
