//! End-to-end compilation tests: query descriptions in, SQL strings out.

use facet::compile::SqlBuilder;
use facet::error::CompileError;
use facet::ir::{FilterCondition, FilterOp, OrderSpec, QueryIR};
use facet::model::{
    Aggregation, Dataset, Dimension, Join, Measure, Relationship, SemanticModel, TimeGrain,
};
use facet::registry::Registry;

fn registry() -> Registry {
    Registry::new()
        .with_dataset(Dataset::relation("vendas_ds", "vendas"))
        .with_dataset(Dataset::files(
            "produtos_ds",
            vec![
                "produtos/part-0.parquet".into(),
                "produtos/part-1.parquet".into(),
            ],
        ))
        .with_model(
            SemanticModel::new("vendas", "vendas_ds")
                .with_alias("v")
                .with_dimension(Dimension::new("uf", "v.uf"))
                .with_dimension(
                    Dimension::time("data_venda", "v.data_venda").with_granularity(TimeGrain::Day),
                )
                .with_dimension(Dimension::new("produto_nome", "p.nome").with_join("produtos"))
                .with_measure(Measure::sum("receita", "v.valor"))
                .with_measure(Measure::new(
                    "custo_total",
                    Aggregation::Sum,
                    "v.custo",
                ))
                .with_measure(Measure::new(
                    "pedidos",
                    Aggregation::CountDistinct,
                    "v.pedido_id",
                ))
                .with_measure(
                    Measure::sum("receita_paga", "v.valor").with_filter("v.status = 'pago'"),
                )
                .with_measure(Measure::derived("ticket_medio", "${receita} / ${pedidos}"))
                .with_measure(Measure::derived("lucro", "${receita} - ${custo_total}"))
                .with_measure(Measure::derived("margem", "${lucro} / ${receita}"))
                .with_join(
                    Join::new("produtos", "produtos", "v.produto_id = p.id")
                        .with_alias("p")
                        .with_relationship(Relationship::ManyToOne),
                ),
        )
        .with_model(
            SemanticModel::new("produtos", "produtos_ds")
                .with_alias("p")
                .with_dimension(Dimension::new("nome", "p.nome")),
        )
}

#[test]
fn test_grouped_aggregation() {
    let registry = registry();
    let sql = SqlBuilder::new(&registry)
        .build(
            &QueryIR::semantic("vendas")
                .with_dimension("uf")
                .with_measure("receita"),
        )
        .unwrap();

    assert!(sql.starts_with("WITH \"base\" AS ("), "sql was:\n{sql}");
    assert!(sql.contains("v.uf AS \"uf\""));
    assert!(sql.contains("SUM(v.valor) AS \"receita\""));
    assert!(sql.contains("FROM \"vendas\" AS \"v\""));
    assert!(sql.contains("GROUP BY ALL"));
    assert!(sql.contains("FROM \"base\""));
}

#[test]
fn test_compilation_is_deterministic() {
    let registry = registry();
    let builder = SqlBuilder::new(&registry);
    let ir = QueryIR::semantic("vendas")
        .with_dimension("uf")
        .with_dimension("produto_nome")
        .with_measure("receita")
        .with_filter(FilterCondition::eq("uf", "SP"))
        .with_limit(50);
    assert_eq!(builder.build(&ir).unwrap(), builder.build(&ir).unwrap());
}

#[test]
fn test_unfiltered_join_stays_left() {
    let registry = registry();
    let sql = SqlBuilder::new(&registry)
        .build(
            &QueryIR::semantic("vendas")
                .with_dimension("produto_nome")
                .with_measure("receita"),
        )
        .unwrap();

    assert!(
        sql.contains("LEFT JOIN READ_PARQUET(['produtos/part-0.parquet', 'produtos/part-1.parquet']) AS \"p\" ON v.produto_id = p.id"),
        "sql was:\n{sql}"
    );
}

#[test]
fn test_filter_promotes_join_to_inner() {
    let registry = registry();
    let sql = SqlBuilder::new(&registry)
        .build(
            &QueryIR::semantic("vendas")
                .with_dimension("produto_nome")
                .with_measure("receita")
                .with_filter(FilterCondition::eq("produto_nome", "Bicicleta")),
        )
        .unwrap();

    assert!(sql.contains("INNER JOIN"), "sql was:\n{sql}");
    assert!(!sql.contains("LEFT JOIN"));
    assert!(sql.contains("WHERE p.nome = 'Bicicleta'"));
}

#[test]
fn test_join_pulled_in_by_filter_only() {
    // Filtering on a joined dimension without projecting it still needs
    // the join, promoted.
    let registry = registry();
    let sql = SqlBuilder::new(&registry)
        .build(
            &QueryIR::semantic("vendas")
                .with_dimension("uf")
                .with_measure("receita")
                .with_filter(FilterCondition::eq("produto_nome", "Bicicleta")),
        )
        .unwrap();

    assert!(sql.contains("INNER JOIN"), "sql was:\n{sql}");
}

#[test]
fn test_derived_measure_expansion() {
    let registry = registry();
    let sql = SqlBuilder::new(&registry)
        .build(
            &QueryIR::semantic("vendas")
                .with_dimension("uf")
                .with_measure("ticket_medio"),
        )
        .unwrap();

    // Both referenced aggregates land in the aggregation layer even though
    // neither was requested directly.
    assert!(sql.contains("SUM(v.valor) AS \"receita\""), "sql was:\n{sql}");
    assert!(sql.contains("COUNT(DISTINCT v.pedido_id) AS \"pedidos\""));
    assert!(sql.contains("\"receita\" / \"pedidos\" AS \"ticket_medio\""));
}

#[test]
fn test_nested_derived_measure() {
    let registry = registry();
    let sql = SqlBuilder::new(&registry)
        .build(
            &QueryIR::semantic("vendas")
                .with_dimension("uf")
                .with_measure("margem"),
        )
        .unwrap();

    assert!(sql.contains("SUM(v.custo) AS \"custo_total\""), "sql was:\n{sql}");
    assert!(sql.contains("(\"receita\" - \"custo_total\") / \"receita\" AS \"margem\""));
}

#[test]
fn test_derived_cycle_rejected() {
    let registry = Registry::new()
        .with_dataset(Dataset::relation("d", "t"))
        .with_model(
            SemanticModel::new("m", "d")
                .with_measure(Measure::derived("a", "${b} + 1"))
                .with_measure(Measure::derived("b", "${a} + 1")),
        );
    let err = SqlBuilder::new(&registry)
        .build(&QueryIR::semantic("m").with_measure("a"))
        .unwrap_err();
    assert!(matches!(err, CompileError::DerivedCycle { .. }), "got {err:?}");
}

#[test]
fn test_measure_row_filter_modifier() {
    let registry = registry();
    let sql = SqlBuilder::new(&registry)
        .build(
            &QueryIR::semantic("vendas")
                .with_dimension("uf")
                .with_measure("receita_paga"),
        )
        .unwrap();
    assert!(
        sql.contains("SUM(v.valor) FILTER (WHERE v.status = 'pago') AS \"receita_paga\""),
        "sql was:\n{sql}"
    );
}

#[test]
fn test_measure_filter_compiles_to_outer_where() {
    let registry = registry();
    let sql = SqlBuilder::new(&registry)
        .build(
            &QueryIR::semantic("vendas")
                .with_dimension("uf")
                .with_measure("receita")
                .with_measure_filter(FilterCondition::new(
                    "receita",
                    FilterOp::Gt,
                    1000_i64,
                )),
        )
        .unwrap();

    let outer = sql.split("FROM \"base\"").nth(1).unwrap();
    assert!(outer.contains("WHERE \"receita\" > 1000"), "sql was:\n{sql}");
}

#[test]
fn test_measure_filter_must_target_requested_measure() {
    let registry = registry();
    let err = SqlBuilder::new(&registry)
        .build(
            &QueryIR::semantic("vendas")
                .with_dimension("uf")
                .with_measure("receita")
                .with_measure_filter(FilterCondition::new("pedidos", FilterOp::Gt, 10_i64)),
        )
        .unwrap_err();
    assert_eq!(
        err,
        CompileError::UnknownQueryField {
            field: "pedidos".into()
        }
    );
}

#[test]
fn test_order_limit_offset() {
    let registry = registry();
    let sql = SqlBuilder::new(&registry)
        .build(
            &QueryIR::semantic("vendas")
                .with_dimension("uf")
                .with_measure("receita")
                .with_order(OrderSpec::desc("receita"))
                .with_order(OrderSpec::asc("uf"))
                .with_limit(10)
                .with_offset(20),
        )
        .unwrap();

    assert!(sql.contains("ORDER BY \"receita\" DESC, \"uf\" ASC"), "sql was:\n{sql}");
    assert!(sql.contains("LIMIT 10"));
    assert!(sql.contains("OFFSET 20"));
}

#[test]
fn test_order_by_must_be_in_output() {
    let registry = registry();
    let err = SqlBuilder::new(&registry)
        .build(
            &QueryIR::semantic("vendas")
                .with_dimension("uf")
                .with_measure("receita")
                .with_order(OrderSpec::desc("pedidos")),
        )
        .unwrap_err();
    assert!(matches!(err, CompileError::UnknownQueryField { .. }));
}

#[test]
fn test_in_filter() {
    let registry = registry();
    let sql = SqlBuilder::new(&registry)
        .build(
            &QueryIR::semantic("vendas")
                .with_dimension("uf")
                .with_measure("receita")
                .with_filter(FilterCondition::new(
                    "uf",
                    FilterOp::In,
                    facet::ir::FilterValue::List(vec!["SP".into(), "RJ".into()]),
                )),
        )
        .unwrap();
    assert!(sql.contains("v.uf IN ('SP', 'RJ')"), "sql was:\n{sql}");
}

#[test]
fn test_raw_mode_passthrough() {
    let registry = registry();
    let sql = SqlBuilder::new(&registry)
        .build(
            &QueryIR::raw("vendas_ds")
                .with_column("uf")
                .with_column("valor")
                .with_filter(FilterCondition::eq("uf", "SP"))
                .with_limit(5),
        )
        .unwrap();

    assert!(!sql.contains("WITH"), "sql was:\n{sql}");
    assert!(sql.contains("FROM \"vendas\""));
    assert!(sql.contains("\"uf\" = 'SP'"));
    assert!(sql.contains("LIMIT 5"));
}

#[test]
fn test_raw_mode_over_files() {
    let registry = registry();
    let sql = SqlBuilder::new(&registry)
        .build(&QueryIR::raw("produtos_ds"))
        .unwrap();
    assert!(
        sql.contains("READ_PARQUET(['produtos/part-0.parquet', 'produtos/part-1.parquet'])"),
        "sql was:\n{sql}"
    );
    assert!(sql.contains('*'));
}

#[test]
fn test_estimation_query_shape() {
    let registry = registry();
    let sql = SqlBuilder::new(&registry)
        .build_estimation_query(
            &QueryIR::semantic("vendas")
                .with_dimension("uf")
                .with_dimension("produto_nome")
                .with_measure("receita")
                .with_filter(FilterCondition::eq("uf", "SP")),
        )
        .unwrap();

    assert!(
        sql.contains("APPROX_COUNT_DISTINCT(CONCAT(v.uf, p.nome)) AS \"estimated_groups\""),
        "sql was:\n{sql}"
    );
    assert!(sql.contains("APPROX_COUNT_DISTINCT(v.uf) AS \"uf\""));
    assert!(sql.contains("APPROX_COUNT_DISTINCT(p.nome) AS \"produto_nome\""));
    assert!(sql.contains("WHERE v.uf = 'SP'"));
    assert!(!sql.contains("GROUP BY"));
}

#[test]
fn test_estimation_single_dimension_skips_concat() {
    let registry = registry();
    let sql = SqlBuilder::new(&registry)
        .build_estimation_query(
            &QueryIR::semantic("vendas")
                .with_dimension("uf")
                .with_measure("receita"),
        )
        .unwrap();
    assert!(
        sql.contains("APPROX_COUNT_DISTINCT(v.uf) AS \"estimated_groups\""),
        "sql was:\n{sql}"
    );
}

#[test]
fn test_bucket_predicate_single_key() {
    let registry = registry();
    let ir = QueryIR::semantic("vendas")
        .with_dimension("uf")
        .with_measure("receita")
        .with_limit(100)
        .with_offset(20);
    let sql = SqlBuilder::new(&registry)
        .build_partitioned_query(&ir, &["uf".into()], 8, 3, Some(40))
        .unwrap();

    assert!(sql.contains("HASH(v.uf) % 8 = 3"), "sql was:\n{sql}");
    // Remaining quota replaces the original limit; a global offset has no
    // per-bucket meaning.
    assert!(sql.contains("LIMIT 40"));
    assert!(!sql.contains("OFFSET"));
}

#[test]
fn test_bucket_predicate_concatenates_keys() {
    let registry = registry();
    let ir = QueryIR::semantic("vendas")
        .with_dimension("uf")
        .with_dimension("produto_nome")
        .with_measure("receita");
    let sql = SqlBuilder::new(&registry)
        .build_partitioned_query(&ir, &["uf".into(), "produto_nome".into()], 7, 0, None)
        .unwrap();
    assert!(
        sql.contains("HASH(CONCAT(v.uf, p.nome)) % 7 = 0"),
        "sql was:\n{sql}"
    );
}

#[test]
fn test_bucket_hash_uses_truncated_time_key() {
    // Hashing the raw date would scatter one month-group across buckets.
    let registry = registry();
    let ir = QueryIR::semantic("vendas")
        .with_dimension("data_venda")
        .with_granularity("data_venda", TimeGrain::Month)
        .with_measure("receita");
    let sql = SqlBuilder::new(&registry)
        .build_partitioned_query(&ir, &["data_venda".into()], 4, 1, None)
        .unwrap();
    assert!(
        sql.contains("HASH(DATE_TRUNC('month', v.data_venda)) % 4 = 1"),
        "sql was:\n{sql}"
    );
}

#[test]
fn test_time_dimension_truncated_in_select() {
    let registry = registry();
    let sql = SqlBuilder::new(&registry)
        .build(
            &QueryIR::semantic("vendas")
                .with_dimension("data_venda")
                .with_granularity("data_venda", TimeGrain::Month)
                .with_measure("receita"),
        )
        .unwrap();
    assert!(
        sql.contains("DATE_TRUNC('month', v.data_venda) AS \"data_venda\""),
        "sql was:\n{sql}"
    );
}

#[test]
fn test_unresolved_names() {
    let registry = registry();
    let builder = SqlBuilder::new(&registry);

    assert_eq!(
        builder.build(&QueryIR::semantic("nope")).unwrap_err(),
        CompileError::UnknownModel("nope".into())
    );
    assert!(matches!(
        builder
            .build(&QueryIR::semantic("vendas").with_dimension("cidade"))
            .unwrap_err(),
        CompileError::UnknownDimension { .. }
    ));
    assert!(matches!(
        builder
            .build(&QueryIR::semantic("vendas").with_measure("lucros"))
            .unwrap_err(),
        CompileError::UnknownMeasure { .. }
    ));
    assert_eq!(
        builder.build(&QueryIR::raw("nope")).unwrap_err(),
        CompileError::UnknownDataset("nope".into())
    );
}
