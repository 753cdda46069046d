//! Query compilation: semantic queries to engine SQL.
//!
//! [`SqlBuilder`] is a pure function from a query description plus registry
//! state to a SQL string. The same inputs always produce the same SQL, and
//! compilation never touches the engine. Semantic queries compile to a fixed
//! two-layer shape:
//!
//! ```text
//! WITH base AS (
//!     SELECT <dimension exprs>, <aggregates>
//!     FROM <fact> LEFT/INNER JOIN ...
//!     WHERE <row filters> [AND <bucket predicate>]
//!     GROUP BY ALL
//! )
//! SELECT <dimensions>, <measures and derived formulas>
//! FROM base
//! [WHERE <measure filters>]
//! [ORDER BY ...] [LIMIT ...] [OFFSET ...]
//! ```
//!
//! Semi-additive measures add a `boundary` CTE joined INNER against the row
//! set, restricting aggregation to one representative slice per group.

pub mod derived;
pub mod time;

use std::collections::HashSet;

use tracing::debug;

use crate::error::{CompileError, CompileResult};
use crate::ir::{FilterCondition, FilterOp, FilterValue, QueryIR, QueryMode, SortOrder};
use crate::model::{
    Aggregation, Dimension, Measure, NonAdditiveDimension, SemanticModel, TimeGrain,
};
use crate::registry::Registry;
use crate::sql::expr::{
    approx_count_distinct, avg, col, concat, count, count_distinct, count_star, date_trunc, hash,
    lit_bool, lit_float, lit_int, lit_null, lit_str, max, min, raw_sql, sum, Expr, ExprExt,
};
use crate::sql::query::{Cte, JoinClause, JoinType, OrderByExpr, Query, RelationRef, SelectExpr};

use self::derived::MeasureExpr;

/// Alias of the total-groups column in an estimation query result.
pub const ESTIMATED_GROUPS_COLUMN: &str = "estimated_groups";

const BASE_CTE: &str = "base";
const BOUNDARY_CTE: &str = "boundary";

/// Compiles query descriptions into SQL against a registry.
#[derive(Debug, Clone, Copy)]
pub struct SqlBuilder<'a> {
    registry: &'a Registry,
}

/// Bucket selection appended to the aggregation layer's WHERE clause.
struct BucketPredicate<'a> {
    keys: &'a [String],
    bucket_count: u64,
    bucket_index: u64,
}

impl<'a> SqlBuilder<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Compile the query to SQL.
    pub fn build(&self, ir: &QueryIR) -> CompileResult<String> {
        let query = match ir.mode {
            QueryMode::Raw => self.build_raw(ir)?,
            QueryMode::Semantic => self.build_semantic(ir, None, ir.limit)?,
        };
        let sql = query.to_sql();
        debug!(model = %ir.model, "compiled query");
        Ok(sql)
    }

    /// Compile the one-bucket variant: the aggregation layer only sees rows
    /// whose group keys hash into the selected bucket. Ordering applies
    /// within the bucket; a global OFFSET is not meaningful per bucket and
    /// is dropped.
    pub fn build_partitioned_query(
        &self,
        ir: &QueryIR,
        keys: &[String],
        bucket_count: u64,
        bucket_index: u64,
        remaining_limit: Option<u64>,
    ) -> CompileResult<String> {
        if ir.mode == QueryMode::Raw {
            return self.build(ir);
        }
        let bucket = BucketPredicate {
            keys,
            bucket_count,
            bucket_index,
        };
        let query = self.build_semantic(ir, Some(&bucket), remaining_limit)?;
        let sql = query.to_sql();
        debug!(
            model = %ir.model,
            bucket = bucket_index,
            buckets = bucket_count,
            "compiled bucket query"
        );
        Ok(sql)
    }

    /// Compile the cardinality-estimation probe for this query: one
    /// `approx_count_distinct` over the concatenated group key (aliased
    /// [`ESTIMATED_GROUPS_COLUMN`]) plus one per dimension (aliased by the
    /// dimension's name), over the same row set as the real query.
    pub fn build_estimation_query(&self, ir: &QueryIR) -> CompileResult<String> {
        let resolved = self.resolve(ir)?;
        let model = resolved.model;

        let mut select: Vec<SelectExpr> = vec![];
        if resolved.dimensions.is_empty() {
            select.push(lit_int(1).alias(ESTIMATED_GROUPS_COLUMN));
        } else {
            let group_key = concat_key(
                resolved
                    .dimensions
                    .iter()
                    .map(|d| d.value_expr())
                    .collect(),
            );
            select.push(approx_count_distinct(group_key).alias(ESTIMATED_GROUPS_COLUMN));
            for rd in &resolved.dimensions {
                select.push(approx_count_distinct(rd.value_expr()).alias(&rd.dim.name));
            }
        }

        let mut query = Query::new()
            .select(select)
            .from(self.fact_relation(model)?);
        for join in self.join_clauses(&resolved)? {
            query = query.join(join.join_type, join.relation, join.on);
        }
        if let Some(filters) = self.row_filter_clause(model, ir)? {
            query = query.filter(filters);
        }
        Ok(query.to_sql())
    }

    // -------------------------------------------------------------------------
    // Raw mode
    // -------------------------------------------------------------------------

    fn build_raw(&self, ir: &QueryIR) -> CompileResult<Query> {
        let dataset = self.registry.dataset(&ir.model)?;

        let mut query = Query::new();
        query = if ir.columns.is_empty() {
            query.select_star()
        } else {
            query.select(ir.columns.iter().map(|c| col(c)).collect::<Vec<_>>())
        };
        query = query.from(dataset.relation_ref());

        for filter in &ir.filters {
            let column = col(&filter.field);
            query = query.filter(filter_predicate(column, filter, filter.granularity)?);
        }

        let order_by = ir
            .order_by
            .iter()
            .map(|o| order_expr(col(&o.field), o.order))
            .collect::<Vec<_>>();
        if !order_by.is_empty() {
            query = query.order_by(order_by);
        }
        if let Some(limit) = ir.limit {
            query = query.limit(limit);
        }
        if let Some(offset) = ir.offset {
            query = query.offset(offset);
        }
        Ok(query)
    }

    // -------------------------------------------------------------------------
    // Semantic mode
    // -------------------------------------------------------------------------

    fn build_semantic(
        &self,
        ir: &QueryIR,
        bucket: Option<&BucketPredicate<'_>>,
        limit: Option<u64>,
    ) -> CompileResult<Query> {
        let resolved = self.resolve(ir)?;
        let model = resolved.model;
        let joins = self.join_clauses(&resolved)?;
        let row_filters = self.row_filter_clause(model, ir)?;

        // Aggregation layer.
        let mut select: Vec<SelectExpr> = vec![];
        for rd in &resolved.dimensions {
            select.push(rd.value_expr().alias(&rd.dim.name));
        }
        for measure in &resolved.base_measures {
            select.push(aggregate_expr(measure).alias(&measure.name));
        }

        let mut base = Query::new()
            .select(select)
            .from(self.fact_relation(model)?);
        for join in joins.iter().cloned() {
            base = base.join(join.join_type, join.relation, join.on);
        }

        if let Some(active) = &resolved.non_additive {
            let boundary = self.boundary_query(model, &joins, row_filters.clone(), active)?;
            base = base
                .with_cte(Cte::new(BOUNDARY_CTE, boundary))
                .inner_join(
                    RelationRef::table(BOUNDARY_CTE),
                    active.join_predicate(),
                );
        }

        if let Some(filters) = row_filters {
            base = base.filter(filters);
        }
        if let Some(bucket) = bucket {
            base = base.filter(self.bucket_predicate(&resolved, bucket)?);
        }
        if !resolved.dimensions.is_empty() {
            base = base.group_by_all();
        }

        // Projection layer.
        let mut select: Vec<SelectExpr> = vec![];
        for rd in &resolved.dimensions {
            select.push(SelectExpr::new(col(&rd.dim.name)));
        }
        for measure in &resolved.output_measures {
            if measure.is_derived() {
                let formula = MeasureExpr::parse(&measure.name, &measure.expr)?;
                let inlined = inline_formula(model, &formula)?;
                select.push(inlined.to_expr(&|name| col(name)).alias(&measure.name));
            } else {
                select.push(SelectExpr::new(col(&measure.name)));
            }
        }

        let mut outer = Query::new()
            .with_cte(Cte::new(BASE_CTE, base))
            .select(select)
            .from(RelationRef::table(BASE_CTE));

        // Post-aggregation filters compare against the aggregation layer's
        // output columns, so a plain WHERE carries HAVING semantics here.
        for filter in &ir.measure_filters {
            if !ir.measures.iter().any(|m| m == &filter.field) {
                return Err(CompileError::UnknownQueryField {
                    field: filter.field.clone(),
                });
            }
            outer = outer.filter(filter_predicate(col(&filter.field), filter, None)?);
        }

        let mut order_by = vec![];
        for spec in &ir.order_by {
            let in_output = ir.dimensions.iter().any(|d| d == &spec.field)
                || ir.measures.iter().any(|m| m == &spec.field);
            if !in_output {
                return Err(CompileError::UnknownQueryField {
                    field: spec.field.clone(),
                });
            }
            order_by.push(order_expr(col(&spec.field), spec.order));
        }
        if !order_by.is_empty() {
            outer = outer.order_by(order_by);
        }

        if let Some(limit) = limit {
            outer = outer.limit(limit);
        }
        if bucket.is_none() {
            if let Some(offset) = ir.offset {
                outer = outer.offset(offset);
            }
        }
        Ok(outer)
    }

    /// The boundary CTE for an active semi-additive rewrite: one row per
    /// grouping-key combination carrying the chosen boundary value of the
    /// non-additive dimension. Row filters apply; the bucket predicate does
    /// not, so every bucket agrees on the same boundary.
    fn boundary_query(
        &self,
        model: &SemanticModel,
        joins: &[JoinClause],
        row_filters: Option<Expr>,
        active: &ActiveNonAdditive<'_>,
    ) -> CompileResult<Query> {
        let mut select: Vec<SelectExpr> = vec![];
        for rd in &active.groupings {
            select.push(rd.value_expr().alias(&rd.dim.name));
        }
        let boundary_agg = match active.spec.window_choice.boundary_function() {
            "min" => min(raw_sql(&active.dimension.expr)),
            _ => max(raw_sql(&active.dimension.expr)),
        };
        select.push(boundary_agg.alias(&active.dimension.name));

        let mut query = Query::new()
            .select(select)
            .from(self.fact_relation(model)?);
        for join in joins.iter().cloned() {
            query = query.join(join.join_type, join.relation, join.on);
        }
        if let Some(filters) = row_filters {
            query = query.filter(filters);
        }
        if !active.groupings.is_empty() {
            query = query.group_by_all();
        }
        Ok(query)
    }

    fn bucket_predicate(
        &self,
        resolved: &Resolved<'_>,
        bucket: &BucketPredicate<'_>,
    ) -> CompileResult<Expr> {
        let mut key_exprs = vec![];
        for key in bucket.keys {
            let rd = resolved
                .dimensions
                .iter()
                .find(|rd| &rd.dim.name == key)
                .ok_or_else(|| CompileError::UnknownQueryField { field: key.clone() })?;
            key_exprs.push(rd.value_expr());
        }
        Ok(hash(concat_key(key_exprs))
            .modulo(lit_int(bucket.bucket_count as i64))
            .eq(lit_int(bucket.bucket_index as i64)))
    }

    // -------------------------------------------------------------------------
    // Name resolution
    // -------------------------------------------------------------------------

    fn resolve(&self, ir: &QueryIR) -> CompileResult<Resolved<'a>> {
        let model = self.registry.model(&ir.model)?;

        let mut dimensions = vec![];
        for name in &ir.dimensions {
            dimensions.push(self.resolve_dimension(model, ir, name)?);
        }

        let mut filter_dimensions = vec![];
        for filter in &ir.filters {
            let dim = model.dimension(&filter.field).ok_or_else(|| {
                CompileError::UnknownDimension {
                    model: model.name.clone(),
                    dimension: filter.field.clone(),
                }
            })?;
            filter_dimensions.push(dim);
        }

        let mut output_measures = vec![];
        let mut base_measures = vec![];
        let mut base_seen = HashSet::new();
        let lookup = |name: &str| -> CompileResult<Option<MeasureExpr>> {
            let measure = model.measure(name).ok_or_else(|| {
                CompileError::UnknownMeasure {
                    model: model.name.clone(),
                    measure: name.into(),
                }
            })?;
            if measure.is_derived() {
                Ok(Some(MeasureExpr::parse(name, &measure.expr)?))
            } else {
                Ok(None)
            }
        };
        for name in &ir.measures {
            let measure = model.measure(name).ok_or_else(|| {
                CompileError::UnknownMeasure {
                    model: model.name.clone(),
                    measure: name.clone(),
                }
            })?;
            output_measures.push(measure);
            if measure.is_derived() {
                let formula = MeasureExpr::parse(name, &measure.expr)?;
                for dep in derived::resolve_base_measures(name, &formula, &lookup)? {
                    if base_seen.insert(dep.clone()) {
                        // resolve_base_measures only yields existing base names.
                        if let Some(dep_measure) = model.measure(&dep) {
                            base_measures.push(dep_measure);
                        }
                    }
                }
            } else if base_seen.insert(name.clone()) {
                base_measures.push(measure);
            }
        }

        let non_additive = self.resolve_non_additive(model, ir, &base_measures)?;

        Ok(Resolved {
            model,
            dimensions,
            filter_dimensions,
            base_measures,
            output_measures,
            non_additive,
        })
    }

    fn resolve_dimension(
        &self,
        model: &'a SemanticModel,
        ir: &QueryIR,
        name: &str,
    ) -> CompileResult<ResolvedDim<'a>> {
        let dim = model
            .dimension(name)
            .ok_or_else(|| CompileError::UnknownDimension {
                model: model.name.clone(),
                dimension: name.into(),
            })?;
        Ok(ResolvedDim {
            dim,
            grain: effective_grain(ir, dim),
        })
    }

    /// Detect the active semi-additive rewrite, if any. A spec activates
    /// when its dimension is absent from the query output, or always when
    /// it declares explicit window groupings; two active specs must agree
    /// on both dimension and window choice.
    fn resolve_non_additive(
        &self,
        model: &'a SemanticModel,
        ir: &QueryIR,
        base_measures: &[&'a Measure],
    ) -> CompileResult<Option<ActiveNonAdditive<'a>>> {
        let mut active: Option<(&Measure, &NonAdditiveDimension)> = None;
        for measure in base_measures {
            let Some(spec) = &measure.non_additive_dimension else {
                continue;
            };
            let requested = ir.dimensions.iter().any(|d| d == &spec.dimension);
            if requested && spec.window_groupings.is_empty() {
                continue;
            }
            match active {
                None => active = Some((measure, spec)),
                Some((first, first_spec)) => {
                    if first_spec.dimension != spec.dimension
                        || first_spec.window_choice != spec.window_choice
                    {
                        return Err(CompileError::ConflictingNonAdditive {
                            first: first.name.clone(),
                            second: measure.name.clone(),
                        });
                    }
                }
            }
        }
        let Some((_, spec)) = active else {
            return Ok(None);
        };

        let dimension =
            model
                .dimension(&spec.dimension)
                .ok_or_else(|| CompileError::UnknownDimension {
                    model: model.name.clone(),
                    dimension: spec.dimension.clone(),
                })?;
        let grouping_names: Vec<&str> = if spec.window_groupings.is_empty() {
            ir.dimensions
                .iter()
                .filter(|d| *d != &spec.dimension)
                .map(|d| d.as_str())
                .collect()
        } else {
            spec.window_groupings.iter().map(|g| g.as_str()).collect()
        };
        let mut groupings = vec![];
        for name in grouping_names {
            groupings.push(self.resolve_dimension(model, ir, name)?);
        }
        Ok(Some(ActiveNonAdditive {
            dimension,
            spec,
            groupings,
        }))
    }

    // -------------------------------------------------------------------------
    // Relations and joins
    // -------------------------------------------------------------------------

    fn fact_relation(&self, model: &SemanticModel) -> CompileResult<RelationRef> {
        let dataset = self.registry.dataset(&model.dataset)?;
        Ok(dataset.relation_ref().with_alias(model.sql_alias()))
    }

    /// Join clauses for every join any used dimension lives on. A join
    /// referenced by a row filter is promoted LEFT to INNER: the filter
    /// already discards unmatched rows, and INNER lets the engine reorder.
    fn join_clauses(&self, resolved: &Resolved<'a>) -> CompileResult<Vec<JoinClause>> {
        let model = resolved.model;

        let mut used: Vec<&str> = vec![];
        let mut promoted: HashSet<&str> = HashSet::new();
        let mut record = |dim: &'a Dimension, filtered: bool| {
            if let Some(join) = &dim.join {
                if !used.contains(&join.as_str()) {
                    used.push(join);
                }
                if filtered {
                    promoted.insert(join);
                }
            }
        };
        for rd in &resolved.dimensions {
            record(rd.dim, false);
        }
        if let Some(active) = &resolved.non_additive {
            record(active.dimension, false);
            for rd in &active.groupings {
                record(rd.dim, false);
            }
        }
        for dim in &resolved.filter_dimensions {
            record(dim, true);
        }

        let mut clauses = vec![];
        // Model declaration order keeps the generated SQL stable.
        for join in &model.joins {
            if !used.contains(&join.name.as_str()) {
                continue;
            }
            let joined_model = self.registry.model(&join.model)?;
            let dataset = self.registry.dataset(&joined_model.dataset)?;
            let join_type = if promoted.contains(join.name.as_str()) {
                JoinType::Inner
            } else {
                JoinType::Left
            };
            clauses.push(JoinClause {
                join_type,
                relation: dataset.relation_ref().with_alias(join.sql_alias()),
                on: raw_sql(&join.on),
            });
        }
        // Anything still unmatched names a join the model does not declare.
        for name in used {
            if model.join(name).is_none() {
                return Err(CompileError::UnknownJoin {
                    model: model.name.clone(),
                    join: name.into(),
                });
            }
        }
        Ok(clauses)
    }

    /// All row filters ANDed, or None when the query has none.
    fn row_filter_clause(&self, model: &SemanticModel, ir: &QueryIR) -> CompileResult<Option<Expr>> {
        let mut clause: Option<Expr> = None;
        for filter in &ir.filters {
            let dim = model.dimension(&filter.field).ok_or_else(|| {
                CompileError::UnknownDimension {
                    model: model.name.clone(),
                    dimension: filter.field.clone(),
                }
            })?;
            let grain = if dim.is_time() {
                Some(
                    filter
                        .granularity
                        .or_else(|| effective_grain(ir, dim))
                        .unwrap_or(TimeGrain::Day),
                )
            } else {
                None
            };
            let predicate = filter_predicate(raw_sql(&dim.expr), filter, grain)?;
            clause = Some(match clause {
                Some(existing) => existing.and(predicate),
                None => predicate,
            });
        }
        Ok(clause)
    }
}

// =============================================================================
// Resolved query parts
// =============================================================================

struct Resolved<'a> {
    model: &'a SemanticModel,
    dimensions: Vec<ResolvedDim<'a>>,
    filter_dimensions: Vec<&'a Dimension>,
    /// Base aggregates the aggregation layer must compute: requested base
    /// measures plus the transitive dependencies of requested derived ones.
    base_measures: Vec<&'a Measure>,
    output_measures: Vec<&'a Measure>,
    non_additive: Option<ActiveNonAdditive<'a>>,
}

struct ResolvedDim<'a> {
    dim: &'a Dimension,
    /// Effective grain for a time dimension (query override, then the
    /// model default). None for non-time dimensions.
    grain: Option<TimeGrain>,
}

impl ResolvedDim<'_> {
    /// The group-key expression: the raw dimension expression, truncated to
    /// the effective grain for coarse time dimensions. The same expression
    /// feeds the select list, the estimation probe and the bucket hash, so
    /// a group always lands in exactly one bucket.
    fn value_expr(&self) -> Expr {
        let base = raw_sql(&self.dim.expr);
        match self.grain {
            Some(grain) if grain != TimeGrain::Day => date_trunc(grain.date_trunc_unit(), base),
            _ => base,
        }
    }
}

struct ActiveNonAdditive<'a> {
    dimension: &'a Dimension,
    spec: &'a NonAdditiveDimension,
    groupings: Vec<ResolvedDim<'a>>,
}

impl ActiveNonAdditive<'_> {
    /// ON predicate tying fact rows to their boundary slice.
    fn join_predicate(&self) -> Expr {
        let mut predicate = raw_sql(&self.dimension.expr)
            .eq(Expr::Column {
                table: Some(BOUNDARY_CTE.into()),
                column: self.dimension.name.clone(),
            });
        for rd in &self.groupings {
            predicate = predicate.and(rd.value_expr().eq(Expr::Column {
                table: Some(BOUNDARY_CTE.into()),
                column: rd.dim.name.clone(),
            }));
        }
        predicate
    }
}

// =============================================================================
// Expression helpers
// =============================================================================

fn effective_grain(ir: &QueryIR, dim: &Dimension) -> Option<TimeGrain> {
    if !dim.is_time() {
        return None;
    }
    ir.granularity
        .get(&dim.name)
        .copied()
        .or(dim.granularity)
        .or(Some(TimeGrain::Day))
}

/// The aggregate expression for a base measure, including its optional
/// `FILTER (WHERE ...)` modifier.
fn aggregate_expr(measure: &Measure) -> Expr {
    let arg = || raw_sql(measure.expr.trim());
    let expr = match measure.agg {
        Aggregation::Sum => sum(arg()),
        Aggregation::Count => {
            if measure.expr.trim() == "*" {
                count_star()
            } else {
                count(arg())
            }
        }
        Aggregation::CountDistinct => count_distinct(arg()),
        Aggregation::Avg => avg(arg()),
        Aggregation::Min => min(arg()),
        Aggregation::Max => max(arg()),
        // Derived measures never reach the aggregation layer.
        Aggregation::Derived => lit_null(),
    };
    match &measure.filter {
        Some(predicate) => expr.agg_filter(raw_sql(predicate)),
        None => expr,
    }
}

/// Substitute every reference to a derived measure with its parsed formula,
/// leaving a tree over base-measure references only. Cycles have already
/// been rejected during resolution.
fn inline_formula(model: &SemanticModel, formula: &MeasureExpr) -> CompileResult<MeasureExpr> {
    Ok(match formula {
        MeasureExpr::Ref(name) => {
            let measure = model.measure(name).ok_or_else(|| {
                CompileError::UnknownMeasure {
                    model: model.name.clone(),
                    measure: name.clone(),
                }
            })?;
            if measure.is_derived() {
                inline_formula(model, &MeasureExpr::parse(name, &measure.expr)?)?
            } else {
                MeasureExpr::Ref(name.clone())
            }
        }
        MeasureExpr::Number(n) => MeasureExpr::Number(*n),
        MeasureExpr::Binary { op, left, right } => MeasureExpr::Binary {
            op: *op,
            left: Box::new(inline_formula(model, left)?),
            right: Box::new(inline_formula(model, right)?),
        },
        MeasureExpr::Neg(inner) => MeasureExpr::Neg(Box::new(inline_formula(model, inner)?)),
    })
}

/// Render one filter condition against the given column expression.
///
/// Time dimensions at a coarse grain compare as half-open period intervals
/// over the raw column; everything else is a direct comparison.
fn filter_predicate(
    column: Expr,
    filter: &FilterCondition,
    grain: Option<TimeGrain>,
) -> CompileResult<Expr> {
    if let Some(grain) = grain {
        if grain != TimeGrain::Day {
            match (&filter.op, &filter.value) {
                (FilterOp::In, FilterValue::List(values))
                    if values.iter().all(|v| matches!(v, FilterValue::String(_))) =>
                {
                    let mut clause: Option<Expr> = None;
                    for value in values {
                        let FilterValue::String(s) = value else {
                            continue;
                        };
                        let interval = time::rewrite_time_comparison(
                            column.clone(),
                            &filter.field,
                            FilterOp::Eq,
                            s,
                            grain,
                        )?
                        .paren();
                        clause = Some(match clause {
                            Some(existing) => existing.or(interval),
                            None => interval,
                        });
                    }
                    if let Some(clause) = clause {
                        return Ok(clause.paren());
                    }
                }
                (op, FilterValue::String(value)) if *op != FilterOp::Like => {
                    return time::rewrite_time_comparison(
                        column,
                        &filter.field,
                        *op,
                        value,
                        grain,
                    );
                }
                _ => {}
            }
        }
    }

    Ok(match (&filter.op, &filter.value) {
        (FilterOp::In, FilterValue::List(values)) => {
            column.in_list(values.iter().map(scalar_literal).collect())
        }
        (FilterOp::In, value) => column.in_list(vec![scalar_literal(value)]),
        (FilterOp::Like, value) => column.like(scalar_literal(value)),
        (FilterOp::Eq, value) => column.eq(scalar_literal(value)),
        (FilterOp::Ne, value) => column.ne(scalar_literal(value)),
        (FilterOp::Gt, value) => column.gt(scalar_literal(value)),
        (FilterOp::Gte, value) => column.gte(scalar_literal(value)),
        (FilterOp::Lt, value) => column.lt(scalar_literal(value)),
        (FilterOp::Lte, value) => column.lte(scalar_literal(value)),
    })
}

fn scalar_literal(value: &FilterValue) -> Expr {
    match value {
        FilterValue::Bool(b) => lit_bool(*b),
        FilterValue::Int(n) => lit_int(*n),
        FilterValue::Float(f) => lit_float(*f),
        FilterValue::String(s) => lit_str(s),
        // Nested lists are only meaningful under IN, handled before this.
        FilterValue::List(_) => lit_null(),
    }
}

fn order_expr(expr: Expr, order: SortOrder) -> OrderByExpr {
    match order {
        SortOrder::Asc => OrderByExpr::asc(expr),
        SortOrder::Desc => OrderByExpr::desc(expr),
    }
}

/// The hashable group key: a single dimension directly, several via
/// NULL-safe concat.
fn concat_key(mut exprs: Vec<Expr>) -> Expr {
    if exprs.len() == 1 {
        exprs.remove(0)
    } else {
        concat(exprs)
    }
}
