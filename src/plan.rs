//! Adaptive partition planning.
//!
//! Before a query is forced down the partitioned path (statically, or after
//! an out-of-memory retry), the planner probes the engine with a cheap
//! HyperLogLog estimation query and sizes the bucket grid from the result:
//! enough buckets that each one aggregates roughly `target_per_bucket`
//! groups, hashed over the highest-cardinality dimensions.

use tracing::debug;

use crate::compile::{SqlBuilder, ESTIMATED_GROUPS_COLUMN};
use crate::error::{EngineError, QueryError};
use crate::ir::{QueryIR, QueryMode};
use crate::model::HighCardinalityPolicy;
use crate::registry::Registry;
use crate::run::Connection;

/// Estimated group count above which an unforced query is partitioned.
pub const DEFAULT_GROUP_THRESHOLD: u64 = 150_000;
/// Groups each bucket should aggregate.
pub const DEFAULT_TARGET_PER_BUCKET: u64 = 75_000;
/// With LIMIT n, the partition threshold becomes `n *` this.
pub const DEFAULT_LIMIT_THRESHOLD_MULTIPLIER: u64 = 10;
/// With LIMIT n, per-bucket target is capped at `n *` this.
pub const DEFAULT_LIMIT_TARGET_MULTIPLIER: u64 = 4;
/// Hard cap on the bucket grid.
pub const MAX_BUCKETS: u64 = 8192;
/// Forced partitioning never runs with fewer buckets than this.
pub const MIN_FORCED_BUCKETS: u64 = 4;

/// How many bucket keys may be combined, and how much headroom their
/// cardinality product needs over the bucket count before we stop adding.
const MAX_BUCKET_KEYS: usize = 3;
const KEY_PRODUCT_HEADROOM: u64 = 4;

/// Planner thresholds, overridable per model through its
/// high-cardinality policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerOptions {
    pub group_threshold: u64,
    pub target_per_bucket: u64,
    pub limit_threshold_multiplier: u64,
    pub limit_target_multiplier: u64,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            group_threshold: DEFAULT_GROUP_THRESHOLD,
            target_per_bucket: DEFAULT_TARGET_PER_BUCKET,
            limit_threshold_multiplier: DEFAULT_LIMIT_THRESHOLD_MULTIPLIER,
            limit_target_multiplier: DEFAULT_LIMIT_TARGET_MULTIPLIER,
        }
    }
}

impl PlannerOptions {
    /// Apply per-model overrides on top of these options.
    pub fn with_policy(mut self, policy: &HighCardinalityPolicy) -> Self {
        if let Some(threshold) = policy.threshold {
            self.group_threshold = threshold;
        }
        if let Some(target) = policy.target_per_bucket {
            self.target_per_bucket = target.max(1);
        }
        if let Some(multiplier) = policy.limit_multiplier {
            self.limit_threshold_multiplier = multiplier;
        }
        self
    }

    /// A LIMIT bounds the output, so it replaces the absolute threshold:
    /// bounded previews partition at much lower cardinality.
    fn threshold_for(&self, limit: Option<u64>) -> u64 {
        match limit {
            Some(n) => n.saturating_mul(self.limit_threshold_multiplier),
            None => self.group_threshold,
        }
    }

    /// A LIMIT also caps the per-bucket target, keeping each bucket's
    /// working set proportional to what the caller will actually read.
    fn target_for(&self, limit: Option<u64>) -> u64 {
        let target = match limit {
            Some(n) => self
                .target_per_bucket
                .min(n.saturating_mul(self.limit_target_multiplier)),
            None => self.target_per_bucket,
        };
        target.max(1)
    }
}

/// The outcome of planning: run direct, or run this bucket grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    pub enabled: bool,
    pub bucket_count: u64,
    /// Dimension names hashed into the bucket predicate.
    pub bucket_keys: Vec<String>,
    pub estimated_groups: u64,
}

impl PartitionPlan {
    /// Run the query directly.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            bucket_count: 1,
            bucket_keys: vec![],
            estimated_groups: 0,
        }
    }
}

/// Decides whether, and how, a query is split into hash buckets.
#[derive(Debug, Clone, Copy)]
pub struct SafetyPlanner<'a> {
    registry: &'a Registry,
    options: PlannerOptions,
}

impl<'a> SafetyPlanner<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            options: PlannerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PlannerOptions) -> Self {
        self.options = options;
        self
    }

    /// Probe the engine and size the bucket grid. `force` skips the
    /// threshold check (used after an out-of-memory failure) but still
    /// runs the estimation, since bucket count and keys depend on it.
    pub async fn plan_execution<C: Connection>(
        &self,
        conn: &C,
        ir: &QueryIR,
        force: bool,
    ) -> Result<PartitionPlan, QueryError> {
        // Nothing to hash without group keys; the direct path is the only
        // option for global aggregates and raw queries.
        if ir.mode == QueryMode::Raw || ir.dimensions.is_empty() {
            return Ok(PartitionPlan::disabled());
        }

        let model = self.registry.model(&ir.model)?;
        let options = match model.high_cardinality_policy() {
            Some(policy) => self.options.with_policy(policy),
            None => self.options,
        };

        let builder = SqlBuilder::new(self.registry);
        let sql = builder.build_estimation_query(ir)?;
        let table = conn.query(&sql).await?;

        let estimated = table.u64(ESTIMATED_GROUPS_COLUMN).ok_or_else(|| {
            EngineError::new(format!(
                "estimation result missing column '{ESTIMATED_GROUPS_COLUMN}'"
            ))
        })?;
        let mut cardinalities = vec![];
        for dimension in &ir.dimensions {
            let cardinality = table.u64(dimension).ok_or_else(|| {
                EngineError::new(format!("estimation result missing column '{dimension}'"))
            })?;
            cardinalities.push((dimension.clone(), cardinality));
        }

        let plan = decide(estimated, &cardinalities, ir.limit, force, &options);
        debug!(
            model = %ir.model,
            estimated_groups = estimated,
            enabled = plan.enabled,
            buckets = plan.bucket_count,
            keys = ?plan.bucket_keys,
            "partition plan"
        );
        Ok(plan)
    }
}

/// Pure planning decision from an estimation result.
///
/// Bucket count is `ceil(estimated / target)` clamped to `[1, MAX_BUCKETS]`;
/// a forced plan gets at least [`MIN_FORCED_BUCKETS`]. Keys are chosen
/// greedily by descending cardinality until their product comfortably
/// exceeds the bucket count, up to three keys.
pub fn decide(
    estimated_groups: u64,
    cardinalities: &[(String, u64)],
    limit: Option<u64>,
    force: bool,
    options: &PlannerOptions,
) -> PartitionPlan {
    if cardinalities.is_empty() {
        return PartitionPlan::disabled();
    }
    if !force && estimated_groups <= options.threshold_for(limit) {
        return PartitionPlan::disabled();
    }

    let target = options.target_for(limit);
    let mut bucket_count = estimated_groups.div_ceil(target).clamp(1, MAX_BUCKETS);
    if force {
        bucket_count = bucket_count.max(MIN_FORCED_BUCKETS);
    }
    if bucket_count <= 1 {
        return PartitionPlan::disabled();
    }

    let mut ranked: Vec<&(String, u64)> = cardinalities.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut bucket_keys = vec![];
    let mut product: u64 = 1;
    for (name, cardinality) in ranked {
        if bucket_keys.len() >= MAX_BUCKET_KEYS {
            break;
        }
        if !bucket_keys.is_empty()
            && product >= bucket_count.saturating_mul(KEY_PRODUCT_HEADROOM)
        {
            break;
        }
        bucket_keys.push(name.clone());
        product = product.saturating_mul((*cardinality).max(1));
    }

    PartitionPlan {
        enabled: true,
        bucket_count,
        bucket_keys,
        estimated_groups,
    }
}
