//! Time filter rewriting.
//!
//! Filters over time dimensions at month, quarter or year grain compare a
//! truncated column against a period literal. Rewriting the comparison into
//! a half-open interval over the raw column (`col >= start AND col < end`)
//! keeps the predicate sargable: the engine can prune row groups without
//! evaluating `date_trunc` per row.

use crate::error::{CompileError, CompileResult};
use crate::ir::FilterOp;
use crate::model::TimeGrain;
use crate::sql::expr::{lit_str, Expr, ExprExt};

/// A plain calendar date. No timezone, no arithmetic beyond period bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl PeriodDate {
    fn to_literal(self) -> Expr {
        lit_str(&format!(
            "{:04}-{:02}-{:02}",
            self.year, self.month, self.day
        ))
    }
}

/// The half-open interval `[start, end)` covered by a period literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodBounds {
    pub start: PeriodDate,
    pub end: PeriodDate,
}

/// Parse a period literal for the given grain and compute its bounds.
///
/// Accepted spellings: `YYYY` (year), `YYYY-MM` (month or quarter, the
/// month names the quarter's first month at quarter grain), `YYYY-MM-DD`
/// (any grain; truncated down to the period start).
pub fn period_bounds(field: &str, value: &str, grain: TimeGrain) -> CompileResult<PeriodBounds> {
    let invalid = || CompileError::InvalidTimeLiteral {
        field: field.into(),
        value: value.into(),
        granularity: grain.to_string(),
    };

    let mut parts = value.split('-');
    let year: i32 = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
    let month: u32 = match parts.next() {
        Some(m) => m.parse().map_err(|_| invalid())?,
        None => 1,
    };
    let day: u32 = match parts.next() {
        Some(d) => d.parse().map_err(|_| invalid())?,
        None => 1,
    };
    if parts.next().is_some() || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return Err(invalid());
    }

    let bounds = match grain {
        TimeGrain::Day => {
            let start = PeriodDate { year, month, day };
            PeriodBounds {
                start,
                end: next_day(start),
            }
        }
        TimeGrain::Month => {
            let start = PeriodDate {
                year,
                month,
                day: 1,
            };
            let end = if month == 12 {
                PeriodDate {
                    year: year + 1,
                    month: 1,
                    day: 1,
                }
            } else {
                PeriodDate {
                    year,
                    month: month + 1,
                    day: 1,
                }
            };
            PeriodBounds { start, end }
        }
        TimeGrain::Quarter => {
            let quarter_start = ((month - 1) / 3) * 3 + 1;
            let start = PeriodDate {
                year,
                month: quarter_start,
                day: 1,
            };
            let end = if quarter_start == 10 {
                PeriodDate {
                    year: year + 1,
                    month: 1,
                    day: 1,
                }
            } else {
                PeriodDate {
                    year,
                    month: quarter_start + 3,
                    day: 1,
                }
            };
            PeriodBounds { start, end }
        }
        TimeGrain::Year => PeriodBounds {
            start: PeriodDate {
                year,
                month: 1,
                day: 1,
            },
            end: PeriodDate {
                year: year + 1,
                month: 1,
                day: 1,
            },
        },
    };
    Ok(bounds)
}

fn next_day(date: PeriodDate) -> PeriodDate {
    let days = days_in_month(date.year, date.month);
    if date.day < days {
        PeriodDate {
            day: date.day + 1,
            ..date
        }
    } else if date.month < 12 {
        PeriodDate {
            year: date.year,
            month: date.month + 1,
            day: 1,
        }
    } else {
        PeriodDate {
            year: date.year + 1,
            month: 1,
            day: 1,
        }
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ => {
            if year % 4 == 0 && (year % 100 != 0 || year % 400 == 0) {
                29
            } else {
                28
            }
        }
    }
}

/// Rewrite a comparison over a time dimension at the given grain into an
/// interval predicate over the raw column expression.
pub fn rewrite_time_comparison(
    column: Expr,
    field: &str,
    op: FilterOp,
    value: &str,
    grain: TimeGrain,
) -> CompileResult<Expr> {
    let PeriodBounds { start, end } = period_bounds(field, value, grain)?;
    let start = start.to_literal();
    let end = end.to_literal();

    let predicate = match op {
        // Inside the period.
        FilterOp::Eq => column.clone().gte(start).and(column.lt(end)),
        // Anywhere outside the period.
        FilterOp::Ne => column.clone().lt(start).or(column.gte(end)).paren(),
        // Strictly after the period.
        FilterOp::Gt => column.gte(end),
        // In or after the period.
        FilterOp::Gte => column.gte(start),
        // Strictly before the period.
        FilterOp::Lt => column.lt(start),
        // In or before the period.
        FilterOp::Lte => column.lt(end),
        FilterOp::In | FilterOp::Like => {
            return Err(CompileError::InvalidTimeLiteral {
                field: field.into(),
                value: value.into(),
                granularity: grain.to_string(),
            })
        }
    };
    Ok(predicate)
}
