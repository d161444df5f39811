use crate::Protocol;

/// Raw threshold expressions attached to one metric, k6 style.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSet {
    pub metric: String,
    pub expressions: Vec<String>,
}

impl ThresholdSet {
    /// Failure rate below 5% and p95 latency below 500ms.
    pub fn defaults(protocol: Protocol) -> Vec<Self> {
        vec![
            Self {
                metric: format!("{protocol}_req_failed"),
                expressions: vec!["rate<0.05".to_string()],
            },
            Self {
                metric: format!("{protocol}_req_duration"),
                expressions: vec!["p(95)<500".to_string()],
            },
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdAgg {
    Avg,
    Min,
    Max,
    Count,
    Rate,
    /// Percentile in `(0, 100]`.
    P(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdExpr {
    pub agg: ThresholdAgg,
    pub op: ThresholdOp,
    pub value: f64,
}

impl ThresholdExpr {
    pub fn passes(&self, observed: f64) -> bool {
        match self.op {
            ThresholdOp::Lt => observed < self.value,
            ThresholdOp::Lte => observed <= self.value,
            ThresholdOp::Gt => observed > self.value,
            ThresholdOp::Gte => observed >= self.value,
            ThresholdOp::Eq => observed == self.value,
        }
    }
}

pub fn parse_threshold_expr(raw: &str) -> Result<ThresholdExpr, String> {
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err("empty threshold".to_string());
    }

    // Two-character operators first so `<=` is not read as `<`.
    let ops = [
        ("<=", ThresholdOp::Lte),
        (">=", ThresholdOp::Gte),
        ("==", ThresholdOp::Eq),
        ("<", ThresholdOp::Lt),
        (">", ThresholdOp::Gt),
    ];
    let (op_pos, op_len, op) = ops
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
        .ok_or_else(|| format!("missing operator in `{raw}`"))?;

    let (left, right_with_op) = s.split_at(op_pos);
    let right = &right_with_op[op_len..];
    if left.is_empty() || right.is_empty() {
        return Err(format!("incomplete threshold `{raw}`"));
    }

    let agg = match left.to_ascii_lowercase().as_str() {
        "avg" => ThresholdAgg::Avg,
        "min" => ThresholdAgg::Min,
        "max" => ThresholdAgg::Max,
        "count" => ThresholdAgg::Count,
        "rate" => ThresholdAgg::Rate,
        other => {
            let inner = other
                .strip_prefix("p(")
                .and_then(|v| v.strip_suffix(')'))
                .ok_or_else(|| format!("unknown aggregation `{left}` in `{raw}`"))?;
            let p: f64 = inner
                .parse()
                .map_err(|_| format!("invalid percentile in `{raw}`"))?;
            if !(p > 0.0 && p <= 100.0) {
                return Err(format!("percentile out of range in `{raw}`"));
            }
            ThresholdAgg::P(p)
        }
    };

    let value: f64 = right
        .parse()
        .ok()
        .filter(|v: &f64| v.is_finite())
        .ok_or_else(|| format!("invalid numeric value in `{raw}`"))?;

    Ok(ThresholdExpr { agg, op, value })
}

/// Parses `metric: expr[, expr...]` entries separated by `;`.
///
/// Entries naming the same metric are merged, keeping first-seen order.
pub fn parse_threshold_sets(raw: &str) -> Result<Vec<ThresholdSet>, String> {
    let mut out: Vec<ThresholdSet> = Vec::new();

    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (metric, exprs) = entry
            .split_once(':')
            .ok_or_else(|| format!("expected `metric: expression`, got `{entry}`"))?;
        let metric = metric.trim();
        if metric.is_empty() {
            return Err(format!("missing metric name in `{entry}`"));
        }

        let expressions: Vec<String> = exprs
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect();
        if expressions.is_empty() {
            return Err(format!("no expressions for metric `{metric}`"));
        }

        match out.iter_mut().find(|s| s.metric == metric) {
            Some(set) => set.expressions.extend(expressions),
            None => out.push(ThresholdSet {
                metric: metric.to_string(),
                expressions,
            }),
        }
    }

    Ok(out)
}
