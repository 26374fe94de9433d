use super::{Aggregation, Comparator};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ThresholdParseError {
    #[error("Threshold expression [{0}] has no comparator, expected one of <, <=, >, >=, ==, !=")]
    MissingComparator(String),
    #[error("Unknown aggregation [{0}], expected p(N), avg, min, max, med, count or rate")]
    UnknownAggregation(String),
    #[error("Percentile [{0}] must be a number between 0 and 100")]
    InvalidPercentile(String),
    #[error("Threshold limit [{0}] is not a number")]
    InvalidLimit(String),
}

const COMPARATORS: [(&str, Comparator); 6] = [
    ("<=", Comparator::Le),
    (">=", Comparator::Ge),
    ("==", Comparator::Eq),
    ("!=", Comparator::Ne),
    ("<", Comparator::Lt),
    (">", Comparator::Gt),
];

pub(super) fn parse_expression(
    expression: &str,
) -> Result<(Aggregation, Comparator, f64), ThresholdParseError> {
    let expression = expression.trim();

    let start = expression
        .find(['<', '>', '=', '!'])
        .ok_or_else(|| ThresholdParseError::MissingComparator(expression.to_string()))?;
    let (lhs, rest) = expression.split_at(start);

    let (symbol, comparator) = COMPARATORS
        .iter()
        .find(|(symbol, _)| rest.starts_with(symbol))
        .ok_or_else(|| ThresholdParseError::MissingComparator(expression.to_string()))?;

    let rhs = rest[symbol.len()..].trim();
    let limit = rhs
        .parse::<f64>()
        .ok()
        .filter(|l| l.is_finite())
        .ok_or_else(|| ThresholdParseError::InvalidLimit(rhs.to_string()))?;

    Ok((parse_aggregation(lhs.trim())?, *comparator, limit))
}

fn parse_aggregation(s: &str) -> Result<Aggregation, ThresholdParseError> {
    match s {
        "avg" => Ok(Aggregation::Avg),
        "min" => Ok(Aggregation::Min),
        "max" => Ok(Aggregation::Max),
        "med" => Ok(Aggregation::Med),
        "count" => Ok(Aggregation::Count),
        "rate" => Ok(Aggregation::Rate),
        _ => {
            let inner = s
                .strip_prefix("p(")
                .and_then(|s| s.strip_suffix(')'))
                .ok_or_else(|| ThresholdParseError::UnknownAggregation(s.to_string()))?;

            inner
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|p| (0.0..=100.0).contains(p))
                .map(Aggregation::Percentile)
                .ok_or_else(|| ThresholdParseError::InvalidPercentile(inner.to_string()))
        }
    }
}
