use tabled::Tabled;

#[derive(Tabled)]
pub struct DistributionRow {
    pub metric: String,
    pub count: usize,
    #[tabled(display = "float2")]
    pub avg: Option<f64>,
    #[tabled(display = "float2")]
    pub min: Option<f64>,
    #[tabled(display = "float2")]
    pub med: Option<f64>,
    #[tabled(display = "float2")]
    pub max: Option<f64>,
    #[tabled(rename = "p(90)", display = "float2")]
    pub p90: Option<f64>,
    #[tabled(rename = "p(95)", display = "float2")]
    pub p95: Option<f64>,
    #[tabled(rename = "p(99)", display = "float2")]
    pub p99: Option<f64>,
}

#[derive(Tabled)]
pub struct RateRow {
    pub metric: String,
    #[tabled(display = "percent")]
    pub rate: Option<f64>,
    #[tabled(rename = "true")]
    pub trues: u64,
    #[tabled(rename = "false")]
    pub falses: u64,
}

#[derive(Tabled)]
pub struct ThresholdRow {
    pub metric: String,
    pub threshold: String,
    #[tabled(display = "float2")]
    pub observed: Option<f64>,
    pub status: String,
}

fn float2(n: &Option<f64>) -> String {
    match n {
        Some(n) => format!("{:.2}", n),
        None => "-".to_string(),
    }
}

fn percent(n: &Option<f64>) -> String {
    match n {
        Some(n) => format!("{:.4}%", n * 100.0),
        None => "-".to_string(),
    }
}
