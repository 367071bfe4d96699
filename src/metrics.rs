use std::sync::LazyLock;

use prometheus::*;

static METRIC_INGEST_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "insight_ingest_count",
        "count of ingested images, by whether an embedding was indexed",
        &["embedded"]
    )
    .unwrap()
});

static METRIC_HARD_FAILURE_COUNT: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!("insight_hard_failure_count", "count of undecodable uploads").unwrap()
});

static METRIC_STAGE_FAILURE_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "insight_stage_failure_count",
        "count of failed or skipped analysis stages",
        &["stage"]
    )
    .unwrap()
});

static METRIC_SEARCH_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!("insight_search_duration", "duration of the per-query search in seconds")
        .unwrap()
});

static METRIC_INDEX_SIZE: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!("insight_index_size", "number of vectors in the similarity index").unwrap()
});

/// 记录一次成功入库
pub fn inc_ingest_count(embedded: bool) {
    METRIC_INGEST_COUNT.with_label_values(&[if embedded { "true" } else { "false" }]).inc();
}

pub fn inc_hard_failure_count() {
    METRIC_HARD_FAILURE_COUNT.inc();
}

pub fn inc_stage_failure_count(stage: &str) {
    METRIC_STAGE_FAILURE_COUNT.with_label_values(&[stage]).inc();
}

pub fn observe_search_duration(duration: f32) {
    METRIC_SEARCH_DURATION.observe(duration as f64);
}

pub fn set_index_size(size: usize) {
    METRIC_INDEX_SIZE.set(size as i64);
}

/// 以文本格式导出所有指标
pub fn gather_text() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    Ok(encoder.encode_to_string(&prometheus::gather())?)
}
