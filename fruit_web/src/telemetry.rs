use fruit_detection::DetectionResult;
use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use prometheus::Registry;

pub struct Metrics {
    request_counter: Counter<u64>,
    inference_duration: Histogram<u64>,
    detection_counter: Counter<u64>,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
            .with_reader(exporter)
            .build();

        let meter = provider.meter("fruit_web");
        global::set_meter_provider(provider);

        let request_counter = meter
            .u64_counter("requests_total")
            .with_description("Total number of detection requests")
            .build();

        let inference_duration = meter
            .u64_histogram("inference_duration_ms")
            .with_boundaries(bucket_boundaries(&[(10, 100, 10), (100, 1000, 50), (1000, 5000, 500)]))
            .with_description("Duration of detection runs in milliseconds")
            .build();

        let detection_counter = meter
            .u64_counter("detections_total")
            .with_description("Detected objects per class")
            .build();

        Ok(Metrics {
            request_counter,
            inference_duration,
            detection_counter,
            registry,
        })
    }

    pub fn record_request(&self, route: &str) {
        let attributes = vec![KeyValue::new("route", route.to_string())];
        self.request_counter.add(1, &attributes);
    }

    pub fn record_inference_duration(&self, duration_ms: u64, route: &str) {
        let attributes = vec![KeyValue::new("route", route.to_string())];
        self.inference_duration.record(duration_ms, &attributes);
    }

    pub fn record_detections(&self, result: &DetectionResult) {
        for (class_name, count) in result.counts() {
            let attributes = vec![KeyValue::new("class", class_name.clone())];
            self.detection_counter.add(*count as u64, &attributes);
        }
    }
}

/// Histogram boundaries from consecutive `(start, end, step)` ranges,
/// deduplicated where ranges meet.
fn bucket_boundaries(ranges: &[(u64, u64, usize)]) -> Vec<f64> {
    let mut boundaries: Vec<u64> = Vec::new();
    for &(start, end, step) in ranges {
        for value in (start..=end).step_by(step.max(1)) {
            if boundaries.last().map_or(true, |&last| value > last) {
                boundaries.push(value);
            }
        }
    }
    boundaries.into_iter().map(|x| x as f64).collect()
}
