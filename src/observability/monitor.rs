use super::MetricsCollector;

pub struct AggregatorMonitor {
    collector: MetricsCollector,
}

impl AggregatorMonitor {
    pub fn new(collector: MetricsCollector) -> Self {
        Self { collector }
    }

    pub fn generate_report(&self) -> String {
        let snapshot = self.collector.snapshot();

        let mut report = String::from("=== Aggregator Metrics ===\n");
        report.push_str(&format!(
            "Updates: {} applied, {} rejected\nDispatches: {} (avg {}μs)\nAbandoned cycles: {}\nInvocation errors: {}\n",
            snapshot.updates_applied,
            snapshot.updates_rejected,
            snapshot.dispatches,
            snapshot.avg_dispatch_latency_us,
            snapshot.abandoned_cycles,
            snapshot.invocation_errors,
        ));

        if snapshot.channels.is_empty() {
            report.push_str("\nNo channels registered\n");
            return report;
        }

        for (channel, metrics) in snapshot.channels.iter() {
            report.push_str(&format!(
                "\n[{}]\n  Updates: {}\n  Faults: {}\n",
                channel,
                metrics.updates,
                if metrics.faults > 0 {
                    format!("{} fault{}", metrics.faults, if metrics.faults == 1 { "" } else { "s" })
                } else {
                    "0 faults".to_string()
                },
            ));
        }

        report
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }
}
