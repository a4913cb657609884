//! Prometheus text exposition of endpoint state.
//!
//! Rendering is a pure function of a registry snapshot: endpoints are
//! ordered by id and labels by key, so unchanged state renders to identical
//! bytes.

use crate::types::{Endpoint, is_label_name};
use std::fmt::{self, Write};
use uptime_probe::EndpointStatus;

/// Content type of the text exposition format
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Body served when no collector is configured
pub const UNAVAILABLE_BODY: &str = "# Metrics not available\n";

/// Render the exposition for a registry snapshot.
pub fn render(endpoints: &[Endpoint]) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = write_exposition(&mut out, endpoints);
    out
}

/// Write the exposition for a registry snapshot into `out`.
pub fn write_exposition<W: Write>(out: &mut W, endpoints: &[Endpoint]) -> fmt::Result {
    let mut sorted: Vec<&Endpoint> = endpoints.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let rows: Vec<(String, &Endpoint)> = sorted.into_iter().map(|ep| (label_set(ep), ep)).collect();

    family(out, "probe_success", "Displays whether the probe was successful")?;
    for (labels, ep) in &rows {
        writeln!(out, "probe_success{{{}}} {}", labels, u8::from(ep.is_up()))?;
    }

    family(
        out,
        "probe_duration_seconds",
        "Returns how long the probe took to complete in seconds",
    )?;
    for (labels, ep) in &rows {
        writeln!(
            out,
            "probe_duration_seconds{{{}}} {:.3}",
            labels,
            ep.response_time_ms as f64 / 1000.0
        )?;
    }

    family(out, "probe_http_status_code", "Response HTTP status code")?;
    for (labels, ep) in &rows {
        writeln!(out, "probe_http_status_code{{{}}} {}", labels, ep.status_code)?;
    }

    family(out, "probe_last_check_timestamp", "Last check timestamp")?;
    for (labels, ep) in &rows {
        let ts = ep.last_check.map(|t| t.timestamp()).unwrap_or(0);
        writeln!(out, "probe_last_check_timestamp{{{}}} {}", labels, ts)?;
    }

    family(out, "probe_interval_seconds", "Check interval in seconds")?;
    for (labels, ep) in &rows {
        writeln!(out, "probe_interval_seconds{{{}}} {}", labels, ep.interval_seconds)?;
    }

    let up = endpoints.iter().filter(|e| e.status == EndpointStatus::Up).count();
    let down = endpoints.iter().filter(|e| e.status == EndpointStatus::Down).count();

    family(
        out,
        "health_monitoring_total_endpoints",
        "Total number of monitored endpoints",
    )?;
    writeln!(out, "health_monitoring_total_endpoints {}", endpoints.len())?;

    family(out, "health_monitoring_up_endpoints", "Number of healthy endpoints")?;
    writeln!(out, "health_monitoring_up_endpoints {}", up)?;

    family(out, "health_monitoring_down_endpoints", "Number of unhealthy endpoints")?;
    writeln!(out, "health_monitoring_down_endpoints {}", down)?;

    Ok(())
}

fn family<W: Write>(out: &mut W, name: &str, help: &str) -> fmt::Result {
    writeln!(out, "# HELP {} {}", name, help)?;
    writeln!(out, "# TYPE {} gauge", name)
}

/// `name`, `url`, then custom labels sorted by key
fn label_set(endpoint: &Endpoint) -> String {
    let mut labels = format!(
        "name=\"{}\",url=\"{}\"",
        escape_label_value(&endpoint.name),
        escape_label_value(&endpoint.url)
    );

    for (key, value) in &endpoint.labels {
        if key == "name" || key == "url" || !is_label_name(key) {
            continue;
        }
        labels.push_str(&format!(",{}=\"{}\"", key, escape_label_value(value)));
    }
    labels
}

/// Escape a label value for the text format
pub fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RegisterEndpoint;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use uptime_probe::ProbeOutcome;

    fn endpoint(id: &str, name: &str, labels: &[(&str, &str)]) -> Endpoint {
        RegisterEndpoint {
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            ..RegisterEndpoint::new(name, "https://example.com")
        }
        .into_endpoint(id.into())
    }

    #[test]
    fn test_escape_label_value() {
        assert_eq!(escape_label_value("plain"), "plain");
        assert_eq!(escape_label_value("a\\b"), "a\\\\b");
        assert_eq!(escape_label_value("say \"hi\""), "say \\\"hi\\\"");
        assert_eq!(escape_label_value("l1\nl2\r\tx"), "l1\\nl2\\r\\tx");
    }

    #[test]
    fn test_render_labels_sorted_and_stable() {
        let endpoints = vec![
            endpoint("b", "B", &[("team", "x"), ("env", "prod")]),
            endpoint("a", "A", &[("env", "prod")]),
        ];

        let first = render(&endpoints);
        let reversed: Vec<_> = endpoints.iter().rev().cloned().collect();
        assert_eq!(first, render(&endpoints));
        assert_eq!(first, render(&reversed));

        assert!(first.contains(
            "probe_success{name=\"A\",url=\"https://example.com\",env=\"prod\"} 0\n"
        ));
        assert!(first.contains(
            "probe_success{name=\"B\",url=\"https://example.com\",env=\"prod\",team=\"x\"} 0\n"
        ));

        // Endpoint a sorts before b within a family
        let a = first.find("probe_success{name=\"A\"").unwrap();
        let b = first.find("probe_success{name=\"B\"").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_render_values() {
        let mut ep = endpoint("a", "A", &[]);
        ep.apply(ProbeOutcome::from_response(200, Duration::from_millis(120)));
        let ts = ep.last_check.unwrap().timestamp();

        let mut down = endpoint("b", "B", &[]);
        down.apply(ProbeOutcome::transport_failure(Duration::from_millis(5000), "timeout"));

        let checking = endpoint("c", "C", &[]);

        let text = render(&[ep, down, checking]);
        let labels = "name=\"A\",url=\"https://example.com\"";
        assert!(text.contains(&format!("probe_success{{{}}} 1\n", labels)));
        assert!(text.contains(&format!("probe_duration_seconds{{{}}} 0.120\n", labels)));
        assert!(text.contains(&format!("probe_http_status_code{{{}}} 200\n", labels)));
        assert!(text.contains(&format!("probe_last_check_timestamp{{{}}} {}\n", labels, ts)));
        assert!(text.contains(&format!("probe_interval_seconds{{{}}} 30\n", labels)));
        assert!(text.contains(
            "probe_last_check_timestamp{name=\"C\",url=\"https://example.com\"} 0\n"
        ));

        assert!(text.contains("health_monitoring_total_endpoints 3\n"));
        assert!(text.contains("health_monitoring_up_endpoints 1\n"));
        assert!(text.contains("health_monitoring_down_endpoints 1\n"));
    }

    #[test]
    fn test_each_family_declared_once() {
        let endpoints = vec![endpoint("a", "A", &[]), endpoint("b", "B", &[])];
        let text = render(&endpoints);
        assert_eq!(text.matches("# TYPE probe_success gauge").count(), 1);
        assert_eq!(text.matches("probe_success{").count(), 2);
    }

    #[test]
    fn test_reserved_and_invalid_label_keys_skipped() {
        let ep = endpoint("a", "A", &[("name", "override"), ("bad-key", "v"), ("env", "a\"b")]);
        let text = render(&[ep]);
        assert!(text.contains(
            "probe_success{name=\"A\",url=\"https://example.com\",env=\"a\\\"b\"} 0\n"
        ));
        assert!(!text.contains("override"));
        assert!(!text.contains("bad-key"));
    }

    #[test]
    fn test_render_empty_registry() {
        let text = render(&[]);
        assert!(text.contains("health_monitoring_total_endpoints 0\n"));
        assert!(!text.contains("probe_success{"));
    }
}
