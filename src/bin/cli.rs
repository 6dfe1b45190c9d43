use chrono::{Duration, Utc};
use plotline::{
    Graph, MemoryConnector, OperGroup, OperatorType, PlotRequest, Plotline, PlotlineConfig,
    SeriesRef, Stack,
};
use rand::Rng;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("plotline - time-series consolidation and federation");
    println!("===================================================");

    let mut plotline = Plotline::new(PlotlineConfig::default());

    println!("Generating fake metrics for two origins...");
    let web = Arc::new(MemoryConnector::new("web"));
    let db = Arc::new(MemoryConnector::new("db"));
    generate_fake_data(&web, &["web1", "web2"], &["cpu.user", "cpu.system"]).await;
    generate_fake_data(&db, &["db1"], &["cpu.user", "disk.read_bytes"]).await;

    plotline.register_origin("web", web).await;
    plotline.register_origin("db", db).await;
    let refreshed = plotline.refresh().await;
    println!("Catalog refreshed for {} origins", refreshed);

    plotline.add_graph(sample_graph());

    let mut request = PlotRequest::for_graph("cpu-overview").with_range("-1h");
    request.sample = 60;
    request.percentiles = vec![50.0, 95.0, 99.5];

    let response = plotline.plots(&request).await?;
    println!(
        "\nGraph `{}' from {} to {} (step {}s)",
        response.name, response.start, response.end, response.step
    );

    for stack in &response.stacks {
        for group in &stack.groups {
            println!("\n[{} / {}] operator {:?}", stack.name, group.name, group.operator);
            for series in &group.series {
                let stats: Vec<String> = series
                    .summary
                    .iter()
                    .map(|(key, value)| format!("{}={:.2}", key, value))
                    .collect();
                println!("  {:<16} {:>4} plots  {}", series.name, series.len(), stats.join(" "));
            }
        }
    }

    for diagnostic in &response.diagnostics {
        println!("! {:?} {}: {}", diagnostic.kind, diagnostic.subject, diagnostic.message);
    }

    let values = plotline.values(&request).await?;
    println!("\nLast minute:");
    for (name, stats) in &values.values {
        let stat = |key: &str| stats.get(key).copied().unwrap_or(f64::NAN);
        println!("  {:<16} avg={:.2} last={:.2}", name, stat("avg"), stat("last"));
    }

    println!("\nDemo completed successfully!");
    Ok(())
}

async fn generate_fake_data(connector: &MemoryConnector, sources: &[&str], metrics: &[&str]) {
    let mut rng = rand::thread_rng();
    let start = Utc::now() - Duration::hours(1);

    for source in sources {
        for metric in metrics {
            let mut base_value: f64 = if metric.starts_with("cpu") {
                rng.gen_range(10.0..60.0)
            } else {
                rng.gen_range(1_000_000.0..10_000_000.0)
            };

            // One sample every 10 seconds, with the odd gap
            for i in 0..360 {
                let time = start + Duration::seconds(i * 10);
                if rng.gen_bool(0.02) {
                    connector.insert(source, metric, time, f64::NAN).await;
                    continue;
                }

                base_value = f64::max(base_value + rng.gen_range(-2.0..2.0), 0.0);
                let time_factor = (i as f64 / 360.0) * 2.0 * std::f64::consts::PI;
                connector
                    .insert(source, metric, time, base_value + time_factor.sin() * 5.0)
                    .await;
            }
        }
        println!(" ✓ Completed {}", source);
    }
}

fn sample_graph() -> Graph {
    Graph::new("cpu-overview", "CPU overview")
        .with_stack(
            Stack::new("web")
                .with_group(
                    OperGroup::new("web cpu", OperatorType::Sum)
                        .with_series(SeriesRef::new("web1 user", "web", "web1", "cpu.user"))
                        .with_series(SeriesRef::new("web2 user", "web", "web2", "cpu.user")),
                )
                .with_group(
                    OperGroup::new("web system", OperatorType::Average)
                        .with_series(SeriesRef::new("web1 system", "web", "web1", "cpu.system"))
                        .with_series(SeriesRef::new("web2 system", "web", "web2", "cpu.system")),
                ),
        )
        .with_stack(
            Stack::new("db").with_group(
                OperGroup::new("db", OperatorType::None)
                    .with_series(SeriesRef::new("db1 user", "db", "db1", "cpu.user"))
                    .with_series(
                        SeriesRef::new("db1 reads", "db", "db1", "disk.read_bytes").with_scale(1.0 / 1024.0),
                    ),
            ),
        )
}
