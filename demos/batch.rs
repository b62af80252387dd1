use outline_http::{ItemOutcome, OutlineClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let ids: Vec<String> = std::env::args().skip(1).collect();
    let client = OutlineClient::from_env()?;

    let report = client.batch_archive(ids).await?;
    println!(
        "{}: {} of {} succeeded",
        report.operation, report.succeeded, report.total
    );

    for item in &report.results {
        match &item.outcome {
            ItemOutcome::Success { payload } => {
                println!("archived {} ({})", item.id, payload["title"].as_str().unwrap_or("?"))
            }
            ItemOutcome::Failed { error } => eprintln!("failed {}: {error}", item.id),
        }
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
