use outline_http::OutlineClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let client = OutlineClient::from_env()?;

    let results = client.search_documents("onboarding", None, 5).await?;
    for hit in results.as_array().into_iter().flatten() {
        let title = hit["document"]["title"].as_str().unwrap_or("(untitled)");
        let id = hit["document"]["id"].as_str().unwrap_or("?");
        println!("{id}  {title}");
    }

    if let Some(state) = client.rate_limit_state() {
        println!("budget: {} remaining (limit {:?})", state.remaining, state.limit);
    }

    Ok(())
}
