use anyhow::{Context, Result};
use prism_client::{Client, Method, RequestParams};

/// Print cluster root info
pub async fn run_info(client: &Client) -> Result<()> {
    let info = client.info().await?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

/// Ping the cluster
pub async fn run_ping(client: &Client) -> Result<()> {
    if client.ping().await? {
        println!("Cluster is reachable");
        Ok(())
    } else {
        anyhow::bail!("Cluster responded with 404");
    }
}

/// Run a search with a JSON body (defaults to match_all)
pub async fn run_search(
    client: &Client,
    index: &str,
    query: Option<&str>,
    size: Option<usize>,
) -> Result<()> {
    let body = match query {
        Some(q) => serde_json::from_str(q).context("Query must be valid JSON")?,
        None => serde_json::json!({"query": {"match_all": {}}}),
    };

    let result = match size {
        Some(size) => {
            let params = RequestParams::new(Method::Post, format!("/{}/_search", index))
                .with_body(body)
                .with_query("size", size.to_string());
            client.request(params).await?.body.unwrap_or_default()
        }
        None => client.search(index, body).await?,
    };
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
