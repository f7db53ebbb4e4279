use anyhow::Result;
use prism_client::{Client, ClientError, Verdict};

/// Run the product check against a node and report the verdict
pub async fn run_check(client: &Client) -> Result<()> {
    let mut events = client.subscribe();
    let mut warnings = client.subscribe_warnings();

    let outcome = client.info().await;
    let verdict = client.verdict().unwrap_or(Verdict::Supported);

    println!("Product Check");
    println!("=============");
    println!("Verdict: {}", verdict);

    let cached = if verdict.is_cached() { "yes" } else { "no, retried on next request" };
    println!("Cached:  {}", cached);

    // The check is always the first request event of a fresh client
    if let Ok(check) = events.try_recv() {
        let target = format!("{} {}", check.meta.method, check.meta.path);
        match check.meta.status {
            Some(status) => println!("Request: {} -> {}", target, status),
            None => println!("Request: {} got no response", target),
        }
    }

    while let Ok(warning) = warnings.try_recv() {
        println!("Warning: {}", warning);
    }

    match outcome {
        Ok(info) => {
            let version = info
                .get("version")
                .and_then(|v| v.get("number"))
                .and_then(|v| v.as_str())
                .unwrap_or("?");
            let distribution = info
                .get("version")
                .and_then(|v| v.get("distribution"))
                .and_then(|v| v.as_str())
                .unwrap_or("elasticsearch");
            println!("Server:  {} {}", distribution, version);
            Ok(())
        }
        // Denied probes still let the info request through; it fails on its own
        Err(err @ ClientError::Response { .. }) if verdict == Verdict::PermissiveUnknown => {
            println!("Server:  unknown ({})", err);
            Ok(())
        }
        Err(err) => anyhow::bail!("Product check failed: {}", err),
    }
}

