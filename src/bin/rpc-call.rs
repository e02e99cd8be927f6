use std::time::{Duration, Instant};

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

/// Server-side availability errors (host resetting, timed out, shutting down).
const RETRYABLE_CODE: i64 = -32000;

#[derive(Parser)]
#[command(name = "rpc-call")]
#[command(about = "Send one JSON-RPC call to the reload proxy", long_about = None)]
struct Cli {
    /// Method name
    method: String,

    /// JSON params (object or array)
    #[arg(short, long)]
    params: Option<String>,

    #[arg(short, long, default_value = "http://127.0.0.1:8080")]
    url: String,

    /// Bearer key, if the proxy requires one
    #[arg(short, long)]
    key: Option<String>,

    #[arg(long, default_value_t = 1)]
    id: i64,

    /// Keep retrying while the proxy is unreachable or the host is resetting
    #[arg(short, long)]
    wait: bool,

    /// Give up waiting after this many seconds
    #[arg(long, default_value_t = 120)]
    timeout: u64,

    /// Seconds between attempts while waiting
    #[arg(long, default_value = "2", value_parser = parse_interval)]
    interval: Duration,
}

fn parse_interval(value: &str) -> Result<Duration, String> {
    let secs: f64 = value.parse().map_err(|e| format!("{e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("'{value}' is not a usable interval: {e}"))
}

/// What one attempt produced.
enum Attempt {
    Reply(Value),
    Retry(String),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let params = match &cli.params {
        Some(raw) => Some(serde_json::from_str::<Value>(raw)?),
        None => None,
    };
    let mut payload = json!({ "jsonrpc": "2.0", "method": cli.method, "id": cli.id });
    if let Some(params) = params {
        payload["params"] = params;
    }

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);
    }
    let client = reqwest::Client::builder().default_headers(headers).build()?;

    let started = Instant::now();
    let Some(deadline) = started.checked_add(Duration::from_secs(cli.timeout)) else {
        Cli::command()
            .error(ErrorKind::ValueValidation, format!("--timeout {} is too large", cli.timeout))
            .exit();
    };
    let interval = cli.interval;

    loop {
        match call(&client, &cli.url, &payload).await? {
            Attempt::Reply(reply) => return print_reply(reply),
            Attempt::Retry(reason) if cli.wait && retry_fits(interval, deadline) => {
                eprintln!("  [{}s] {}...", started.elapsed().as_secs(), reason);
                tokio::time::sleep(interval).await;
            }
            Attempt::Retry(reason) => {
                eprintln!("Error: {}", reason);
                std::process::exit(1);
            }
        }
    }
}

async fn call(
    client: &reqwest::Client,
    url: &str,
    payload: &Value,
) -> Result<Attempt, Box<dyn std::error::Error>> {
    let res = match client.post(url).json(payload).send().await {
        Ok(res) => res,
        Err(e) if e.is_connect() || e.is_timeout() => {
            return Ok(Attempt::Retry(format!("not reachable ({})", e)))
        }
        Err(e) => return Err(e.into()),
    };

    let status = res.status();
    if !status.is_success() {
        let text = res.text().await.unwrap_or_default();
        return Err(format!("proxy returned status {}: {}", status, text).into());
    }

    let reply: Value = res.json().await?;
    match reply["error"]["code"].as_i64() {
        Some(RETRYABLE_CODE) => Ok(Attempt::Retry(
            reply["error"]["message"].as_str().unwrap_or("host unavailable").to_string(),
        )),
        _ => Ok(Attempt::Reply(reply)),
    }
}

/// Whether sleeping `interval` still lands before `deadline`.
fn retry_fits(interval: Duration, deadline: Instant) -> bool {
    Instant::now()
        .checked_add(interval)
        .is_some_and(|next| next < deadline)
}

fn print_reply(reply: Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(&reply)?);
    if reply.get("error").is_some() {
        std::process::exit(2);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_rejects_values_a_duration_cannot_hold() {
        assert_eq!(parse_interval("0.5"), Ok(Duration::from_millis(500)));
        assert!(parse_interval("inf").is_err());
        assert!(parse_interval("-1").is_err());
        assert!(parse_interval("NaN").is_err());
        assert!(parse_interval("soon").is_err());
    }

    #[test]
    fn huge_interval_never_fits_before_the_deadline() {
        let deadline = Instant::now() + Duration::from_secs(60);
        assert!(retry_fits(Duration::from_millis(10), deadline));
        assert!(!retry_fits(Duration::MAX, deadline));
    }
}
