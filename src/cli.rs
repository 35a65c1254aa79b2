//! Interactive HTTP client for a running Heimdall server: enter a query
//! as JSON and print back the result, or `exit` to quit.

use tokio::io::{stdin, AsyncBufReadExt, BufReader};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║             Heimdall CLI - Query Client                   ║");
    println!("║                    Version {:<29}║", VERSION);
    println!("╚══════════════════════════════════════════════════════════╝");
    println!();

    let base_url =
        std::env::var("HEIMDALL_URL").unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());
    println!("Target server: {base_url}");
    println!("Enter a query as JSON (see spec.md §6 `Query`), or 'exit' to quit.");
    println!();

    let client = reqwest::Client::new();
    let mut reader = BufReader::new(stdin());
    let mut input = String::new();

    loop {
        print!("heimdall> ");
        std::io::Write::flush(&mut std::io::stdout()).unwrap();

        input.clear();
        if reader.read_line(&mut input).await.unwrap_or(0) == 0 {
            break;
        }

        let cmd = input.trim();
        if cmd.is_empty() {
            continue;
        }
        if cmd.eq_ignore_ascii_case("exit") || cmd.eq_ignore_ascii_case("quit") {
            println!("Goodbye!");
            break;
        }

        let query: serde_json::Value = match serde_json::from_str(cmd) {
            Ok(v) => v,
            Err(e) => {
                println!("invalid JSON query: {e}");
                continue;
            }
        };

        match client.post(format!("{base_url}/v1/query")).json(&query).send().await {
            Ok(resp) => match resp.text().await {
                Ok(body) => println!("{body}"),
                Err(e) => println!("failed to read response body: {e}"),
            },
            Err(e) => println!("request failed: {e}"),
        }
        println!();
    }
}
