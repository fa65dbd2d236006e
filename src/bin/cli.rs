//! Box Relay CLI
//!
//! Command-line interface for a running relay:
//! - Send commands to boxes
//! - Push config updates
//! - Inspect connections and status

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "box-relay-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Control boxes connected to a Box Relay server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Relay server URL
    #[arg(long, default_value = "http://localhost:8080", global = true)]
    pub api_url: String,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send a command, e.g. `send 001 restartesp`
    Send {
        /// Target box id
        box_id: String,
        /// Command name
        cmd: String,
    },

    /// Push config fields, e.g. `set 001 port=1883`
    Set {
        /// Target box id
        box_id: String,
        /// Fields in key=value format; values parse as JSON when possible
        #[arg(required = true)]
        fields: Vec<String>,
    },

    /// Broadcast a payload verbatim
    Raw {
        /// Payload text
        payload: String,
    },

    /// List connected boxes
    Connections,

    /// Show relay status
    Status,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Send { box_id, cmd } => {
            let body = serde_json::json!({ "box_id": box_id, "cmd": cmd });
            let response = client
                .post(format!("{}/api/v1/broadcast", cli.api_url))
                .json(&body)
                .send()
                .await?;
            print_broadcast(response, &cli.format).await?;
        }

        Commands::Set { box_id, fields } => {
            let body = build_set_body(box_id, &fields)?;
            let response = client
                .post(format!("{}/api/v1/broadcast", cli.api_url))
                .json(&body)
                .send()
                .await?;
            print_broadcast(response, &cli.format).await?;
        }

        Commands::Raw { payload } => {
            let response = client
                .post(format!("{}/api/v1/broadcast/raw", cli.api_url))
                .header("Content-Type", "text/plain")
                .body(payload)
                .send()
                .await?;
            print_broadcast(response, &cli.format).await?;
        }

        Commands::Connections => {
            let response = client
                .get(format!("{}/api/v1/connections", cli.api_url))
                .send()
                .await?;

            if !response.status().is_success() {
                eprintln!("Failed to fetch connections: {}", response.status());
                std::process::exit(1);
            }

            let data: Value = response.json().await?;

            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&data)?);
                return Ok(());
            }

            let connections = data["connections"].as_array().cloned().unwrap_or_default();
            if connections.is_empty() {
                println!("No boxes connected.");
            } else {
                println!(
                    "{:<38} {:<22} {:<8} {}",
                    "ID", "Remote", "Box", "Connected"
                );
                println!("{}", "-".repeat(90));

                for conn in connections {
                    println!(
                        "{:<38} {:<22} {:<8} {}",
                        conn["id"].as_str().unwrap_or("-"),
                        conn["remote_addr"].as_str().unwrap_or("-"),
                        conn["box_id"].as_str().unwrap_or("-"),
                        format_connected_at(conn["connected_at"].as_str())
                    );
                }
            }
        }

        Commands::Status => {
            let response = client
                .get(format!("{}/health", cli.api_url))
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let health: Value = resp.json().await?;

                    if cli.format == "json" {
                        println!("{}", serde_json::to_string_pretty(&health)?);
                        return Ok(());
                    }

                    println!(
                        "Box Relay v{}",
                        health["version"].as_str().unwrap_or("unknown")
                    );
                    println!();
                    println!("Status: {}", health["status"].as_str().unwrap_or("unknown"));
                    println!(
                        "Connected boxes: {}",
                        health["connections"].as_u64().unwrap_or(0)
                    );

                    if let Some(uptime) = health["uptime_seconds"].as_u64() {
                        println!("Uptime: {}", format_duration(uptime));
                    }
                }
                Ok(resp) => {
                    eprintln!("Relay returned error: {}", resp.status());
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("Cannot connect to Box Relay at {}", cli.api_url);
                    eprintln!("Error: {}", e);
                    eprintln!();
                    eprintln!("Make sure the relay is running:");
                    eprintln!("  cargo run --bin box-relay");
                    std::process::exit(1);
                }
            }
        }

        Commands::Config { output } => {
            let config = box_relay::config::generate_default_config();

            match output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

/// Print the outcome of a broadcast request
async fn print_broadcast(
    response: reqwest::Response,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        eprintln!("Broadcast failed ({}): {}", status, text);
        std::process::exit(1);
    }

    let data: Value = response.json().await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!(
        "Delivered to {} box(es), {} failed",
        data["delivered"].as_u64().unwrap_or(0),
        data["failed"].as_u64().unwrap_or(0)
    );

    if let Some(failures) = data["failures"].as_array() {
        for failure in failures {
            println!(
                "  {} ({}): {}",
                failure["connection_id"].as_str().unwrap_or("-"),
                failure["remote_addr"].as_str().unwrap_or("unknown"),
                failure["message"].as_str().unwrap_or("-")
            );
        }
    }

    Ok(())
}

/// Parse a `key=value` pair; the value is JSON if it parses, a string otherwise
fn parse_field(pair: &str) -> Result<(String, Value), Box<dyn std::error::Error>> {
    let (key, raw) = pair
        .split_once('=')
        .ok_or_else(|| format!("Invalid field '{}'. Use key=value", pair))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("Missing key in '{}'", pair).into());
    }

    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

/// Build a config update for one box from `key=value` pairs
///
/// The target is given positionally, so a `box_id` field is rejected.
fn build_set_body(
    box_id: String,
    fields: &[String],
) -> Result<Map<String, Value>, Box<dyn std::error::Error>> {
    let mut body = Map::new();
    body.insert("box_id".to_string(), Value::String(box_id));
    for pair in fields {
        let (key, value) = parse_field(pair)?;
        if key == "box_id" {
            return Err(format!(
                "'{}' cannot change the target box; pass it as the first argument",
                pair
            )
            .into());
        }
        body.insert(key, value);
    }
    Ok(body)
}

fn format_connected_at(raw: Option<&str>) -> String {
    raw.and_then(|s| s.parse::<DateTime<Utc>>().ok())
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else if seconds < 86400 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{}d {}h", seconds / 86400, (seconds % 86400) / 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field_number() {
        let (key, value) = parse_field("port=1883").unwrap();
        assert_eq!(key, "port");
        assert_eq!(value, Value::from(1883));
    }

    #[test]
    fn test_parse_field_string_fallback() {
        let (key, value) = parse_field("ssid=HomeWifi").unwrap();
        assert_eq!(key, "ssid");
        assert_eq!(value, Value::from("HomeWifi"));

        let (_, value) = parse_field("ip=192.168.1.20").unwrap();
        assert_eq!(value, Value::from("192.168.1.20"));
    }

    #[test]
    fn test_parse_field_bool_and_empty() {
        assert_eq!(parse_field("debug=true").unwrap().1, Value::Bool(true));
        assert_eq!(parse_field("note=").unwrap().1, Value::from(""));
    }

    #[test]
    fn test_parse_field_invalid() {
        assert!(parse_field("port").is_err());
        assert!(parse_field("=1883").is_err());
    }

    #[test]
    fn test_set_body() {
        let fields = vec!["port=1883".to_string(), "ssid=HomeWifi".to_string()];
        let body = build_set_body("001".to_string(), &fields).unwrap();
        assert_eq!(
            Value::Object(body),
            serde_json::json!({ "box_id": "001", "port": 1883, "ssid": "HomeWifi" })
        );
    }

    #[test]
    fn test_set_body_rejects_box_id_field() {
        let fields = vec!["port=1883".to_string(), "box_id=002".to_string()];
        let err = build_set_body("001".to_string(), &fields).unwrap_err();
        assert!(err.to_string().contains("box_id=002"));

        let fields = vec![" box_id =002".to_string()];
        assert!(build_set_body("001".to_string(), &fields).is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(7260), "2h 1m");
        assert_eq!(format_duration(90000), "1d 1h");
    }

    #[test]
    fn test_format_connected_at() {
        assert_eq!(
            format_connected_at(Some("2026-10-16T08:30:00Z")),
            "2026-10-16 08:30:00"
        );
        assert_eq!(format_connected_at(None), "-");
    }
}
