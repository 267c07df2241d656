use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use emitprims_spark::BroadcastReport;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One event delivered to a listener, captured for printing.
#[derive(Debug, Clone)]
pub struct ReceivedEvent {
    pub spark_id: String,
    pub event: String,
    pub args: Vec<Value>,
    pub ack_id: Option<u64>,
}

#[derive(Serialize)]
struct EventOutput<'a> {
    schema_id: &'a str,
    event: &'a str,
    args: &'a [Value],
    #[serde(skip_serializing_if = "Option::is_none")]
    ack_id: Option<u64>,
    spark_id: &'a str,
    timestamp: String,
}

#[derive(Serialize)]
struct AckOutput<'a> {
    schema_id: &'a str,
    event: &'a str,
    result: &'a Value,
    spark_id: &'a str,
    timestamp: String,
}

#[derive(Serialize)]
struct BroadcastOutput<'a> {
    schema_id: &'a str,
    event: &'a str,
    delivered: &'a [String],
    failed: Vec<FailedOutput<'a>>,
    timestamp: String,
}

#[derive(Serialize)]
struct FailedOutput<'a> {
    spark_id: &'a str,
    error: String,
}

pub fn print_event(received: &ReceivedEvent, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = EventOutput {
                schema_id: "https://schemas.3leaps.dev/emitprims/cli/v1/event-received.schema.json",
                event: &received.event,
                args: &received.args,
                ack_id: received.ack_id,
                spark_id: &received.spark_id,
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "ACK", "SPARK", "ARGS"])
                .add_row(vec![
                    received.event.clone(),
                    ack_label(received.ack_id),
                    received.spark_id.clone(),
                    args_preview(&received.args),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "event={} ack={} spark={} args={}",
                received.event,
                ack_label(received.ack_id),
                received.spark_id,
                args_preview(&received.args)
            );
        }
    }
}

pub fn print_ack(event: &str, spark_id: &str, result: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = AckOutput {
                schema_id: "https://schemas.3leaps.dev/emitprims/cli/v1/ack-received.schema.json",
                event,
                result,
                spark_id,
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "SPARK", "RESULT"])
                .add_row(vec![event.to_string(), spark_id.to_string(), result.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("ack event={event} spark={spark_id} result={result}");
        }
    }
}

pub fn print_broadcast(event: &str, report: &BroadcastReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = BroadcastOutput {
                schema_id: "https://schemas.3leaps.dev/emitprims/cli/v1/broadcast-report.schema.json",
                event,
                delivered: &report.delivered,
                failed: report
                    .failed
                    .iter()
                    .map(|(spark_id, err)| FailedOutput {
                        spark_id,
                        error: err.to_string(),
                    })
                    .collect(),
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SPARK", "STATUS"]);
            for spark_id in &report.delivered {
                table.add_row(vec![spark_id.clone(), "delivered".to_string()]);
            }
            for (spark_id, err) in &report.failed {
                table.add_row(vec![spark_id.clone(), format!("failed: {err}")]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "broadcast event={event} delivered={} failed={}",
                report.delivered_count(),
                report.failed.len()
            );
            for (spark_id, err) in &report.failed {
                println!("  {spark_id}: {err}");
            }
        }
    }
}

fn print_json<T: Serialize>(out: &T) {
    println!(
        "{}",
        serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
    );
}

fn ack_label(ack_id: Option<u64>) -> String {
    ack_id.map_or_else(|| "-".to_string(), |id| id.to_string())
}

fn args_preview(args: &[Value]) -> String {
    serde_json::to_string(args).unwrap_or_else(|_| format!("<{} args>", args.len()))
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
