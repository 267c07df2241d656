use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use emitprims_spark::{is_reserved, Handler, Hub, Reply, Spark, SparkListener};
use serde_json::Value;

use crate::cmd::{parse_json_value, ListenArgs};
use crate::exit::{spark_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::output::{print_event, OutputFormat, ReceivedEvent};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    if let Some(name) = args.events.iter().find(|name| is_reserved(name)) {
        return Err(CliError::new(
            USAGE,
            format!("cannot listen for reserved event '{name}'"),
        ));
    }
    let reply = parse_json_value("--reply", &args.reply)?;

    let listener =
        SparkListener::bind(&args.path).map_err(|err| spark_error("bind failed", err))?;
    tracing::info!(path = %args.path.display(), events = ?args.events, "listening");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let hub = Hub::new();
    let (tx, rx) = mpsc::channel();
    spawn_accept_loop(listener, hub.clone(), args.events.clone(), reply, tx);

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let received = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(received) => received,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        print_event(&received, format);
        printed = printed.saturating_add(1);

        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    hub.close_all();
    let _ = std::fs::remove_file(&args.path);
    Ok(SUCCESS)
}

fn spawn_accept_loop(
    listener: SparkListener,
    hub: Hub,
    events: Vec<String>,
    reply: Value,
    tx: Sender<ReceivedEvent>,
) {
    thread::spawn(move || loop {
        let accepted = listener.accept_with(|spark| {
            for event in &events {
                let handler = event_handler(spark, event, reply.clone(), tx.clone());
                if let Err(err) = spark.on_handler(event, handler) {
                    tracing::warn!(spark_id = spark.id(), error = %err, "listener registration failed");
                }
            }
            hub.insert(spark.clone());
        });
        match accepted {
            Ok(spark) => tracing::debug!(spark_id = spark.id(), "connection accepted"),
            Err(err) => {
                tracing::error!(error = %err, "accept failed");
                return;
            }
        }
    });
}

fn event_handler(spark: &Spark, event: &str, reply: Value, tx: Sender<ReceivedEvent>) -> Handler {
    let spark_id = spark.id().to_string();
    let event = event.to_string();
    Arc::new(move |args: &[Value], responder: Option<Reply>| {
        let ack_id = responder.as_ref().map(|r| r.ack_id());
        if let Some(responder) = responder {
            if let Err(err) = responder.ok(reply.clone()) {
                tracing::warn!(spark_id = %spark_id, error = %err, "ack reply failed");
            }
        }
        let _ = tx.send(ReceivedEvent {
            spark_id: spark_id.clone(),
            event: event.clone(),
            args: args.to_vec(),
            ack_id,
        });
    })
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
