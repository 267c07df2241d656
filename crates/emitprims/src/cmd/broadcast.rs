use emitprims_spark::{Hub, SparkListener};

use crate::cmd::{parse_json_args, BroadcastArgs};
use crate::exit::{spark_error, CliError, CliResult, FAILURE, SUCCESS, USAGE};
use crate::output::{print_broadcast, OutputFormat};

pub fn run(args: BroadcastArgs, format: OutputFormat) -> CliResult<i32> {
    if args.peers == 0 {
        return Err(CliError::new(USAGE, "--peers must be greater than zero"));
    }
    let payload = parse_json_args(&args.json)?;

    let listener =
        SparkListener::bind(&args.path).map_err(|err| spark_error("bind failed", err))?;
    tracing::info!(path = %args.path.display(), peers = args.peers, "waiting for peers");

    let hub = Hub::new();
    while hub.len() < args.peers {
        let spark = listener
            .accept_into(&hub)
            .map_err(|err| spark_error("accept failed", err))?;
        tracing::debug!(spark_id = spark.id(), connected = hub.len(), "peer joined");
    }

    let report = hub
        .broadcast(&args.event, payload)
        .map_err(|err| spark_error("broadcast failed", err))?;
    print_broadcast(&args.event, &report, format);
    hub.close_all();

    if report.is_complete() {
        Ok(SUCCESS)
    } else {
        Ok(FAILURE)
    }
}
