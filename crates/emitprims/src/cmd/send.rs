use emitprims_spark::{connect_with_config, is_reserved, AckOutcome, EmitterConfig};

use crate::cmd::{parse_duration, parse_json_args, SendArgs};
use crate::exit::{ack_error, spark_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_ack, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    if is_reserved(&args.event) {
        return Err(CliError::new(
            USAGE,
            format!("cannot send reserved event '{}'", args.event),
        ));
    }
    let ack_timeout = parse_duration(&args.ack_timeout)?;
    let payload = parse_json_args(&args.json)?;
    let config = EmitterConfig::default().with_ack_timeout(ack_timeout);

    let spark = connect_with_config(&args.path, config)
        .map_err(|err| spark_error("connect failed", err))?;

    if !args.ack {
        let sent = spark.send(&args.event, payload);
        spark.close();
        sent.map_err(|err| spark_error("send failed", err))?;
        return Ok(SUCCESS);
    }

    let outcome: AckOutcome = match spark.request(&args.event, payload) {
        Ok(receiver) => receiver.wait(),
        Err(err) => {
            spark.close();
            return Err(spark_error("send failed", err));
        }
    };
    let spark_id = spark.id().to_string();
    spark.close();

    let result = outcome.map_err(|err| ack_error("ack failed", err))?;
    print_ack(&args.event, &spark_id, &result, format);
    Ok(SUCCESS)
}
