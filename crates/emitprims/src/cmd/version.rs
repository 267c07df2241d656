use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("emitprims {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: emitprims");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target: {}", env!("EMITPRIMS_BUILD_TARGET"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("wire_magic: EM");
    println!(
        "reserved_events: {}",
        emitprims_spark::reserved_events().len()
    );
    println!("features: spark={}, cli=true", cfg!(feature = "spark"));

    Ok(SUCCESS)
}
