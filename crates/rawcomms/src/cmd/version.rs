use rawcomms_frame::{DEFAULT_CHUNK_SIZE, HEADER_SIZE, MAX_METADATA_SIZE};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("rawcomms {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: rawcomms");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("RAWCOMMS_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("features: async={}, cli=true", cfg!(feature = "async"));
    println!(
        "wire: header={HEADER_SIZE}B, max_metadata={MAX_METADATA_SIZE}B, chunk={DEFAULT_CHUNK_SIZE}B, payload=base64"
    );

    Ok(SUCCESS)
}
