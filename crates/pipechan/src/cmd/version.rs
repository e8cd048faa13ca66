use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("pipechan {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: pipechan");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("PIPECHAN_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "rustc: {}",
        option_env!("RUSTC_VERSION").unwrap_or("unknown")
    );
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!(
        "frame: max_size={} header={}",
        pipechan_frame::DEFAULT_MAX_FRAME_SIZE,
        pipechan_frame::HEADER_SIZE
    );
    println!(
        "channel: read_buffer={} dispose_timeout={:?}",
        pipechan_channel::DEFAULT_READ_BUFFER_CAPACITY,
        pipechan_channel::DEFAULT_DISPOSE_TIMEOUT
    );

    Ok(SUCCESS)
}
