use clap::{Arg, Command};

/// Get the interface help text (platform-specific)
fn interface_help() -> &'static str {
    #[cfg(target_os = "linux")]
    {
        "Network interface to capture on (default: system default; 'any' captures all interfaces)"
    }
    #[cfg(not(target_os = "linux"))]
    {
        "Network interface to capture on (default: system default)"
    }
}

pub fn build_cli() -> Command {
    Command::new("xnettop")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Per-process network traffic monitor")
        .arg(
            Arg::new("interface")
                .short('i')
                .long("interface")
                .value_name("INTERFACE")
                .help(interface_help())
                .required(false),
        )
        .arg(
            Arg::new("refresh-interval")
                .short('r')
                .long("refresh-interval")
                .value_name("MILLISECONDS")
                .help("Display refresh interval [default: 1000]")
                .value_parser(clap::value_parser!(u64).range(1..))
                .required(false),
        )
        .arg(
            Arg::new("connection-refresh")
                .short('c')
                .long("connection-refresh")
                .value_name("MILLISECONDS")
                .help("Connection table refresh interval [default: 1000]")
                .value_parser(clap::value_parser!(u64).range(1..))
                .required(false),
        )
        .arg(
            Arg::new("window")
                .short('w')
                .long("window")
                .value_name("MILLISECONDS")
                .help("Rate averaging window [default: 5000]")
                .value_parser(clap::value_parser!(u64).range(1..))
                .required(false),
        )
        .arg(
            Arg::new("queue-capacity")
                .long("queue-capacity")
                .value_name("EVENTS")
                .help("Packet event queue capacity; events beyond it are dropped [default: 10000]")
                .value_parser(clap::value_parser!(usize))
                .required(false),
        )
        .arg(
            Arg::new("sort")
                .short('s')
                .long("sort")
                .value_name("KEY")
                .help("Initial sort column")
                .value_parser(["download", "upload", "total", "name"])
                .required(false),
        )
        .arg(
            Arg::new("bpf-filter")
                .short('f')
                .long("bpf-filter")
                .value_name("FILTER")
                .help("BPF filter expression applied to the capture")
                .required(false),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("Path to a configuration file")
                .required(false),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Write logs to logs/ at this level (error, warn, info, debug, trace)")
                .required(false),
        )
}
