//! snapdisk — user-mode block device snapshotting utility.

use anyhow::Result;

mod cmd;
mod units;

fn print_usage() {
    println!("Usage: snapdisk <command> [options]");
    println!();
    println!("Commands");
    println!("  snapshot <src> <dst>            Create a snapshot of a block device");
    println!("  serve <src>                     Serve a local image to a remote snapshotter");
    println!("  genkey <server.json> <client.json>");
    println!("                                  Create a cross-pinned TLS key file pair");
    println!();
    println!("snapshot options:");
    println!("  -p, --commit-period <size>      Commit interval in appended bytes (default: 10 Gi)");
    println!("  -n, --name <snapshot_name>      Snapshot name (default: current timestamp)");
    println!("  -m, --mode <mode>               create, resume or overwrite (default: create)");
    println!("  -c, --compress <method>         Chunk compression, currently gz (default: none)");
    println!("  -s, --chunk-size <size>         Chunk size (default: 256 Mi)");
    println!("  --remote-snapdisk <binary>      Name of the snapdisk executable on the remote");
    println!("                                  side of an ssh:// source (default: snapdisk)");
    println!("  --print-si-units                Print sizes in SI units (powers of 1000)");
    println!();
    println!("serve options:");
    println!("  -e, --endpoint <uri>            stdout:// or ip://[addr][:port] or");
    println!("                                  unix://<path> or tls://[addr][:port]/<keyfile>");
    println!("                                  (default: stdout://)");
    println!("  -m, --max-chunk-size <size>     Largest chunk a client may request (default: 512 Mi)");
    println!("  -s, --chunk-size <size>         Chunk size reported to clients (default: 256 Mi)");
    println!();
    println!("Common options:");
    println!("  --verbose                       Increase verbosity; can be given multiple times");
    println!();
    println!("Examples:");
    println!("  snapdisk snapshot /dev/sda /backup/sda");
    println!("  snapdisk snapshot -c gz ssh://root@vault//dev/sda /backup/vault");
    println!("  snapdisk serve -e ip://0.0.0.0:55860 /dev/sda");
}

fn init_tracing(verbose: usize) {
    let default_directive = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    // stderr always: with stdout:// endpoints, stdout is the data channel
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let verbose = args.iter().filter(|a| a.as_str() == "--verbose").count();
    init_tracing(verbose);
    let args: Vec<String> = args.into_iter().filter(|a| a != "--verbose").collect();

    match args.first().map(String::as_str) {
        Some("snapshot") => cmd::snapshot::run(&args[1..]).await,
        Some("serve") => cmd::serve::run(&args[1..]).await,
        Some("genkey") => cmd::genkey::run(&args[1..]).await,
        Some("help") | Some("--help") | Some("-h") | None => {
            print_usage();
            Ok(())
        }
        Some(other) => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
