//! `snapdisk snapshot` — snapshot a local or remote image into a
//! deduplicated chunk pool.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};

use snapdisk_net::{EndpointAddr, RemoteImage};
use snapdisk_store::{
    Compression, DiskImage, LocalImage, Progress, SnapshotMode, SnapshotWriter,
};

use crate::units::{format_duration, format_size, parse_size};

struct SnapshotArgs {
    commit_period: u64,
    name: Option<String>,
    mode: SnapshotMode,
    compression: Option<Compression>,
    chunk_size: u64,
    remote_snapdisk: String,
    print_si_units: bool,
    src: String,
    dst: PathBuf,
}

fn parse_args(args: &[String]) -> Result<SnapshotArgs> {
    let mut commit_period = 10 << 30;
    let mut name = None;
    let mut mode = SnapshotMode::Create;
    let mut compression = None;
    let mut chunk_size = 256 << 20;
    let mut remote_snapdisk = "snapdisk".to_string();
    let mut print_si_units = false;
    let mut positional: Vec<String> = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-p" | "--commit-period" => {
                i += 1;
                let value = args.get(i).context("--commit-period requires a value")?;
                commit_period = parse_size(value)?;
            }
            "-n" | "--name" => {
                i += 1;
                name = Some(
                    args.get(i)
                        .context("--name requires a value")?
                        .to_string(),
                );
            }
            "-m" | "--mode" => {
                i += 1;
                mode = match args.get(i).context("--mode requires a value")?.as_str() {
                    "create" => SnapshotMode::Create,
                    "resume" => SnapshotMode::Resume,
                    "overwrite" => SnapshotMode::Overwrite,
                    other => bail!("--mode must be create, resume or overwrite, not {other:?}"),
                };
            }
            "-c" | "--compress" => {
                i += 1;
                compression = match args.get(i).context("--compress requires a value")?.as_str() {
                    "gz" => Some(Compression::Gzip),
                    other => bail!("--compress must be gz, not {other:?}"),
                };
            }
            "-s" | "--chunk-size" => {
                i += 1;
                let value = args.get(i).context("--chunk-size requires a value")?;
                chunk_size = parse_size(value)?;
            }
            "--remote-snapdisk" => {
                i += 1;
                remote_snapdisk = args
                    .get(i)
                    .context("--remote-snapdisk requires a value")?
                    .to_string();
            }
            "--print-si-units" => print_si_units = true,
            other if other.starts_with('-') => bail!("Unknown option: {other}"),
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    let [src, dst] = positional.as_slice() else {
        bail!("Usage: snapdisk snapshot [options] <src> <dst>");
    };

    Ok(SnapshotArgs {
        commit_period,
        name,
        mode,
        compression,
        chunk_size,
        remote_snapdisk,
        print_si_units,
        src: src.clone(),
        dst: PathBuf::from(dst),
    })
}

fn print_progress(progress: &Progress, started: Instant, si: bool) {
    let elapsed = started.elapsed().as_secs_f64();
    let percent = if progress.disk_size == 0 {
        100.0
    } else {
        progress.position as f64 / progress.disk_size as f64 * 100.0
    };
    let speed = if elapsed < 1.0 {
        "N/A".to_string()
    } else {
        let rate = (progress.total_bytes_appended as f64 / elapsed).round() as u64;
        format!("{}/s", format_size(rate, si))
    };
    println!(
        "{percent:6.2}%: {} of {}; {} deduplicated, {} stored. Runtime {}, speed {speed}.",
        format_size(progress.position, si),
        format_size(progress.disk_size, si),
        format_size(progress.chunks_deduplicated_size, si),
        format_size(progress.chunks_stored_size, si),
        format_duration(elapsed),
    );
}

pub async fn run(args: &[String]) -> Result<()> {
    let args = parse_args(args)?;

    let name = args.name.clone().unwrap_or_else(|| {
        chrono::Local::now()
            .format("%Y-%m-%d-%H-%M-%S")
            .to_string()
    });

    let mut image: Box<dyn DiskImage + Send> = if args.src.contains("://") {
        let addr: EndpointAddr = args.src.parse()?;
        Box::new(RemoteImage::connect(&addr, args.chunk_size, &args.remote_snapdisk).await?)
    } else {
        Box::new(LocalImage::open(Path::new(&args.src), args.chunk_size)?)
    };

    let started = Instant::now();
    let si = args.print_si_units;

    let mut writer = SnapshotWriter::new(
        image.as_mut(),
        &args.dst,
        &name,
        args.compression,
        args.mode,
    )?;
    let run_result = writer
        .run(args.commit_period, |progress| {
            print_progress(progress, started, si)
        })
        .await;
    let summary = writer.progress();
    drop(writer);

    let close_result = image.close().await;
    run_result?;
    close_result?;

    println!(
        "Snapshot {name:?} complete: {} appended, {} chunks stored ({}), {} deduplicated ({}).",
        format_size(summary.total_bytes_appended, si),
        summary.chunks_stored,
        format_size(summary.chunks_stored_size, si),
        summary.chunks_deduplicated,
        format_size(summary.chunks_deduplicated_size, si),
    );
    Ok(())
}
