//! `snapdisk serve` — expose a local image to a remote snapshotter.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use snapdisk_net::{EndpointAddr, ImageServer};
use snapdisk_store::LocalImage;

use crate::units::parse_size;

struct ServeArgs {
    endpoint: EndpointAddr,
    max_chunk_size: u64,
    chunk_size: u64,
    src: PathBuf,
}

fn parse_args(args: &[String]) -> Result<ServeArgs> {
    let mut endpoint: EndpointAddr = EndpointAddr::Stdio;
    let mut max_chunk_size = 512 << 20;
    let mut chunk_size = 256 << 20;
    let mut src = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-e" | "--endpoint" => {
                i += 1;
                let value = args.get(i).context("--endpoint requires a value")?;
                endpoint = value.parse()?;
            }
            "-m" | "--max-chunk-size" => {
                i += 1;
                let value = args.get(i).context("--max-chunk-size requires a value")?;
                max_chunk_size = parse_size(value)?;
            }
            "-s" | "--chunk-size" => {
                i += 1;
                let value = args.get(i).context("--chunk-size requires a value")?;
                chunk_size = parse_size(value)?;
            }
            other if other.starts_with('-') => bail!("Unknown option: {other}"),
            other => {
                if src.replace(PathBuf::from(other)).is_some() {
                    bail!("serve takes exactly one source image");
                }
            }
        }
        i += 1;
    }

    Ok(ServeArgs {
        endpoint,
        max_chunk_size,
        chunk_size,
        src: src.context("Usage: snapdisk serve [options] <src>")?,
    })
}

pub async fn run(args: &[String]) -> Result<()> {
    let args = parse_args(args)?;

    if matches!(args.endpoint, EndpointAddr::Ssh { .. }) {
        bail!("ssh:// endpoints are client-only; serve over stdout://, ip://, unix:// or tls://");
    }

    let image = LocalImage::open(&args.src, args.chunk_size)?;
    let endpoint = args.endpoint.listen().await?;
    let mut server = ImageServer::new(image, endpoint, args.max_chunk_size);
    server.run().await?;
    Ok(())
}
