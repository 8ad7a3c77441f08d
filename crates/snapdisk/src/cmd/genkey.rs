//! `snapdisk genkey` — create a cross-pinned TLS key file pair.

use std::path::Path;

use anyhow::{bail, Result};

use snapdisk_net::KeyStore;

pub async fn run(args: &[String]) -> Result<()> {
    let [server_keyfile, client_keyfile] = args else {
        bail!("Usage: snapdisk genkey <server_keyfile> <client_keyfile>");
    };
    KeyStore::create_server_client_pair(Path::new(server_keyfile), Path::new(client_keyfile))?;
    println!("Wrote {server_keyfile} and {client_keyfile}; each side trusts exactly the other.");
    Ok(())
}
