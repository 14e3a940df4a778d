mod cli;

use std::sync::mpsc;

use clap::Parser;

use cli::{Cli, Family};
use deluge_core::{Blake3Family, Dispatcher, HighwayFamily};

fn parse_key(hex: &str) -> anyhow::Result<[u8; 32]> {
    let bytes = hex_decode(hex)?;
    bytes.try_into().map_err(|v: Vec<u8>| anyhow::anyhow!("key must be 32 bytes, got {}", v.len()))
}

fn hex_decode(s: &str) -> anyhow::Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        anyhow::bail!("hex key must have an even number of digits");
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| anyhow::anyhow!("invalid hex digit: {e}")))
        .collect()
}

fn run_blake3(key: [u8; 32], inputs: &[u64]) -> anyhow::Result<()> {
    let dispatcher = Dispatcher::create(Blake3Family::new(key))?;
    let (tx, rx) = mpsc::channel();
    dispatcher.schedule(inputs, move |result| {
        let _ = tx.send(result);
    })?;
    match rx.recv()? {
        Ok(digest) => println!("{}", hex_encode(&digest)),
        Err(err) => anyhow::bail!("hash failed: {err}"),
    }
    Ok(())
}

fn run_highway(key: [u8; 32], inputs: &[u64]) -> anyhow::Result<()> {
    let mut limbs = [0u64; 4];
    for (i, limb) in limbs.iter_mut().enumerate() {
        *limb = u64::from_le_bytes(key[i * 8..i * 8 + 8].try_into().unwrap());
    }
    let dispatcher = Dispatcher::create(HighwayFamily::new(limbs))?;
    let (tx, rx) = mpsc::channel();
    dispatcher.schedule(inputs, move |result| {
        let _ = tx.send(result);
    })?;
    match rx.recv()? {
        Ok(digest) => println!("{digest:016x?}"),
        Err(err) => anyhow::bail!("hash failed: {err}"),
    }
    Ok(())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let key = parse_key(&cli.key)?;

    if cli.inputs.is_empty() {
        anyhow::bail!("pass at least one --input word");
    }

    match cli.family {
        Family::Blake3 => run_blake3(key, &cli.inputs),
        Family::Highway => run_highway(key, &cli.inputs),
    }
}
