use clap::{Parser, ValueEnum};

fn default_key() -> String {
    "00".repeat(32)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Family {
    /// BLAKE3 keyed hash, worker-thread pipeline.
    Blake3,
    /// HighwayHash keyed hash, event-callback pipeline.
    Highway,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "deluge", version, about = "Batched keyed-hash dispatch over accelerator backends")]
pub struct Cli {
    /// Hash family to dispatch through.
    #[arg(long, value_enum, default_value_t = Family::Blake3)]
    pub family: Family,

    /// Hex-encoded key. BLAKE3 wants 32 bytes (64 hex chars); HighwayHash
    /// wants 32 bytes interpreted as four little-endian u64 words.
    #[arg(long, default_value_t = default_key())]
    pub key: String,

    /// Input words to hash and reduce, as decimal u64s.
    #[arg(long = "input", num_args = 1.., value_delimiter = ',')]
    pub inputs: Vec<u64>,
}
