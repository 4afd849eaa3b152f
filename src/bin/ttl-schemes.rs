use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use ttl_schemes::backend::LOCK_SCOPE;
use ttl_schemes::codec::ReversibleIdCodec;
use ttl_schemes::codec::DEFAULT_MIN_LENGTH;
use ttl_schemes::config::AlphabetKind;
use ttl_schemes::config::CodecConfig;
use ttl_schemes::key::KeyBuilder;
use ttl_schemes::key::KeyPart;
use ttl_schemes::key::Prekey;
use ttl_schemes::key::MAX_KEY_LENGTH;

#[derive(Debug, clap::Parser)]
#[clap(about, version, name = "ttl-schemes")]
struct Cli {
    /// Minimum length of public codes.
    #[clap(long, global = true, env = "TTL_SCHEMES_MIN_LENGTH", default_value_t = DEFAULT_MIN_LENGTH)]
    min_length: u32,

    /// `base62`, `base52`, or the symbols of a custom alphabet, zero first.
    #[clap(long, global = true, env = "TTL_SCHEMES_ALPHABET", default_value = "base62")]
    alphabet: String,

    /// Key prefix.
    #[clap(long, global = true, env = "TTL_SCHEMES_PREFIX")]
    prefix: Option<String>,

    #[clap(long, global = true, env = "TTL_SCHEMES_MAX_KEY_LENGTH", default_value_t = MAX_KEY_LENGTH)]
    max_key_length: usize,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Turn raw ids into public codes.
    Encode {
        #[clap(required = true)]
        ids: Vec<u64>,
    },
    /// Turn public codes back into raw ids.
    Decode {
        #[clap(required = true)]
        codes: Vec<String>,
    },
    /// Print the store key of a scheme entry. Parts are read as JSON, anything that isn't JSON is taken as a string.
    Key {
        namespace: String,
        parts:     Vec<String>,
        #[clap(long)]
        suffix:    Option<String>,
        /// Build a lock key.
        #[clap(long)]
        lock:      bool,
    },
}

impl Cli {
    fn codec(&self) -> Result<ReversibleIdCodec> {
        let alphabet = match self.alphabet.as_str() {
            "base62" => AlphabetKind::Base62,
            "base52" => AlphabetKind::Base52,
            symbols => AlphabetKind::Custom(symbols.to_string()),
        };
        let config = CodecConfig {
            min_length: self.min_length,
            alphabet,
        };
        ReversibleIdCodec::from_config(&config).context("bad codec settings")
    }

    fn keys(&self) -> KeyBuilder {
        KeyBuilder::new(self.prefix.as_deref(), self.max_key_length)
    }
}

fn parse_part(raw: &str) -> Result<KeyPart> {
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    KeyPart::try_from(value).with_context(|| format!("key part '{raw}'"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    debug!("{cli:?}");

    match &cli.command {
        Command::Encode { ids } => {
            let codec = cli.codec()?;
            for id in ids {
                println!("{id}\t{}", codec.encode(*id)?);
            }
        }
        Command::Decode { codes } => {
            let codec = cli.codec()?;
            let mut invalid = 0;
            for code in codes {
                match codec.decode(code) {
                    Some(id) => println!("{code}\t{id}"),
                    None => {
                        invalid += 1;
                        println!("{code}\t-");
                    }
                }
            }
            if invalid > 0 {
                bail!("{invalid} of {} codes are not valid", codes.len());
            }
        }
        Command::Key {
            namespace,
            parts,
            suffix,
            lock,
        } => {
            let parts = parts.iter().map(|p| parse_part(p)).collect::<Result<Vec<_>>>()?;
            let prekey = Prekey::from_parts(parts);
            let keys = if *lock { cli.keys().scoped(LOCK_SCOPE) } else { cli.keys() };
            println!("{}", keys.build(namespace, prekey.parts(), suffix.as_deref()));
        }
    }

    Ok(())
}
