//! Shared Sender Keys command-line tool.
//!
//! Drives a [`RatchetEngine`] over a durable redb store, one operation per
//! invocation. Binary data (sealed bodies, distribution records, private keys)
//! is read and written as hex.
//!
//! # Usage
//!
//! ```bash
//! # Create a group and hold a chain for every member
//! ssk --db ssk.redb create-group alice bob carol
//!
//! # Seal and open a message
//! ssk --db ssk.redb encrypt --group 05ab.. --sender alice "hello"
//! ssk --db ssk.redb decrypt --group 05ab.. --sender alice --key-index 0 <body-hex>
//!
//! # Hand alice's chain to a new member
//! ssk --db ssk.redb sender-key --group 05ab.. --sender alice
//! ssk --db other.redb apply-sender-key <record-hex>
//! ```

use std::{
    error::Error,
    io::{self, Write},
    path::PathBuf,
};

use clap::{Parser, Subcommand};
use ssk_core::{
    PublicKey, RatchetEngine, RatchetStore, RedbStore, ResyncDelegate, SenderKeyDistribution,
    SystemEnv,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Shared Sender Keys engine
#[derive(Parser, Debug)]
#[command(name = "ssk")]
#[command(about = "Shared Sender Keys ratchet engine")]
#[command(version)]
struct Args {
    /// Path to the ratchet database
    #[arg(long, default_value = "ssk.redb")]
    db: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a fresh chain for a sender
    Generate {
        #[arg(long)]
        group: String,
        #[arg(long)]
        sender: String,
    },
    /// Seal a message with the sender's next key
    Encrypt {
        #[arg(long)]
        group: String,
        #[arg(long)]
        sender: String,
        /// Plaintext (UTF-8)
        plaintext: String,
    },
    /// Open a sealed body
    Decrypt {
        #[arg(long)]
        group: String,
        #[arg(long)]
        sender: String,
        #[arg(long)]
        key_index: u32,
        /// Sealed body (hex)
        body: String,
    },
    /// Create a closed group with a chain per member
    CreateGroup {
        /// Member public keys
        #[arg(required = true)]
        members: Vec<String>,
    },
    /// Check whether a public key is a known closed group
    IsClosedGroup { public_key: String },
    /// Print a sender's distribution record
    SenderKey {
        #[arg(long)]
        group: String,
        #[arg(long)]
        sender: String,
    },
    /// Store a received distribution record
    ApplySenderKey {
        /// CBOR record (hex)
        record: String,
    },
    /// Import a group identity
    SetGroupKey {
        #[arg(long)]
        group: String,
        /// Private key (hex)
        private_key: String,
    },
    /// Archive a group's chains and generate a new one for a member
    Rekey {
        #[arg(long)]
        group: String,
        #[arg(long)]
        user: String,
    },
    /// Forget a group
    LeaveGroup { group: String },
}

/// Logs resync requests. Delivering them to the sender is up to the operator.
struct LogResync;

impl ResyncDelegate for LogResync {
    fn request_sender_key(&self, group: &PublicKey, sender: &PublicKey) {
        tracing::warn!(%group, %sender, "Sender key needed, ask the sender to redistribute");
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    tracing::debug!(db = %args.db.display(), "Opening ratchet database");
    let store = RedbStore::open(&args.db)?;
    let engine = RatchetEngine::new(store, LogResync, SystemEnv::new());

    run(&engine, args.command, &mut io::stdout().lock())
}

fn run<S, D>(
    engine: &RatchetEngine<S, D, SystemEnv>,
    command: Command,
    out: &mut impl Write,
) -> Result<(), Box<dyn Error>>
where
    S: RatchetStore,
    D: ResyncDelegate,
{
    match command {
        Command::Generate { group, sender } => {
            let group = PublicKey::from(group);
            let sender = PublicKey::from(sender);
            let ratchet = engine.generate_ratchet(&group, &sender)?;
            let record = SenderKeyDistribution::from_ratchet(group, sender, &ratchet);
            writeln!(out, "{}", hex::encode(record.encode()?))?;
        },
        Command::Encrypt { group, sender, plaintext } => {
            let (body, key_index) =
                engine.encrypt(plaintext.as_bytes(), &group.into(), &sender.into())?;
            writeln!(out, "{key_index} {}", hex::encode(body))?;
        },
        Command::Decrypt { group, sender, key_index, body } => {
            let body = hex::decode(body.trim())?;
            let plaintext = engine.decrypt(&body, &group.into(), &sender.into(), key_index)?;
            writeln!(out, "{}", String::from_utf8_lossy(&plaintext))?;
        },
        Command::CreateGroup { members } => {
            let members: Vec<PublicKey> = members.into_iter().map(PublicKey::from).collect();
            let (pair, records) = engine.create_group(&members)?;
            writeln!(out, "group {}", pair.public_key())?;
            writeln!(out, "private-key {}", hex::encode(pair.private_key_bytes()))?;
            for record in records {
                writeln!(out, "{} {}", record.sender_public_key(), hex::encode(record.encode()?))?;
            }
        },
        Command::IsClosedGroup { public_key } => {
            writeln!(out, "{}", engine.is_closed_group(&public_key.into())?)?;
        },
        Command::SenderKey { group, sender } => {
            let group = PublicKey::from(group);
            let sender = PublicKey::from(sender);
            match engine.sender_key(&group, &sender)? {
                Some(record) => writeln!(out, "{}", hex::encode(record.encode()?))?,
                None => return Err(format!("no chain for {sender} in {group}").into()),
            }
        },
        Command::ApplySenderKey { record } => {
            let record = SenderKeyDistribution::decode(&hex::decode(record.trim())?)?;
            engine.apply_sender_key(&record)?;
            writeln!(
                out,
                "applied {} at key index {}",
                record.sender_public_key(),
                record.key_index()
            )?;
        },
        Command::SetGroupKey { group, private_key } => {
            engine.set_group_private_key(&group.into(), &hex::decode(private_key.trim())?)?;
        },
        Command::Rekey { group, user } => {
            let record = engine.rekey(&group.into(), &user.into())?;
            writeln!(out, "{}", hex::encode(record.encode()?))?;
        },
        Command::LeaveGroup { group } => {
            engine.leave_group(&group.into())?;
        },
    }
    Ok(())
}
