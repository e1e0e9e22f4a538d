//! Pairlink CLI tools: key generation, signing, verification.

#![forbid(unsafe_code)]

use std::path::Path;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use clap::{Parser, Subcommand};
use pairlink_crypto::{generate_nonce, KeyOperations, Signer, Verifier};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "pairlink")]
#[command(about = "Pairlink key tools")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new P-256 key pair and print both JWKs
    Keygen {
        /// Write `<output>.jwk` and `<output>.pub.jwk` instead of printing
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Print the public JWK for a private JWK file
    Public {
        #[arg(short, long)]
        key: String,
    },

    /// Print a fresh session nonce
    Nonce,

    /// Sign a message with a private JWK file
    Sign {
        #[arg(short, long)]
        key: String,

        #[arg(short, long)]
        message: String,
    },

    /// Verify a base64 signature against a JWK file
    Verify {
        #[arg(short, long)]
        key: String,

        #[arg(short, long)]
        signature: String,

        #[arg(short, long)]
        message: String,
    },

    /// Show version information
    Version,
}

fn read_key(path: &str) -> Result<String> {
    debug!("reading key from {}", path);
    std::fs::read_to_string(Path::new(path)).with_context(|| format!("failed to read {path}"))
}

fn sign(ops: &KeyOperations, private_jwk: &str, message: &str) -> Result<String> {
    let key = ops.import_private_key(private_jwk)?;
    let signature = key.sign(message.as_bytes())?;
    debug!("signed {} bytes", message.len());
    Ok(STANDARD.encode(signature))
}

fn verify(ops: &KeyOperations, jwk: &str, signature: &str, message: &str) -> Result<bool> {
    let key = ops.import_public_key(jwk)?;
    Ok(match STANDARD.decode(signature) {
        Ok(bytes) => key.verify(&bytes, message.as_bytes()),
        Err(err) => {
            debug!("signature is not base64: {}", err);
            false
        }
    })
}

fn main() -> Result<()> {
    pairlink_common::init_tracing();

    let args = Args::parse();
    let ops = KeyOperations::new();

    match args.command {
        Command::Keygen { output } => {
            let pair = ops.generate_key_pair()?;
            debug!("generated P-256 key pair");
            let private_jwk = pair.private_key().export_jwk();
            let public_jwk = pair.public_key().export_jwk();

            match output {
                Some(output) => {
                    let private_path = format!("{}.jwk", output);
                    let public_path = format!("{}.pub.jwk", output);
                    debug!("writing {} and {}", private_path, public_path);
                    std::fs::write(&private_path, &private_jwk)
                        .with_context(|| format!("failed to write {private_path}"))?;
                    std::fs::write(&public_path, &public_jwk)
                        .with_context(|| format!("failed to write {public_path}"))?;

                    println!("Private key: {}", private_path);
                    println!("Public key:  {}", public_path);
                }
                None => {
                    println!("{}", private_jwk);
                    println!("{}", public_jwk);
                }
            }
        }
        Command::Public { key } => {
            let private = ops.import_private_key(&read_key(&key)?)?;
            println!("{}", private.public_key().export_jwk());
        }
        Command::Nonce => {
            println!("{}", generate_nonce());
        }
        Command::Sign { key, message } => {
            println!("{}", sign(&ops, &read_key(&key)?, &message)?);
        }
        Command::Verify {
            key,
            signature,
            message,
        } => {
            if verify(&ops, &read_key(&key)?, &signature, &message)? {
                println!("valid");
            } else {
                println!("invalid");
                std::process::exit(1);
            }
        }
        Command::Version => {
            println!("pairlink {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
